//! End-to-end matching tests over the in-memory store.
//!
//! Each test loads a JSON configuration document into an
//! `InMemoryConfigurationProvider`, builds a `Matcher` over a small
//! patient population and checks blocking, classification, diagnostics
//! and the report.
//!
//! Population (all `Patient` unless noted):
//!   c1  John Smith  1980-03-01  male    active
//!   c2  Jon  Smith  1980-03-01  male    active
//!   c3  John Smith  1980-03-01  male    obsolete
//!   c4  John Brown  1980-03-01  male    active
//!   c5  Mary Smith  1990-07-15  female  new

use std::sync::Arc;

use recordlink_eval::{
    Classification, DiagnosticSession, InMemoryConfigurationProvider, InMemoryStore, MatchError,
    MatchMethod, MatchResult, Matcher, SessionState, DISQUALIFY_SCORE,
};
use recordlink_storage::{DynamicRecord, FieldAccessor};
use serde_json::json;

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

fn patient(key: &str, state: &str, given: &str, family: Option<&str>, birth: &str, gender: &str) -> DynamicRecord {
    let mut fields = json!({
        "given": given,
        "birthDate": birth,
        "gender": gender,
    });
    if let Some(family) = family {
        fields["family"] = json!(family);
    }
    DynamicRecord::from_json(&json!({
        "key": key,
        "type": "Patient",
        "state": state,
        "fields": fields,
    }))
    .unwrap()
}

fn population() -> Vec<DynamicRecord> {
    vec![
        patient("c1", "active", "John", Some("Smith"), "1980-03-01", "male"),
        patient("c2", "active", "Jon", Some("Smith"), "1980-03-01", "male"),
        patient("c3", "obsolete", "John", Some("Smith"), "1980-03-01", "male"),
        patient("c4", "active", "John", Some("Brown"), "1980-03-01", "male"),
        patient("c5", "new", "Mary", Some("Smith"), "1990-07-15", "female"),
    ]
}

fn input() -> DynamicRecord {
    patient("in-1", "active", "John", Some("Smith"), "1980-03-01", "male")
}

fn equal_attribute(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "property": [id],
        "m": 0.9,
        "u": 0.1,
        "assertion": { "op": "equal" }
    })
}

fn family_block() -> serde_json::Value {
    json!({ "filter": [{ "expression": "family=$input.family" }] })
}

fn configuration(
    blocking: serde_json::Value,
    scoring: serde_json::Value,
    match_threshold: f64,
    non_match_threshold: f64,
) -> serde_json::Value {
    json!({
        "kind": "MatchConfiguration",
        "id": "patients",
        "target": [{ "resource": "Patient", "event": ["create"] }],
        "blocking": blocking,
        "scoring": scoring,
        "matchThreshold": match_threshold,
        "nonMatchThreshold": non_match_threshold
    })
}

/// The default configuration: block on family name, score given name and
/// birth date with m=0.9, u=0.1.
fn default_configuration() -> serde_json::Value {
    configuration(
        json!([family_block()]),
        json!([equal_attribute("given"), equal_attribute("birthDate")]),
        5.0,
        1.0,
    )
}

fn matcher(documents: &[serde_json::Value]) -> Matcher<DynamicRecord> {
    let mut provider = InMemoryConfigurationProvider::new();
    for document in documents {
        provider.load_json(document).unwrap();
    }
    let accessor = Arc::new(FieldAccessor);
    let store = InMemoryStore::new(population(), accessor.clone());
    Matcher::new(Arc::new(provider), Arc::new(store), accessor)
}

fn keys(records: &[DynamicRecord]) -> Vec<&str> {
    let mut keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
    keys.sort();
    keys
}

fn result<'a>(results: &'a [MatchResult<DynamicRecord>], key: &str) -> &'a MatchResult<DynamicRecord> {
    results
        .iter()
        .find(|r| r.record.key == key)
        .unwrap_or_else(|| panic!("no result for '{}'", key))
}

fn weight() -> f64 {
    9f64.log2()
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

// ──────────────────────────────────────────────
// Blocking
// ──────────────────────────────────────────────

#[tokio::test]
async fn blocking_filters_by_input_value_and_active_state() {
    let m = matcher(&[default_configuration()]);
    let candidates = m.block(&input(), "patients", &[], None).await.unwrap();
    // c3 is obsolete, c4 has another family name.
    assert_eq!(keys(&candidates), vec!["c1", "c2", "c5"]);
}

#[tokio::test]
async fn or_block_unions_and_block_intersects() {
    let date_block = |op: &str| {
        json!({ "op": op, "filter": [{ "expression": "birthDate=$input.birthDate" }] })
    };
    let or_config = configuration(
        json!([family_block(), date_block("or")]),
        json!([equal_attribute("given")]),
        5.0,
        1.0,
    );
    let m = matcher(&[or_config]);
    let candidates = m.block(&input(), "patients", &[], None).await.unwrap();
    assert_eq!(keys(&candidates), vec!["c1", "c2", "c4", "c5"]);

    let and_config = configuration(
        json!([family_block(), date_block("and")]),
        json!([equal_attribute("given")]),
        5.0,
        1.0,
    );
    let m = matcher(&[and_config]);
    let candidates = m.block(&input(), "patients", &[], None).await.unwrap();
    assert_eq!(keys(&candidates), vec!["c1", "c2"]);
}

#[tokio::test]
async fn input_record_and_ignored_keys_are_never_candidates() {
    let m = matcher(&[default_configuration()]);
    let own = patient("c1", "active", "John", Some("Smith"), "1980-03-01", "male");
    let candidates = m
        .block(&own, "patients", &["c5".to_string()], None)
        .await
        .unwrap();
    assert_eq!(keys(&candidates), vec!["c2"]);
}

#[tokio::test]
async fn max_results_limits_a_block() {
    let config = configuration(
        json!([{ "maxResults": 1, "filter": [{ "expression": "family=$input.family" }] }]),
        json!([equal_attribute("given")]),
        5.0,
        1.0,
    );
    let m = matcher(&[config]);
    let candidates = m.block(&input(), "patients", &[], None).await.unwrap();
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn skip_when_null_removes_block_from_combination() {
    let date_block = json!({ "filter": [{ "expression": "birthDate=$input.birthDate" }] });
    let no_family = patient("in-2", "active", "John", None, "1980-03-01", "male");

    let skipping = configuration(
        json!([
            { "skipWhenNull": true, "filter": [{ "expression": "family=$input.family" }] },
            date_block.clone()
        ]),
        json!([equal_attribute("given")]),
        5.0,
        1.0,
    );
    let m = matcher(&[skipping]);
    let candidates = m.block(&no_family, "patients", &[], None).await.unwrap();
    assert_eq!(keys(&candidates), vec!["c1", "c2", "c4"]);

    // Without skipWhenNull the guarded block yields nothing and the AND
    // with it is empty.
    let strict = configuration(
        json!([family_block(), date_block]),
        json!([equal_attribute("given")]),
        5.0,
        1.0,
    );
    let m = matcher(&[strict]);
    let candidates = m.block(&no_family, "patients", &[], None).await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn configuration_without_blocks_cannot_block() {
    let config = configuration(json!([]), json!([equal_attribute("given")]), 5.0, 1.0);
    let m = matcher(&[config]);
    let err = m.block(&input(), "patients", &[], None).await.unwrap_err();
    assert!(matches!(err, MatchError::InvalidState { .. }), "got {:?}", err);
}

// ──────────────────────────────────────────────
// Lookup and error handling
// ──────────────────────────────────────────────

#[tokio::test]
async fn unknown_configuration_is_not_found() {
    let m = matcher(&[default_configuration()]);
    let err = m.block(&input(), "nope", &[], None).await.unwrap_err();
    assert!(matches!(err, MatchError::NotFound { .. }), "got {:?}", err);
}

#[tokio::test]
async fn configuration_for_other_type_is_invalid_state() {
    let mut config = default_configuration();
    config["target"] = json!([{ "resource": "Practitioner" }]);
    let m = matcher(&[config]);
    let err = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::InvalidState { .. }), "got {:?}", err);
}

#[tokio::test]
async fn input_without_record_type_is_rejected() {
    let m = matcher(&[default_configuration()]);
    let untyped = DynamicRecord::new("x", "");
    let err = m.block(&untyped, "patients", &[], None).await.unwrap_err();
    assert!(matches!(err, MatchError::ArgumentInvalid { .. }), "got {:?}", err);
}

#[tokio::test]
async fn computation_failures_are_wrapped_with_context() {
    let config = configuration(
        json!([family_block()]),
        json!([{
            "id": "given",
            "property": ["given"],
            "m": 0.9,
            "u": 0.1,
            "assertion": { "op": "equal", "transform": [{ "name": "no_such_transform" }] }
        }]),
        5.0,
        1.0,
    );
    let m = matcher(&[config]);
    let err = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap_err();
    match err {
        MatchError::Matching {
            configuration,
            record,
            source,
        } => {
            assert_eq!(configuration, "patients");
            assert_eq!(record, "in-1");
            assert!(matches!(*source, MatchError::ArgumentInvalid { .. }));
        }
        other => panic!("expected Matching, got {:?}", other),
    }
}

// ──────────────────────────────────────────────
// Classification
// ──────────────────────────────────────────────

#[tokio::test]
async fn weights_sum_and_classify() {
    let m = matcher(&[default_configuration()]);
    let results = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    let c1 = result(&results, "c1");
    approx(c1.score, 2.0 * weight());
    approx(c1.strength, 1.0);
    assert_eq!(c1.classification, Classification::Match);
    assert_eq!(c1.method, MatchMethod::Probabilistic);
    assert_eq!(c1.configuration, "patients");
    assert_eq!(c1.vectors.len(), 2);
    assert!(c1.vectors.iter().all(|v| v.evaluated && v.passed));

    let c2 = result(&results, "c2");
    approx(c2.score, 0.0);
    approx(c2.strength, 0.5);
    assert_eq!(c2.classification, Classification::NonMatch);

    let c5 = result(&results, "c5");
    approx(c5.score, -2.0 * weight());
    approx(c5.strength, 0.0);
    assert_eq!(c5.classification, Classification::NonMatch);
}

#[tokio::test]
async fn score_between_thresholds_is_probable() {
    let config = configuration(
        json!([family_block()]),
        json!([equal_attribute("given"), equal_attribute("birthDate")]),
        5.0,
        -1.0,
    );
    let m = matcher(&[config]);
    let results = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    assert_eq!(result(&results, "c2").classification, Classification::Probable);
}

#[tokio::test]
async fn classify_scores_supplied_candidates() {
    let m = matcher(&[default_configuration()]);
    let candidates = vec![population().remove(3)];
    let results = m.classify(&input(), &candidates, "patients", None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.key, "c4");
    approx(results[0].score, 2.0 * weight());
}

#[tokio::test]
async fn configuration_without_scoring_is_deterministic() {
    let config = configuration(json!([family_block()]), json!([]), 5.0, 1.0);
    let m = matcher(&[config]);
    let results = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    for r in &results {
        assert_eq!(r.method, MatchMethod::Deterministic);
        assert_eq!(r.classification, Classification::Match);
        assert!(r.vectors.is_empty());
    }
}

#[tokio::test]
async fn failed_required_attribute_forces_non_match() {
    let mut given = equal_attribute("given");
    given["required"] = json!(true);
    let birth = json!({
        "id": "birthDate",
        "property": ["birthDate"],
        "matchWeight": 10.0,
        "nonMatchWeight": -1.0,
        "assertion": { "op": "equal" }
    });
    let config = configuration(json!([family_block()]), json!([given, birth]), 5.0, 1.0);
    let m = matcher(&[config]);
    let results = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();

    let c2 = result(&results, "c2");
    approx(c2.score, 10.0 - weight());
    assert_eq!(c2.classification, Classification::NonMatch);
    assert_eq!(result(&results, "c1").classification, Classification::Match);
}

#[tokio::test]
async fn strength_mode_classifies_normalized_score() {
    let mut config = configuration(
        json!([family_block()]),
        json!([equal_attribute("given"), equal_attribute("birthDate")]),
        0.9,
        0.1,
    );
    config["evaluationMode"] = json!("strength");
    let m = matcher(&[config]);
    let results = m
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    assert_eq!(result(&results, "c1").classification, Classification::Match);
    assert_eq!(result(&results, "c2").classification, Classification::Probable);
    assert_eq!(result(&results, "c5").classification, Classification::NonMatch);
}

#[tokio::test]
async fn ignore_policy_drops_attribute_and_disqualify_sinks_score() {
    let phone = |policy: &str| {
        json!({
            "id": "phone",
            "property": ["phone"],
            "m": 0.9,
            "u": 0.1,
            "whenNull": policy,
            "assertion": { "op": "equal" }
        })
    };

    let ignoring = configuration(
        json!([family_block()]),
        json!([equal_attribute("given"), equal_attribute("birthDate"), phone("ignore")]),
        5.0,
        1.0,
    );
    let results = matcher(&[ignoring])
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    let c1 = result(&results, "c1");
    approx(c1.score, 2.0 * weight());
    approx(c1.strength, 1.0);
    let phone_vector = c1.vectors.iter().find(|v| v.attribute == "phone").unwrap();
    assert!(!phone_vector.evaluated);
    assert_eq!(phone_vector.score, None);
    assert_eq!(phone_vector.property, None);

    let disqualifying = configuration(
        json!([family_block()]),
        json!([equal_attribute("given"), equal_attribute("birthDate"), phone("disqualify")]),
        5.0,
        1.0,
    );
    let results = matcher(&[disqualifying])
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    let c1 = result(&results, "c1");
    assert!(c1.score < DISQUALIFY_SCORE / 2.0);
    approx(c1.strength, 0.0);
    assert_eq!(c1.classification, Classification::NonMatch);
}

#[tokio::test]
async fn dependent_attribute_needs_positive_dependency() {
    let mut gender = equal_attribute("gender");
    gender["when"] = json!(["given"]);
    let config = configuration(
        json!([family_block()]),
        json!([equal_attribute("given"), gender]),
        5.0,
        1.0,
    );
    let results = matcher(&[config])
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();

    let c1 = result(&results, "c1");
    approx(c1.score, 2.0 * weight());

    // Given name fails for c2, so gender falls back to its null policy
    // (non-match) even though the genders agree.
    let c2 = result(&results, "c2");
    let gender = c2.vectors.iter().find(|v| v.attribute == "gender").unwrap();
    assert!(!gender.evaluated);
    approx(gender.score.unwrap(), -weight());
    approx(c2.score, -2.0 * weight());
}

#[tokio::test]
async fn fuzzy_transform_threshold_accepts_near_names() {
    let given = json!({
        "id": "given",
        "property": ["given"],
        "m": 0.9,
        "u": 0.1,
        "assertion": {
            "op": "greater_than_or_equal",
            "value": 0.9,
            "transform": [{ "name": "jaro_winkler" }]
        }
    });
    let config = configuration(
        json!([family_block()]),
        json!([given, equal_attribute("birthDate")]),
        5.0,
        1.0,
    );
    let results = matcher(&[config])
        .match_records(&input(), "patients", &[], None)
        .await
        .unwrap();
    assert_eq!(result(&results, "c2").classification, Classification::Match);
    assert_eq!(result(&results, "c5").classification, Classification::NonMatch);
}

#[tokio::test]
async fn collection_resolves_first_member_for_type() {
    let member = |id: &str, resource: &str, status: &str| {
        let mut c = default_configuration();
        c["id"] = json!(id);
        c["target"] = json!([{ "resource": resource }]);
        c["metadata"] = json!({ "status": status });
        c
    };
    let collection = json!({
        "kind": "MatchConfigurationCollection",
        "id": "people",
        "configuration": [
            member("practitioners", "Practitioner", "active"),
            member("retired", "Patient", "inactive"),
            member("current", "Patient", "active")
        ]
    });
    let results = matcher(&[collection])
        .match_records(&input(), "people", &[], None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.configuration == "retired"));
}

// ──────────────────────────────────────────────
// Diagnostics and report
// ──────────────────────────────────────────────

#[tokio::test]
async fn match_records_records_both_stages_in_one_session() {
    let m = matcher(&[default_configuration()]);
    let mut session = m.create_diagnostic_session();
    let results = m
        .match_records(&input(), "patients", &[], Some(&mut session))
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Ended);

    let data = session.session_data().unwrap();
    assert_eq!(data.configuration.as_ref().unwrap()["id"], "patients");
    let stages: Vec<&str> = data.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(stages, vec!["blocking", "classification"]);
    assert_eq!(data.stages[0].actions.len(), 1);
    assert_eq!(data.stages[1].actions.len(), results.len());

    let report = m
        .create_match_report("Patient", &input(), &results, Some(&session))
        .unwrap();
    let json = report.to_json();
    assert_eq!(json["recordType"], "Patient");
    assert_eq!(json["inputKey"], "in-1");
    assert_eq!(json["results"].as_array().unwrap().len(), 3);
    assert_eq!(json["diagnostics"]["stages"][0]["name"], "blocking");
}

#[tokio::test]
async fn caller_started_session_stays_open() {
    let m = matcher(&[default_configuration()]);
    let mut session = DiagnosticSession::new();
    session.start(None).unwrap();
    m.block(&input(), "patients", &[], Some(&mut session))
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Started);
    session.end().unwrap();
    assert_eq!(session.session_data().unwrap().stages.len(), 1);
}

#[tokio::test]
async fn ended_session_is_rejected() {
    let m = matcher(&[default_configuration()]);
    let mut session = DiagnosticSession::new();
    session.start(None).unwrap();
    session.end().unwrap();
    let err = m
        .block(&input(), "patients", &[], Some(&mut session))
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::InvalidState { .. }), "got {:?}", err);
}

#[tokio::test]
async fn failed_run_still_ends_owned_session() {
    let config = configuration(
        json!([family_block()]),
        json!([{
            "id": "given",
            "property": ["given"],
            "m": 0.9,
            "u": 0.1,
            "assertion": { "op": "equal", "transform": [{ "name": "no_such_transform" }] }
        }]),
        5.0,
        1.0,
    );
    let m = matcher(&[config]);
    let mut session = m.create_diagnostic_session();
    assert!(m
        .match_records(&input(), "patients", &[], Some(&mut session))
        .await
        .is_err());
    assert_eq!(session.state(), SessionState::Ended);
    let data = session.session_data().unwrap();
    assert!(data.stages.iter().all(|s| s.ended.is_some()));
}

// ──────────────────────────────────────────────
// Concurrency
// ──────────────────────────────────────────────

fn summary(results: &[MatchResult<DynamicRecord>]) -> Vec<(String, Classification, f64, f64)> {
    results
        .iter()
        .map(|r| (r.record.key.clone(), r.classification, r.score, r.strength))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_share_configuration_and_keep_own_sessions() {
    let m = Arc::new(matcher(&[default_configuration()]));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let m = Arc::clone(&m);
            tokio::spawn(async move {
                let mut session = m.create_diagnostic_session();
                let results = m
                    .match_records(&input(), "patients", &[], Some(&mut session))
                    .await
                    .unwrap();
                (results, session)
            })
        })
        .collect();

    let mut runs = Vec::with_capacity(handles.len());
    for handle in handles {
        runs.push(handle.await.unwrap());
    }

    let expected = summary(&runs[0].0);
    assert_eq!(expected.len(), 3);
    for (results, session) in &runs {
        assert_eq!(summary(results), expected);
        assert_eq!(results[0].vectors, runs[0].0[0].vectors);

        assert_eq!(session.state(), SessionState::Ended);
        let data = session.session_data().unwrap();
        let stages: Vec<&str> = data.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(stages, vec!["blocking", "classification"]);
        assert_eq!(data.stages[0].actions.len(), 1);
        assert_eq!(data.stages[1].actions.len(), results.len());
        assert!(data.stages.iter().all(|s| s.ended.is_some()));
    }

    for (results, _) in &runs {
        approx(result(results, "c1").score, 2.0 * weight());
    }
}
