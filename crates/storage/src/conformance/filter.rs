use std::future::Future;

use super::{expect_keys, fixture_records, TestResult};
use crate::{BlockingQuery, DynamicRecord, QueryOp, RecordQueryProvider, Value};

pub(super) async fn run_filter_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    vec![
        TestResult::from_result(
            "filter",
            "equality_term_selects_matching",
            equality_term_selects_matching(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "or_values_union",
            or_values_union(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "and_terms_intersect",
            and_terms_intersect(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "not_equal_excludes_value",
            not_equal_excludes_value(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "ordering_on_dates",
            ordering_on_dates(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "null_value_matches_absent_property",
            null_value_matches_absent_property(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "other_record_types_never_returned",
            other_record_types_never_returned(factory).await,
        ),
    ]
}

fn text(s: &str) -> Option<Value> {
    Some(Value::text(s))
}

// ── Test implementations ──────────────────────────────────────────────────────

/// `name.given=John` returns exactly the Johns of the requested type.
async fn equality_term_selects_matching<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Patient");
    q.add_term("name.given", QueryOp::Equal, vec![text("John")]);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p1", "p3", "p5"])
}

/// Values within one term are ORed.
async fn or_values_union<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Patient");
    q.add_term("name.given", QueryOp::Equal, vec![text("Jon"), text("Mary")]);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p2", "p4"])
}

/// Distinct terms are ANDed.
async fn and_terms_intersect<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Patient");
    q.add_term("name.given", QueryOp::Equal, vec![text("John")]);
    q.add_term("name.family", QueryOp::Equal, vec![text("Smith")]);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p1"])
}

/// `!` excludes records holding the value; absent properties are kept.
async fn not_equal_excludes_value<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Patient");
    q.add_term("name.family", QueryOp::NotEqual, vec![text("Smith")]);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p3", "p4", "p5"])
}

/// Ordering operators compare dates chronologically.
async fn ordering_on_dates<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Patient");
    q.add_term(
        "dateOfBirth",
        QueryOp::LessThan,
        vec![Some(Value::parse_literal("1981-01-01"))],
    );
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p1", "p2", "p3"])
}

/// A `None` value matches records that do not have the property.
async fn null_value_matches_absent_property<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Patient");
    q.add_term("name.family", QueryOp::Equal, vec![None]);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p4"])
}

/// A Practitioner named John Smith never answers a Patient query.
async fn other_record_types_never_returned<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = BlockingQuery::new("Practitioner");
    q.add_term("name.family", QueryOp::Equal, vec![text("Smith")]);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["d1"])
}
