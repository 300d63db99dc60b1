use std::future::Future;

use super::{expect_keys, fixture_records, TestResult};
use crate::{BlockingQuery, DynamicRecord, QueryOp, RecordQueryProvider, Value};

pub(super) async fn run_exclusion_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    vec![
        TestResult::from_result(
            "exclusion",
            "excluded_keys_never_returned",
            excluded_keys_never_returned(factory).await,
        ),
        TestResult::from_result(
            "exclusion",
            "states_restrict_candidates",
            states_restrict_candidates(factory).await,
        ),
        TestResult::from_result(
            "exclusion",
            "limit_caps_results",
            limit_caps_results(factory).await,
        ),
        TestResult::from_result(
            "exclusion",
            "count_agrees_with_query",
            count_agrees_with_query(factory).await,
        ),
    ]
}

fn johns() -> BlockingQuery {
    let mut q = BlockingQuery::new("Patient");
    q.add_term("name.given", QueryOp::Equal, vec![Some(Value::text("John"))]);
    q
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn excluded_keys_never_returned<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = johns();
    q.exclude("p1");
    q.exclude("p5");
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p3"])
}

async fn states_restrict_candidates<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = johns();
    q.states = vec!["active".to_string(), "new".to_string()];
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    expect_keys(&found, &["p1", "p5"])
}

async fn limit_caps_results<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let mut q = johns();
    q.limit = Some(2);
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    if found.len() != 2 {
        return Err(format!("expected 2 records, got {}", found.len()));
    }
    if found.iter().any(|r| r.get("name.given") != Some(&Value::text("John"))) {
        return Err("limited result contains a non-matching record".to_string());
    }
    Ok(())
}

async fn count_agrees_with_query<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory(fixture_records()).await;
    let q = johns();
    let count = p.count(&q).await.map_err(|e| e.to_string())?;
    let found = p.query(&q).await.map_err(|e| e.to_string())?;
    if count != found.len() {
        return Err(format!(
            "count returned {} but query returned {}",
            count,
            found.len()
        ));
    }
    Ok(())
}
