//! Conformance test suite for `RecordQueryProvider` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `RecordQueryProvider<DynamicRecord>` implementation can run to verify
//! it honours the query semantics the blocking engine relies on:
//!
//! - **Filtering**: equality terms, ORed values, ANDed terms, not-equal,
//!   ordering, null values, record type restriction
//! - **Exclusion**: excluded keys, lifecycle states, result limits, count
//!
//! Approximate (`~`) terms are backend-defined and not covered.
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory that builds
//! a provider seeded with the given records:
//!
//! ```ignore
//! use recordlink_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sql_conformance() {
//!     let report = run_conformance_suite(|records| async move {
//!         create_test_sql_provider(records).await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod exclusion;
mod filter;

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use crate::{DynamicRecord, Record, RecordQueryProvider, Value};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "filter", "exclusion").
    pub category: String,
    /// Test name (e.g. "or_values_union").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a query provider.
///
/// The `factory` is called once per test with the fixture records and must
/// return a fresh provider holding exactly those records.
pub async fn run_conformance_suite<P, F, Fut>(factory: F) -> ConformanceReport
where
    P: RecordQueryProvider<DynamicRecord>,
    F: Fn(Vec<DynamicRecord>) -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.extend(filter::run_filter_tests(&factory).await);
    results.extend(exclusion::run_exclusion_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Fixture ─────────────────────────────────────────────────────────

/// Five patients and one practitioner with overlapping names and dates.
pub fn fixture_records() -> Vec<DynamicRecord> {
    let date = |s: &str| Value::parse_literal(s);
    vec![
        DynamicRecord::new("p1", "Patient")
            .with_state("active")
            .with_field("name.given", "John")
            .with_field("name.family", "Smith")
            .with_field("dateOfBirth", date("1980-03-01")),
        DynamicRecord::new("p2", "Patient")
            .with_state("active")
            .with_field("name.given", "Jon")
            .with_field("name.family", "Smith")
            .with_field("dateOfBirth", date("1980-03-01")),
        DynamicRecord::new("p3", "Patient")
            .with_state("obsolete")
            .with_field("name.given", "John")
            .with_field("name.family", "Smyth")
            .with_field("dateOfBirth", date("1975-11-20")),
        DynamicRecord::new("p4", "Patient")
            .with_state("new")
            .with_field("name.given", "Mary")
            .with_field("dateOfBirth", date("1990-07-15")),
        DynamicRecord::new("p5", "Patient")
            .with_state("active")
            .with_field("name.given", "John")
            .with_field("name.family", "Brown")
            .with_field("dateOfBirth", date("2001-01-01")),
        DynamicRecord::new("d1", "Practitioner")
            .with_state("active")
            .with_field("name.given", "John")
            .with_field("name.family", "Smith"),
    ]
}

fn keys(records: &[DynamicRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.key().to_string()).collect()
}

fn expect_keys(records: &[DynamicRecord], expected: &[&str]) -> Result<(), String> {
    let got = keys(records);
    let want: BTreeSet<String> = expected.iter().map(|k| k.to_string()).collect();
    if got != want {
        return Err(format!("expected keys {:?}, got {:?}", want, got));
    }
    Ok(())
}
