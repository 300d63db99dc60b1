//! In-memory record query provider.
//!
//! Executes a [`BlockingQuery`] over an owned record list. Useful for
//! tests, the CLI, and small populations that fit in memory.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use recordlink_storage::{
    BlockingQuery, PropertyAccessor, QueryOp, QueryTerm, Record, RecordQueryProvider,
    StorageError, Value,
};
use serde::{Deserialize, Serialize};

use crate::transforms::distance::levenshtein;
use crate::transforms::phonetic::soundex;
use crate::transforms::text_of;

/// How `~` terms are matched. Enabled options are ORed; with none enabled
/// `~` behaves like `=`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ApproxOptions {
    /// Case-insensitive substring match, or wildcard match when the value
    /// contains `*` or `?`.
    pub pattern: bool,
    /// Equal Soundex codes.
    pub phonetic: bool,
    /// Levenshtein distance at most this many edits.
    pub max_difference: Option<usize>,
}

impl ApproxOptions {
    fn any_enabled(&self) -> bool {
        self.pattern || self.phonetic || self.max_difference.is_some()
    }

    fn matches(&self, actual: &Value, wanted: &Value) -> bool {
        if !self.any_enabled() {
            return actual.loosely_equals(wanted);
        }
        let (Some(actual), Some(wanted)) = (text_of(actual), text_of(wanted)) else {
            return false;
        };
        let actual = actual.to_lowercase();
        let wanted = wanted.to_lowercase();

        let mut matched = false;
        if self.pattern {
            matched |= if wanted.contains(['*', '?']) {
                wildcard_match(&wanted, &actual)
            } else {
                actual.contains(&wanted)
            };
        }
        if self.phonetic {
            matched |= matches!((soundex(&actual), soundex(&wanted)), (Some(x), Some(y)) if x == y);
        }
        if let Some(max) = self.max_difference {
            matched |= levenshtein(&actual, &wanted) <= max;
        }
        matched
    }
}

/// Glob match supporting `*` (any run) and `?` (one character).
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

pub struct InMemoryStore<R> {
    records: Vec<R>,
    accessor: Arc<dyn PropertyAccessor<R>>,
    approx: ApproxOptions,
}

impl<R: Record> InMemoryStore<R> {
    pub fn new(records: Vec<R>, accessor: Arc<dyn PropertyAccessor<R>>) -> Self {
        InMemoryStore {
            records,
            accessor,
            approx: ApproxOptions::default(),
        }
    }

    pub fn with_approx(mut self, approx: ApproxOptions) -> Self {
        self.approx = approx;
        self
    }

    pub fn insert(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn term_matches(&self, record: &R, term: &QueryTerm) -> bool {
        let actual = self.accessor.property(record, &term.path);
        match term.op {
            QueryOp::Equal => term.values.iter().any(|v| equals(&actual, v)),
            QueryOp::NotEqual => !term.values.iter().any(|v| equals(&actual, v)),
            QueryOp::Approx => term.values.iter().any(|v| match (&actual, v) {
                (None, None) => true,
                (Some(actual), Some(wanted)) => {
                    any_element(actual, |a| self.approx.matches(a, wanted))
                }
                _ => false,
            }),
            QueryOp::LessThan
            | QueryOp::LessThanOrEqual
            | QueryOp::GreaterThan
            | QueryOp::GreaterThanOrEqual => term.values.iter().any(|v| match (&actual, v) {
                (Some(actual), Some(bound)) => any_element(actual, |a| {
                    a.partial_compare(bound)
                        .is_some_and(|ord| ordering_matches(term.op, ord))
                }),
                _ => false,
            }),
        }
    }

    fn record_matches(&self, record: &R, query: &BlockingQuery) -> bool {
        if record.record_type() != query.record_type {
            return false;
        }
        if query.exclude_keys.contains(record.key()) {
            return false;
        }
        if !query.states.is_empty() {
            match record.lifecycle_state() {
                Some(state) if query.states.iter().any(|s| s == state) => {}
                _ => return false,
            }
        }
        query.terms.iter().all(|term| self.term_matches(record, term))
    }
}

fn any_element(value: &Value, mut f: impl FnMut(&Value) -> bool) -> bool {
    match value {
        Value::Sequence(items) => items.iter().any(f),
        other => f(other),
    }
}

fn equals(actual: &Option<Value>, wanted: &Option<Value>) -> bool {
    match (actual, wanted) {
        (None, None) => true,
        (Some(actual), Some(wanted)) => any_element(actual, |a| a.loosely_equals(wanted)),
        _ => false,
    }
}

fn ordering_matches(op: QueryOp, ord: Ordering) -> bool {
    match op {
        QueryOp::LessThan => ord == Ordering::Less,
        QueryOp::LessThanOrEqual => ord != Ordering::Greater,
        QueryOp::GreaterThan => ord == Ordering::Greater,
        QueryOp::GreaterThanOrEqual => ord != Ordering::Less,
        QueryOp::Equal | QueryOp::Approx => ord == Ordering::Equal,
        QueryOp::NotEqual => ord != Ordering::Equal,
    }
}

#[async_trait]
impl<R: Record> RecordQueryProvider<R> for InMemoryStore<R> {
    async fn query(&self, query: &BlockingQuery) -> Result<Vec<R>, StorageError> {
        let matches = self
            .records
            .iter()
            .filter(|r| self.record_matches(r, query))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn count(&self, query: &BlockingQuery) -> Result<usize, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|r| self.record_matches(r, query))
            .take(query.limit.unwrap_or(usize::MAX))
            .count())
    }
}
