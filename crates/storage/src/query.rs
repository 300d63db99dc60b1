//! Compiled blocking queries.
//!
//! A `BlockingQuery` is the backend-neutral predicate the blocking engine
//! hands to a [`crate::RecordQueryProvider`]. Terms are ANDed; the values
//! within one term are ORed. How a backend executes it (SQL, in-memory,
//! a search index) is its own business.

use std::collections::BTreeSet;
use std::fmt;

use crate::value::Value;

/// Comparison operator of a query term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Backend-defined approximate match (phonetic, pattern, edit distance).
    Approx,
}

impl QueryOp {
    /// The prefix that selects this operator in a filter expression value.
    pub fn prefix(self) -> &'static str {
        match self {
            QueryOp::Equal => "",
            QueryOp::NotEqual => "!",
            QueryOp::LessThan => "<",
            QueryOp::LessThanOrEqual => "<=",
            QueryOp::GreaterThan => ">",
            QueryOp::GreaterThanOrEqual => ">=",
            QueryOp::Approx => "~",
        }
    }

    /// Split an operator prefix off a raw filter value.
    pub fn split_prefix(raw: &str) -> (QueryOp, &str) {
        // Two-character prefixes first.
        for op in [QueryOp::LessThanOrEqual, QueryOp::GreaterThanOrEqual] {
            if let Some(rest) = raw.strip_prefix(op.prefix()) {
                return (op, rest);
            }
        }
        for op in [
            QueryOp::NotEqual,
            QueryOp::LessThan,
            QueryOp::GreaterThan,
            QueryOp::Approx,
        ] {
            if let Some(rest) = raw.strip_prefix(op.prefix()) {
                return (op, rest);
            }
        }
        (QueryOp::Equal, raw)
    }
}

/// One predicate term: `path <op> (v1 | v2 | ...)`. A `None` value
/// matches records where the property is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    pub path: String,
    pub op: QueryOp,
    pub values: Vec<Option<Value>>,
}

/// A compiled blocking query over one record type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockingQuery {
    pub record_type: String,
    pub terms: Vec<QueryTerm>,
    /// Keys that must not appear in the result.
    pub exclude_keys: BTreeSet<String>,
    /// When non-empty, candidates must be in one of these lifecycle states.
    pub states: Vec<String>,
    pub limit: Option<usize>,
}

impl BlockingQuery {
    pub fn new(record_type: impl Into<String>) -> Self {
        BlockingQuery {
            record_type: record_type.into(),
            ..Default::default()
        }
    }

    /// Add values to the term for `(path, op)`, creating it if needed.
    /// Values already present are not repeated.
    pub fn add_term(&mut self, path: &str, op: QueryOp, values: Vec<Option<Value>>) {
        let term = match self
            .terms
            .iter_mut()
            .position(|t| t.path == path && t.op == op)
        {
            Some(i) => &mut self.terms[i],
            None => {
                self.terms.push(QueryTerm {
                    path: path.to_string(),
                    op,
                    values: Vec::new(),
                });
                let last = self.terms.len() - 1;
                &mut self.terms[last]
            }
        };
        for value in values {
            if !term.values.contains(&value) {
                term.values.push(value);
            }
        }
    }

    pub fn exclude(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !key.is_empty() {
            self.exclude_keys.insert(key);
        }
    }

    /// True when the query has no predicate terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for BlockingQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?", self.record_type)?;
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if !first {
                write!(f, "&")?;
            }
            first = false;
            Ok(())
        };
        for term in &self.terms {
            sep(f)?;
            write!(f, "{}={}", term.path, term.op.prefix())?;
            for (i, value) in term.values.iter().enumerate() {
                if i > 0 {
                    write!(f, "|")?;
                }
                match value {
                    Some(v) => write!(f, "{}", v)?,
                    None => write!(f, "null")?,
                }
            }
        }
        if !self.exclude_keys.is_empty() {
            sep(f)?;
            let keys: Vec<&str> = self.exclude_keys.iter().map(String::as_str).collect();
            write!(f, "key=!{}", keys.join("|"))?;
        }
        if !self.states.is_empty() {
            sep(f)?;
            write!(f, "state={}", self.states.join("|"))?;
        }
        if let Some(limit) = self.limit {
            sep(f)?;
            write!(f, "_count={}", limit)?;
        }
        Ok(())
    }
}
