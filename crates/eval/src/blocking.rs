//! Blocking engine: narrows the record population to a candidate set.
//!
//! Each block's filter expressions are parsed once (cached on the block),
//! guarded against null input properties, merged into one
//! [`BlockingQuery`] and executed by the record query provider. Block
//! results are combined left to right: the first block seeds the running
//! set, then each block is intersected (`and`) or unioned (`or`) into it.
//!
//! Filter expression syntax:
//!
//! ```text
//! expression := term ('&' term)*
//! term       := path '=' [op] operand
//! op         := '!' | '<' | '<=' | '>' | '>=' | '~'
//! operand    := '$input.' path | 'null' | literal
//! ```

use std::collections::BTreeSet;

use recordlink_storage::{
    BlockingQuery, PropertyAccessor, QueryOp, Record, RecordQueryProvider, Value,
};
use serde_json::json;

use crate::configuration::{BlockFilter, BlockOp, MatchBlock, MatchConfiguration};
use crate::diagnostics::{record, DiagnosticSession};
use crate::error::MatchError;

const INPUT_PREFIX: &str = "$input.";

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOperand {
    Literal(Option<Value>),
    /// A property path read from the input record.
    Input(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub path: String,
    pub op: QueryOp,
    pub operand: FilterOperand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub expression: String,
    pub terms: Vec<FilterTerm>,
    /// Input properties that must be non-null for the filter to apply.
    pub guard: Vec<String>,
    pub true_if_null: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBlock {
    pub filters: Vec<CompiledFilter>,
    /// Union of the filters' guards; consulted by `skipWhenNull`.
    pub guard: Vec<String>,
}

impl CompiledBlock {
    pub fn compile(filters: &[BlockFilter]) -> Result<Self, MatchError> {
        let mut compiled = Vec::with_capacity(filters.len());
        let mut block_guard: Vec<String> = Vec::new();
        for filter in filters {
            let terms = parse_expression(&filter.expression)?;
            let guard = if filter.guard.is_empty() {
                input_references(&terms)
            } else {
                filter.guard.clone()
            };
            for path in &guard {
                if !block_guard.contains(path) {
                    block_guard.push(path.clone());
                }
            }
            compiled.push(CompiledFilter {
                expression: filter.expression.clone(),
                terms,
                guard,
                true_if_null: filter.true_if_null,
            });
        }
        Ok(CompiledBlock {
            filters: compiled,
            guard: block_guard,
        })
    }
}

/// Parse a filter expression into its terms.
pub fn parse_expression(expression: &str) -> Result<Vec<FilterTerm>, MatchError> {
    let mut terms = Vec::new();
    for part in expression.split('&').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((path, raw)) = part.split_once('=') else {
            return Err(MatchError::argument(format!(
                "filter term '{}' in '{}' is not of the form path=value",
                part, expression
            )));
        };
        let path = path.trim();
        if path.is_empty() {
            return Err(MatchError::argument(format!(
                "filter term '{}' in '{}' has no property path",
                part, expression
            )));
        }
        let (op, rest) = QueryOp::split_prefix(raw.trim());
        let operand = if let Some(input_path) = rest.strip_prefix(INPUT_PREFIX) {
            if input_path.is_empty() {
                return Err(MatchError::argument(format!(
                    "filter term '{}' references an empty input path",
                    part
                )));
            }
            FilterOperand::Input(input_path.to_string())
        } else if rest == "null" {
            FilterOperand::Literal(None)
        } else {
            FilterOperand::Literal(Some(Value::parse_literal(rest)))
        };
        terms.push(FilterTerm {
            path: path.to_string(),
            op,
            operand,
        });
    }
    if terms.is_empty() {
        return Err(MatchError::argument(format!(
            "filter expression '{}' has no terms",
            expression
        )));
    }
    Ok(terms)
}

fn input_references(terms: &[FilterTerm]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for term in terms {
        if let FilterOperand::Input(path) = &term.operand {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
    }
    paths
}

fn is_present(value: &Option<Value>) -> bool {
    matches!(value, Some(v) if !v.is_empty_sequence())
}

/// The query a block resolves to for one input.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPlan {
    /// `skipWhenNull` and every guard property is null: the block does not
    /// take part in the combination.
    Skipped,
    /// No filter term survived the guards: the block yields nothing.
    Empty,
    Query(BlockingQuery),
}

/// Combine a block's result into the running candidate set by key.
pub fn combine_blocks<R: Record>(running: Vec<R>, found: Vec<R>, op: BlockOp) -> Vec<R> {
    match op {
        BlockOp::And => {
            let keys: BTreeSet<&str> = found.iter().map(|r| r.key()).collect();
            running
                .into_iter()
                .filter(|r| keys.contains(r.key()))
                .collect()
        }
        BlockOp::Or => {
            let mut seen: BTreeSet<String> = running.iter().map(|r| r.key().to_string()).collect();
            let mut out = running;
            for r in found {
                if seen.insert(r.key().to_string()) {
                    out.push(r);
                }
            }
            out
        }
    }
}

pub struct BlockingEngine<'a, R: Record> {
    accessor: &'a dyn PropertyAccessor<R>,
    records: &'a dyn RecordQueryProvider<R>,
    active_states: &'a [String],
}

impl<'a, R: Record> BlockingEngine<'a, R> {
    pub fn new(
        accessor: &'a dyn PropertyAccessor<R>,
        records: &'a dyn RecordQueryProvider<R>,
        active_states: &'a [String],
    ) -> Self {
        BlockingEngine {
            accessor,
            records,
            active_states,
        }
    }

    /// Build the query for one block. Filters whose guard fails are left
    /// out unless they are `trueIfNull`.
    pub fn plan(
        &self,
        block: &MatchBlock,
        input: &R,
        ignore_keys: &[String],
    ) -> Result<BlockPlan, MatchError> {
        let compiled = block.compiled()?;

        if block.skip_when_null
            && !compiled.guard.is_empty()
            && compiled
                .guard
                .iter()
                .all(|p| !is_present(&self.accessor.property(input, p)))
        {
            return Ok(BlockPlan::Skipped);
        }

        let mut query = BlockingQuery::new(input.record_type());
        for filter in &compiled.filters {
            let guarded = filter
                .guard
                .iter()
                .all(|p| is_present(&self.accessor.property(input, p)));
            if !guarded && !filter.true_if_null {
                continue;
            }
            for term in &filter.terms {
                query.add_term(&term.path, term.op, self.operand_values(&term.operand, input));
            }
        }
        if query.is_empty() {
            return Ok(BlockPlan::Empty);
        }

        query.exclude(input.key());
        for key in ignore_keys {
            query.exclude(key.as_str());
        }
        if R::HAS_LIFECYCLE {
            query.states = self.active_states.to_vec();
        }
        query.limit = block.max_results;
        Ok(BlockPlan::Query(query))
    }

    fn operand_values(&self, operand: &FilterOperand, input: &R) -> Vec<Option<Value>> {
        match operand {
            FilterOperand::Literal(v) => vec![v.clone()],
            FilterOperand::Input(path) => match self.accessor.property(input, path) {
                Some(Value::Sequence(items)) if !items.is_empty() => {
                    items.into_iter().map(Some).collect()
                }
                Some(Value::Sequence(_)) | None => vec![None],
                Some(v) => vec![Some(v)],
            },
        }
    }

    /// Run every block of the configuration and combine the results.
    pub async fn block(
        &self,
        input: &R,
        configuration: &MatchConfiguration,
        ignore_keys: &[String],
        mut diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<R>, MatchError> {
        if configuration.blocks.is_empty() {
            return Err(MatchError::invalid_state(format!(
                "configuration '{}' has no blocking rules",
                configuration.id
            )));
        }

        record(&mut diagnostics, |d| d.start_stage("blocking"))?;
        let mut running: Option<Vec<R>> = None;

        for (index, block) in configuration.blocks.iter().enumerate() {
            record(&mut diagnostics, |d| {
                d.start_action("block", json!({ "index": index, "op": block.op }))
            })?;

            let found = match self.plan(block, input, ignore_keys)? {
                BlockPlan::Skipped => {
                    tracing::debug!(configuration = %configuration.id, block = index, "block_skipped");
                    record(&mut diagnostics, |d| {
                        d.sample("skipped", json!(true))?;
                        d.end_action()
                    })?;
                    continue;
                }
                BlockPlan::Empty => {
                    record(&mut diagnostics, |d| d.sample("query", serde_json::Value::Null))?;
                    Vec::new()
                }
                BlockPlan::Query(query) => {
                    let found = self.records.query(&query).await?;
                    tracing::debug!(
                        configuration = %configuration.id,
                        block = index,
                        query = %query,
                        candidates = found.len(),
                        "block_query"
                    );
                    record(&mut diagnostics, |d| d.sample("query", json!(query.to_string())))?;
                    found
                }
            };

            record(&mut diagnostics, |d| {
                d.sample("count", json!(found.len()))?;
                d.end_action()
            })?;

            running = Some(match running {
                None => found,
                Some(current) => combine_blocks(current, found, block.op),
            });
        }

        record(&mut diagnostics, |d| d.end_stage())?;

        let mut candidates = running.unwrap_or_default();
        let own_key = input.key();
        candidates.retain(|r| {
            (own_key.is_empty() || r.key() != own_key) && !ignore_keys.iter().any(|k| k == r.key())
        });
        Ok(candidates)
    }
}
