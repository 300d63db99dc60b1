//! Classification engine: scores candidates against the input and assigns
//! Match / Probable / NonMatch.

use std::collections::BTreeMap;
use std::fmt;

use recordlink_storage::{PropertyAccessor, Record};
use serde::Serialize;
use serde_json::json;

use crate::assertion::{AssertionEvaluator, AssertionOutcome};
use crate::configuration::{EvaluationMode, MatchAttribute, MatchConfiguration};
use crate::diagnostics::{record, DiagnosticSession};
use crate::error::MatchError;
use crate::transforms::TransformRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    Match,
    Probable,
    NonMatch,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Match => f.pad("Match"),
            Classification::Probable => f.pad("Probable"),
            Classification::NonMatch => f.pad("NonMatch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchMethod {
    /// Weighted attribute scoring.
    Probabilistic,
    /// Blocking alone decided: the configuration has no scoring attributes.
    Deterministic,
}

/// Per-attribute entry of a match result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorResult {
    pub attribute: String,
    /// The winning property path, when any alternative was evaluated.
    pub property: Option<String>,
    pub evaluated: bool,
    pub passed: bool,
    pub m: Option<f64>,
    pub match_weight: f64,
    /// Achieved score. `None` when the attribute was dropped.
    pub score: Option<f64>,
}

/// The outcome for one candidate.
#[derive(Debug, Clone)]
pub struct MatchResult<R> {
    pub record: R,
    pub configuration: String,
    pub score: f64,
    pub strength: f64,
    pub classification: Classification,
    pub method: MatchMethod,
    pub vectors: Vec<VectorResult>,
}

/// Classify a value against the thresholds.
pub fn classify_value(value: f64, match_threshold: f64, non_match_threshold: f64) -> Classification {
    if value > match_threshold {
        Classification::Match
    } else if value <= non_match_threshold {
        Classification::NonMatch
    } else {
        Classification::Probable
    }
}

/// `(score - min) / (max - min)` clamped into `[0, 1]`; zero when the
/// range is empty.
pub fn strength(score: f64, min_possible: f64, max_possible: f64) -> f64 {
    let range = max_possible - min_possible;
    if range == 0.0 || !range.is_finite() {
        return 0.0;
    }
    ((score - min_possible) / range).clamp(0.0, 1.0)
}

pub struct ClassificationEngine<'a, R: Record> {
    accessor: &'a dyn PropertyAccessor<R>,
    evaluator: AssertionEvaluator<'a>,
}

impl<'a, R: Record> ClassificationEngine<'a, R> {
    pub fn new(accessor: &'a dyn PropertyAccessor<R>, registry: &'a TransformRegistry) -> Self {
        ClassificationEngine {
            accessor,
            evaluator: AssertionEvaluator::new(registry),
        }
    }

    /// Score every candidate. Results follow candidate order.
    pub fn classify(
        &self,
        input: &R,
        candidates: &[R],
        configuration: &MatchConfiguration,
        mut diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<MatchResult<R>>, MatchError> {
        record(&mut diagnostics, |d| d.start_stage("classification"))?;
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            results.push(self.score_candidate(
                input,
                candidate,
                configuration,
                diagnostics.as_deref_mut(),
            )?);
        }
        record(&mut diagnostics, |d| d.end_stage())?;
        Ok(results)
    }

    /// Score one candidate against the input.
    pub fn score_candidate(
        &self,
        input: &R,
        candidate: &R,
        configuration: &MatchConfiguration,
        mut diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<MatchResult<R>, MatchError> {
        record(&mut diagnostics, |d| {
            d.start_action("candidate", json!({ "key": candidate.key() }))
        })?;

        if configuration.attributes.is_empty() {
            record(&mut diagnostics, |d| {
                d.sample("method", json!(MatchMethod::Deterministic))?;
                d.end_action()
            })?;
            return Ok(MatchResult {
                record: candidate.clone(),
                configuration: configuration.id.clone(),
                score: 0.0,
                strength: 1.0,
                classification: Classification::Match,
                method: MatchMethod::Deterministic,
                vectors: Vec::new(),
            });
        }

        // Best alternative per attribute.
        let mut outcomes: Vec<AssertionOutcome> = Vec::with_capacity(configuration.attributes.len());
        for attribute in &configuration.attributes {
            record(&mut diagnostics, |d| {
                d.start_action("attribute", json!({ "id": attribute.id }))
            })?;
            let outcome = self.best_alternative(attribute, input, candidate)?;
            record(&mut diagnostics, |d| {
                d.sample("property", json!(outcome.property))?;
                d.sample("evaluated", json!(outcome.evaluated))?;
                d.sample("passed", json!(outcome.passed))?;
                d.sample("score", json!(outcome.score))?;
                d.end_action()
            })?;
            outcomes.push(outcome);
        }

        // `when` dependencies read the outcomes as evaluated above.
        let positive: BTreeMap<&str, bool> = configuration
            .attributes
            .iter()
            .zip(&outcomes)
            .map(|(a, o)| (a.id.as_str(), o.evaluated && o.score.is_some_and(|s| s > 0.0)))
            .collect();

        let mut vectors = Vec::with_capacity(outcomes.len());
        let mut score = 0.0;
        let mut min_possible = 0.0;
        let mut max_possible = 0.0;
        let mut required_failed = false;

        for (attribute, mut outcome) in configuration.attributes.iter().zip(outcomes) {
            let satisfied = attribute
                .when
                .iter()
                .all(|dep| positive.get(dep.as_str()).copied().unwrap_or(false));
            if !satisfied {
                outcome.evaluated = false;
                outcome.passed = false;
                outcome.score = attribute.null_score()?;
            }

            let weights = attribute.weights()?;
            if let Some(s) = outcome.score {
                score += s;
                min_possible += weights.non_match_weight;
                max_possible += weights.match_weight;
            }
            if attribute.required && !outcome.passed {
                required_failed = true;
            }

            vectors.push(VectorResult {
                attribute: attribute.id.clone(),
                property: outcome.evaluated.then(|| outcome.property.clone()),
                evaluated: outcome.evaluated,
                passed: outcome.passed,
                m: attribute.m,
                match_weight: weights.match_weight,
                score: outcome.score,
            });
        }

        let strength = strength(score, min_possible, max_possible);
        let value = match configuration.evaluation_mode {
            EvaluationMode::AbsoluteScore => score,
            EvaluationMode::Strength => strength,
        };
        let classification = if required_failed {
            Classification::NonMatch
        } else {
            classify_value(
                value,
                configuration.match_threshold,
                configuration.non_match_threshold,
            )
        };

        tracing::debug!(
            configuration = %configuration.id,
            candidate = candidate.key(),
            score,
            strength,
            classification = %classification,
            "candidate_classified"
        );
        record(&mut diagnostics, |d| {
            d.sample("score", json!(score))?;
            d.sample("strength", json!(strength))?;
            d.sample("classification", json!(classification))?;
            d.end_action()
        })?;

        Ok(MatchResult {
            record: candidate.clone(),
            configuration: configuration.id.clone(),
            score,
            strength,
            classification,
            method: MatchMethod::Probabilistic,
            vectors,
        })
    }

    /// Evaluate every property alternative and keep the highest-scoring one
    /// that was evaluated. With none evaluated, the first alternative's
    /// null-policy outcome stands.
    fn best_alternative(
        &self,
        attribute: &MatchAttribute,
        input: &R,
        candidate: &R,
    ) -> Result<AssertionOutcome, MatchError> {
        let mut best: Option<AssertionOutcome> = None;
        let mut fallback: Option<AssertionOutcome> = None;
        for property in &attribute.properties {
            let a = self.accessor.property(input, property);
            let b = self.accessor.property(candidate, property);
            let outcome = self.evaluator.evaluate(attribute, property, a, b)?;
            if !outcome.evaluated {
                fallback.get_or_insert(outcome);
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => outcome.score.unwrap_or(f64::MIN) > current.score.unwrap_or(f64::MIN),
            };
            if better {
                best = Some(outcome);
            }
        }
        best.or(fallback).ok_or_else(|| {
            MatchError::invalid_state(format!("attribute '{}' has no properties", attribute.id))
        })
    }
}
