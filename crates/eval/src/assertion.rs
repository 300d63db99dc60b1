//! Assertion evaluator.
//!
//! Evaluates an attribute's assertion tree over one pair of property
//! values and turns the outcome into a score:
//!
//! 1. The node's transforms run in order. Unary transforms replace both
//!    operands; binary transforms replace the running scope (only the last
//!    binary result is kept). A null or empty operand stops evaluation.
//! 2. A sequence scope is reduced to its maximum element.
//! 3. Composite nodes fold their children with AND/OR; any child that was
//!    not evaluated makes the whole node not evaluated.
//! 4. Comparison nodes compare the scope against the configured literal,
//!    or otherwise the operands directly.
//!
//! A pass scores the match weight (scaled by the measure, if any), a fail
//! the non-match weight, and a node that was not evaluated falls back to
//! the attribute's null policy.

use std::cmp::Ordering;
use std::mem::discriminant;

use recordlink_storage::Value;

use crate::configuration::{Assertion, ComparisonOp, LogicalOp, MatchAttribute};
use crate::error::MatchError;
use crate::transforms::{apply_binary, apply_unary, Transform, TransformRef, TransformRegistry};

/// Result of evaluating one attribute over one property pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionOutcome {
    pub property: String,
    pub evaluated: bool,
    pub passed: bool,
    /// `None` when the attribute is dropped (`Ignore` null policy).
    pub score: Option<f64>,
    /// Operands after the top-level transforms.
    pub a: Option<Value>,
    pub b: Option<Value>,
}

struct Check {
    result: Option<bool>,
    a: Option<Value>,
    b: Option<Value>,
}

impl Check {
    fn not_evaluated(a: Option<Value>, b: Option<Value>) -> Self {
        Check { result: None, a, b }
    }
}

pub struct AssertionEvaluator<'r> {
    registry: &'r TransformRegistry,
}

impl<'r> AssertionEvaluator<'r> {
    pub fn new(registry: &'r TransformRegistry) -> Self {
        AssertionEvaluator { registry }
    }

    /// Evaluate `attribute`'s assertion for values `a` (input) and `b`
    /// (candidate) read from `property`.
    pub fn evaluate(
        &self,
        attribute: &MatchAttribute,
        property: &str,
        a: Option<Value>,
        b: Option<Value>,
    ) -> Result<AssertionOutcome, MatchError> {
        let check = self.check(&attribute.assertion, a.clone(), b.clone())?;

        let (evaluated, passed, score) = match check.result {
            None => (false, false, attribute.null_score()?),
            Some(passed) => {
                let weights = attribute.weights()?;
                let mut score = if passed {
                    weights.match_weight
                } else {
                    weights.non_match_weight
                };
                if passed {
                    if let Some(measure) = &attribute.measure {
                        if let Some(factor) = self.measure(measure, a, b)? {
                            score *= factor;
                        }
                    }
                }
                (true, passed, Some(score))
            }
        };

        tracing::trace!(
            attribute = %attribute.id,
            property,
            evaluated,
            passed,
            score = ?score,
            "assertion_evaluated"
        );

        Ok(AssertionOutcome {
            property: property.to_string(),
            evaluated,
            passed,
            score,
            a: check.a,
            b: check.b,
        })
    }

    fn check(
        &self,
        assertion: &Assertion,
        a: Option<Value>,
        b: Option<Value>,
    ) -> Result<Check, MatchError> {
        let (mut a, mut b) = match (a, b) {
            (Some(a), Some(b)) if !a.is_empty_sequence() && !b.is_empty_sequence() => (a, b),
            (a, b) => return Ok(Check::not_evaluated(a, b)),
        };

        let mut scope = None;
        for transform in assertion.transforms() {
            if !self.apply(transform, &mut a, &mut b, &mut scope)? {
                return Ok(Check::not_evaluated(Some(a), Some(b)));
            }
        }
        let scope = match scope {
            Some(s) => match reduce_scope(s)? {
                Some(s) => Some(s),
                None => return Ok(Check::not_evaluated(Some(a), Some(b))),
            },
            None => None,
        };

        let result = match assertion {
            Assertion::Composite { op, children, .. } => {
                let mut results = Vec::with_capacity(children.len());
                for child in children {
                    match self.check(child, Some(a.clone()), Some(b.clone()))?.result {
                        Some(r) => results.push(r),
                        None => return Ok(Check::not_evaluated(Some(a), Some(b))),
                    }
                }
                match op {
                    LogicalOp::AndAlso => results.iter().all(|r| *r),
                    LogicalOp::OrElse => results.iter().any(|r| *r),
                }
            }
            Assertion::Comparison { op, value, .. } => {
                compare(*op, value.as_ref(), scope.as_ref(), &a, &b)?
            }
        };

        Ok(Check {
            result: Some(result),
            a: Some(a),
            b: Some(b),
        })
    }

    /// Apply one transform. Returns `false` when evaluation must stop.
    fn apply(
        &self,
        transform: &TransformRef,
        a: &mut Value,
        b: &mut Value,
        scope: &mut Option<Value>,
    ) -> Result<bool, MatchError> {
        match self.registry.resolve(&transform.name)? {
            Transform::Unary(f) => {
                let next_a = apply_unary(f.as_ref(), a, &transform.args)?;
                let next_b = apply_unary(f.as_ref(), b, &transform.args)?;
                match (next_a, next_b) {
                    (Some(x), Some(y)) if !x.is_empty_sequence() && !y.is_empty_sequence() => {
                        *a = x;
                        *b = y;
                    }
                    _ => return Ok(false),
                }
            }
            Transform::Binary(f) => match apply_binary(f.as_ref(), a, b, &transform.args)? {
                Some(s) => *scope = Some(s),
                None => return Ok(false),
            },
        }
        Ok(true)
    }

    /// Run a measure chain over the original operands. Returns the numeric
    /// factor, or `None` when the chain produced no scope.
    fn measure(
        &self,
        transforms: &[TransformRef],
        a: Option<Value>,
        b: Option<Value>,
    ) -> Result<Option<f64>, MatchError> {
        let (Some(mut a), Some(mut b)) = (a, b) else {
            return Ok(None);
        };
        let mut scope = None;
        for transform in transforms {
            if !self.apply(transform, &mut a, &mut b, &mut scope)? {
                return Ok(None);
            }
        }
        match scope.map(reduce_scope).transpose()?.flatten() {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(n)),
            Some(Value::Bool(b)) => Ok(Some(if b { 1.0 } else { 0.0 })),
            Some(other) => Err(MatchError::argument(format!(
                "measure must produce a number, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Reduce a sequence scope to its maximum element. Mixed element types
/// have no maximum.
fn reduce_scope(scope: Value) -> Result<Option<Value>, MatchError> {
    let Value::Sequence(items) = scope else {
        return Ok(Some(scope));
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                if discriminant(&current) != discriminant(&item) {
                    return Err(MatchError::argument(format!(
                        "cannot take the maximum of mixed {} and {} values",
                        current.type_name(),
                        item.type_name()
                    )));
                }
                match (&current, &item) {
                    (Value::Bool(x), Value::Bool(y)) => Value::Bool(*x || *y),
                    (Value::Number(_), _) | (Value::Date(_), _) | (Value::Text(_), _) => {
                        if item.partial_compare(&current) == Some(Ordering::Greater) {
                            item
                        } else {
                            current
                        }
                    }
                    _ => {
                        return Err(MatchError::argument(format!(
                            "cannot take the maximum of {} values",
                            current.type_name()
                        )))
                    }
                }
            }
        });
    }
    Ok(best)
}

fn ordering_holds(op: ComparisonOp, ord: Ordering) -> bool {
    match op {
        ComparisonOp::Equal => ord == Ordering::Equal,
        ComparisonOp::NotEqual => ord != Ordering::Equal,
        ComparisonOp::LessThan => ord == Ordering::Less,
        ComparisonOp::LessThanOrEqual => ord != Ordering::Greater,
        ComparisonOp::GreaterThan => ord == Ordering::Greater,
        ComparisonOp::GreaterThanOrEqual => ord != Ordering::Less,
    }
}

/// Direct operand equality: record identity, element-wise sequences, or
/// plain value equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Identified(x), Value::Identified(y)) => x == y,
        (Value::Sequence(xs), Value::Sequence(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

fn compare(
    op: ComparisonOp,
    literal: Option<&Value>,
    scope: Option<&Value>,
    a: &Value,
    b: &Value,
) -> Result<bool, MatchError> {
    match literal {
        Some(literal) => {
            let Some(scope) = scope else {
                return Err(MatchError::argument(format!(
                    "assertion compares against '{}' but no binary transform produced a value to compare",
                    literal
                )));
            };
            if !op.is_ordering() {
                let equal = scope.loosely_equals(literal);
                return Ok(if op == ComparisonOp::Equal { equal } else { !equal });
            }
            if !matches!(scope, Value::Number(_)) {
                return Err(MatchError::argument(format!(
                    "ordering comparison needs a numeric value, got {}",
                    scope.type_name()
                )));
            }
            let ord = scope.partial_compare(literal).ok_or_else(|| {
                MatchError::argument(format!("cannot compare {} with '{}'", scope, literal))
            })?;
            Ok(ordering_holds(op, ord))
        }
        None => {
            if op.is_ordering() {
                return Err(MatchError::argument(
                    "ordering comparison needs a literal value",
                ));
            }
            let equal = values_equal(a, b);
            Ok(if op == ComparisonOp::Equal { equal } else { !equal })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::NullBehavior;

    fn equal() -> Assertion {
        Assertion::Comparison {
            op: ComparisonOp::Equal,
            value: None,
            transforms: vec![],
        }
    }

    fn scoped(op: ComparisonOp, value: f64, transforms: Vec<TransformRef>) -> Assertion {
        Assertion::Comparison {
            op,
            value: Some(Value::Number(value)),
            transforms,
        }
    }

    fn attribute(assertion: Assertion) -> MatchAttribute {
        MatchAttribute::new("given", vec!["given".into()], assertion).with_probabilities(0.9, 0.1)
    }

    fn t(name: &str) -> TransformRef {
        TransformRef::new(name, vec![])
    }

    #[test]
    fn equal_values_score_match_weight() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let attr = attribute(equal());

        let hit = eval
            .evaluate(&attr, "given", Some(Value::text("John")), Some(Value::text("John")))
            .unwrap();
        assert!(hit.evaluated && hit.passed);
        assert!((hit.score.unwrap() - 3.16993).abs() < 1e-4);

        let miss = eval
            .evaluate(&attr, "given", Some(Value::text("John")), Some(Value::text("Mary")))
            .unwrap();
        assert!(miss.evaluated && !miss.passed);
        assert!((miss.score.unwrap() + 3.16993).abs() < 1e-4);
    }

    #[test]
    fn null_operand_uses_policy() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);

        let attr = attribute(equal()).with_null_behavior(NullBehavior::Ignore);
        let out = eval.evaluate(&attr, "given", None, Some(Value::text("John"))).unwrap();
        assert!(!out.evaluated);
        assert_eq!(out.score, None);

        let attr = attribute(equal()).with_null_behavior(NullBehavior::Zero);
        let empty = Value::Sequence(vec![]);
        let out = eval
            .evaluate(&attr, "given", Some(empty), Some(Value::text("John")))
            .unwrap();
        assert_eq!(out.score, Some(0.0));
    }

    #[test]
    fn binary_scope_against_literal() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let attr = attribute(scoped(
            ComparisonOp::GreaterThanOrEqual,
            0.8,
            vec![t("to_lower"), t("sorensen_dice")],
        ));
        let out = eval
            .evaluate(&attr, "given", Some(Value::text("Zambia")), Some(Value::text("GAMBIA")))
            .unwrap();
        assert!(out.passed);
        assert_eq!(out.a, Some(Value::text("zambia")));
    }

    #[test]
    fn sequence_scope_reduces_to_maximum() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let attr = attribute(scoped(
            ComparisonOp::GreaterThan,
            0.9,
            vec![t("tokenize"), t("similarity")],
        ));
        let out = eval
            .evaluate(&attr, "given", Some(Value::text("Mary Anne")), Some(Value::text("Anne")))
            .unwrap();
        assert!(out.passed);
    }

    #[test]
    fn only_latest_binary_scope_is_kept() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        // levenshtein would be 1.0; similarity of John/Jon is 0.75.
        let attr = attribute(scoped(
            ComparisonOp::LessThan,
            1.0,
            vec![t("levenshtein"), t("similarity")],
        ));
        let out = eval
            .evaluate(&attr, "given", Some(Value::text("John")), Some(Value::text("Jon")))
            .unwrap();
        assert!(out.passed);
    }

    #[test]
    fn composite_not_evaluated_propagates() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let attr = attribute(Assertion::Composite {
            op: LogicalOp::OrElse,
            transforms: vec![],
            children: vec![
                equal(),
                Assertion::Comparison {
                    op: ComparisonOp::Equal,
                    value: None,
                    // Identified values have no text, so soundex yields null.
                    transforms: vec![t("soundex")],
                },
            ],
        });
        let out = eval
            .evaluate(
                &attr,
                "link",
                Some(Value::Identified("p-1".into())),
                Some(Value::Identified("p-1".into())),
            )
            .unwrap();
        assert!(!out.evaluated);
    }

    #[test]
    fn composite_folds_children() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let attr = attribute(Assertion::Composite {
            op: LogicalOp::AndAlso,
            transforms: vec![t("to_lower")],
            children: vec![
                equal(),
                scoped(ComparisonOp::GreaterThan, 0.5, vec![t("jaro_winkler")]),
            ],
        });
        let out = eval
            .evaluate(&attr, "given", Some(Value::text("SMITH")), Some(Value::text("smith")))
            .unwrap();
        assert!(out.passed);
    }

    #[test]
    fn measure_scales_passing_score() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let mut attr = attribute(scoped(ComparisonOp::GreaterThan, 0.5, vec![t("similarity")]));
        attr.measure = Some(vec![t("similarity")]);
        let out = eval
            .evaluate(&attr, "given", Some(Value::text("John")), Some(Value::text("Jon")))
            .unwrap();
        assert!((out.score.unwrap() - 0.75 * 9f64.log2()).abs() < 1e-9);
    }

    #[test]
    fn literal_without_scope_is_invalid() {
        let registry = TransformRegistry::standard();
        let eval = AssertionEvaluator::new(&registry);
        let attr = attribute(scoped(ComparisonOp::Equal, 1.0, vec![]));
        let err = eval
            .evaluate(&attr, "given", Some(Value::text("a")), Some(Value::text("b")))
            .unwrap_err();
        assert!(matches!(err, MatchError::ArgumentInvalid { .. }));
    }

    #[test]
    fn mixed_scope_sequence_is_invalid() {
        let seq = Value::Sequence(vec![Value::Number(1.0), Value::text("x")]);
        assert!(reduce_scope(seq).is_err());
        let seq = Value::Sequence(vec![Value::Bool(false), Value::Bool(true)]);
        assert_eq!(reduce_scope(seq).unwrap(), Some(Value::Bool(true)));
    }

    #[test]
    fn identified_values_compare_by_key() {
        assert!(values_equal(
            &Value::Identified("p-1".into()),
            &Value::Identified("p-1".into())
        ));
        assert!(!values_equal(
            &Value::Sequence(vec![Value::text("a")]),
            &Value::Sequence(vec![Value::text("a"), Value::text("b")])
        ));
    }
}
