//! Transform library.
//!
//! A transform is a named pure function used to normalize operands before
//! an assertion compares them (unary) or to derive a comparison scope from
//! a pair of operands (binary). The [`TransformRegistry`] is an explicit
//! value: the engine is handed one at construction time and looks names up
//! in it during evaluation.
//!
//! Sequence handling is uniform for every transform: a unary transform maps
//! over the elements of a sequence operand, and a binary transform applied
//! to sequence operands produces the cartesian sequence of its results.

pub mod date;
pub mod distance;
pub mod phonetic;
pub mod text;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use recordlink_storage::Value;

use crate::error::MatchError;

/// `value, args -> value`. `Ok(None)` means the result is null.
pub type UnaryFn = dyn Fn(&Value, &[Value]) -> Result<Option<Value>, MatchError> + Send + Sync;

/// `a, b, args -> scope`. `Ok(None)` means no scope could be derived.
pub type BinaryFn =
    dyn Fn(&Value, &Value, &[Value]) -> Result<Option<Value>, MatchError> + Send + Sync;

/// The capability a registered transform provides.
#[derive(Clone)]
pub enum Transform {
    Unary(Arc<UnaryFn>),
    Binary(Arc<BinaryFn>),
}

impl Transform {
    pub fn is_binary(&self) -> bool {
        matches!(self, Transform::Binary(_))
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Unary(_) => write!(f, "Transform::Unary"),
            Transform::Binary(_) => write!(f, "Transform::Binary"),
        }
    }
}

/// A reference to a transform from a configuration: its registry name and
/// the arguments it is invoked with.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRef {
    pub name: String,
    pub args: Vec<Value>,
}

impl TransformRef {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        TransformRef {
            name: name.into(),
            args,
        }
    }
}

/// Named transforms available to assertions and measures.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Transform>,
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TransformRegistry {
    /// A registry with no transforms.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard library of text, distance, phonetic and date transforms.
    pub fn standard() -> Self {
        let mut registry = Self::empty();

        registry.register_unary("substr", text::substr);
        registry.register_unary("to_lower", text::to_lower);
        registry.register_unary("trim", text::trim);
        registry.register_unary("tokenize", text::tokenize);
        registry.register_unary("abs", text::abs);
        registry.register_unary("soundex", phonetic::soundex_transform);
        registry.register_unary("metaphone", phonetic::metaphone_transform);
        registry.register_unary("date_extract", date::date_extract);

        registry.register_binary("levenshtein", distance::levenshtein_transform);
        registry.register_binary("similarity", distance::similarity_transform);
        registry.register_binary("sorensen_dice", distance::sorensen_dice_transform);
        registry.register_binary("jaro_winkler", distance::jaro_winkler_transform);
        registry.register_binary("sounds_like", phonetic::sounds_like);
        registry.register_binary("date_difference", date::date_difference);

        registry
    }

    pub fn register_unary<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Option<Value>, MatchError> + Send + Sync + 'static,
    {
        self.transforms
            .insert(name.to_string(), Transform::Unary(Arc::new(f)));
    }

    pub fn register_binary<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value, &Value, &[Value]) -> Result<Option<Value>, MatchError>
            + Send
            + Sync
            + 'static,
    {
        self.transforms
            .insert(name.to_string(), Transform::Binary(Arc::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.transforms.get(name)
    }

    /// Look up a transform, failing with `ArgumentInvalid` when unknown.
    pub fn resolve(&self, name: &str) -> Result<&Transform, MatchError> {
        self.get(name)
            .ok_or_else(|| MatchError::argument(format!("unknown transform '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }
}

/// Apply a unary transform, mapping over sequences. Elements that map to
/// null are dropped; elements that map to sequences are flattened.
pub fn apply_unary(f: &UnaryFn, value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    match value {
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match f(item, args)? {
                    Some(Value::Sequence(inner)) => out.extend(inner),
                    Some(v) => out.push(v),
                    None => {}
                }
            }
            Ok(Some(Value::Sequence(out)))
        }
        _ => f(value, args),
    }
}

/// Apply a binary transform. Scalars are passed straight through; if either
/// side is a sequence the result is the sequence of `f(x, y)` over the
/// cartesian product, nulls dropped.
pub fn apply_binary(
    f: &BinaryFn,
    a: &Value,
    b: &Value,
    args: &[Value],
) -> Result<Option<Value>, MatchError> {
    match (a, b) {
        (Value::Sequence(_), _) | (_, Value::Sequence(_)) => {
            let left = as_slice(a);
            let right = as_slice(b);
            let mut out = Vec::with_capacity(left.len() * right.len());
            for x in left {
                for y in right {
                    if let Some(v) = f(x, y, args)? {
                        out.push(v);
                    }
                }
            }
            Ok(Some(Value::Sequence(out)))
        }
        _ => f(a, b, args),
    }
}

fn as_slice(v: &Value) -> &[Value] {
    match v {
        Value::Sequence(items) => items,
        other => std::slice::from_ref(other),
    }
}

// ──────────────────────────────────────────────
// Argument helpers shared by the transform modules
// ──────────────────────────────────────────────

/// Text view of a scalar operand. Sequences and record references have none.
pub(crate) fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) | Value::Date(_) => Some(value.to_string()),
        Value::Sequence(_) | Value::Identified(_) => None,
    }
}

pub(crate) fn expect_args(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), MatchError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(MatchError::argument(format!(
            "transform '{}' expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn arg_usize(name: &str, args: &[Value], index: usize) -> Result<Option<usize>, MatchError> {
    match args.get(index) {
        None => Ok(None),
        Some(v) => {
            let n = match v {
                Value::Number(n) => Some(*n),
                Value::Text(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match n {
                Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
                _ => Err(MatchError::argument(format!(
                    "transform '{}' argument {} must be a non-negative integer, got '{}'",
                    name,
                    index + 1,
                    v
                ))),
            }
        }
    }
}

pub(crate) fn arg_text<'a>(name: &str, args: &'a [Value], index: usize) -> Result<Option<&'a str>, MatchError> {
    match args.get(index) {
        None => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s)),
        Some(other) => Err(MatchError::argument(format!(
            "transform '{}' argument {} must be text, got {}",
            name,
            index + 1,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_both_kinds() {
        let registry = TransformRegistry::standard();
        assert!(!registry.resolve("soundex").unwrap().is_binary());
        assert!(registry.resolve("levenshtein").unwrap().is_binary());
        assert!(registry.resolve("no_such").is_err());
    }

    #[test]
    fn unary_maps_over_sequences() {
        let registry = TransformRegistry::standard();
        let Transform::Unary(f) = registry.resolve("to_lower").unwrap().clone() else {
            panic!("to_lower should be unary");
        };
        let seq = Value::Sequence(vec![Value::text("A"), Value::text("B")]);
        assert_eq!(
            apply_unary(f.as_ref(), &seq, &[]).unwrap(),
            Some(Value::Sequence(vec![Value::text("a"), Value::text("b")]))
        );
    }

    #[test]
    fn binary_over_sequences_is_cartesian() {
        let registry = TransformRegistry::standard();
        let Transform::Binary(f) = registry.resolve("levenshtein").unwrap().clone() else {
            panic!("levenshtein should be binary");
        };
        let a = Value::Sequence(vec![Value::text("ab"), Value::text("abc")]);
        let b = Value::text("abc");
        assert_eq!(
            apply_binary(f.as_ref(), &a, &b, &[]).unwrap(),
            Some(Value::Sequence(vec![Value::Number(1.0), Value::Number(0.0)]))
        );
    }

    #[test]
    fn custom_transforms_can_be_registered() {
        let mut registry = TransformRegistry::empty();
        registry.register_unary("first_char", |v, _| {
            Ok(text_of(v).and_then(|s| s.chars().next()).map(|c| Value::text(c.to_string())))
        });
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["first_char"]);
    }

    #[test]
    fn argument_count_checked() {
        let err = expect_args("substr", &[], 1, 2).unwrap_err();
        assert!(err.to_string().contains("1 to 2"));
    }
}
