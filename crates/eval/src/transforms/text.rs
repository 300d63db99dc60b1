//! Unary text and numeric normalizers.

use recordlink_storage::Value;

use super::{arg_text, arg_usize, expect_args, text_of};
use crate::error::MatchError;

const DEFAULT_SEPARATORS: &str = " \t,;-.";

/// `substr(start[, length])` over characters. A start past the end yields
/// empty text.
pub fn substr(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("substr", args, 1, 2)?;
    let start = arg_usize("substr", args, 0)?.unwrap_or(0);
    let length = arg_usize("substr", args, 1)?;
    let Some(text) = text_of(value) else {
        return Ok(None);
    };
    let chars = text.chars().skip(start);
    let out: String = match length {
        Some(n) => chars.take(n).collect(),
        None => chars.collect(),
    };
    Ok(Some(Value::Text(out)))
}

pub fn to_lower(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("to_lower", args, 0, 0)?;
    Ok(text_of(value).map(|s| Value::Text(s.to_lowercase())))
}

pub fn trim(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("trim", args, 0, 0)?;
    Ok(text_of(value).map(|s| Value::Text(s.trim().to_string())))
}

/// `tokenize([separators])`: split text into a sequence of non-empty tokens.
pub fn tokenize(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("tokenize", args, 0, 1)?;
    let separators = arg_text("tokenize", args, 0)?.unwrap_or(DEFAULT_SEPARATORS);
    let Some(text) = text_of(value) else {
        return Ok(None);
    };
    let tokens = text
        .split(|c: char| separators.contains(c))
        .filter(|t| !t.is_empty())
        .map(Value::text)
        .collect();
    Ok(Some(Value::Sequence(tokens)))
}

/// Absolute value of a number (or numeric text).
pub fn abs(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("abs", args, 0, 0)?;
    let n = match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(n.map(|n| Value::Number(n.abs())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_counts_characters() {
        assert_eq!(
            substr(&Value::text("Jöhn"), &[Value::Number(0.0), Value::Number(2.0)]).unwrap(),
            Some(Value::text("Jö"))
        );
        assert_eq!(
            substr(&Value::text("John"), &[Value::Number(2.0)]).unwrap(),
            Some(Value::text("hn"))
        );
        assert_eq!(
            substr(&Value::text("John"), &[Value::Number(10.0)]).unwrap(),
            Some(Value::text(""))
        );
    }

    #[test]
    fn substr_rejects_bad_arguments() {
        assert!(substr(&Value::text("John"), &[]).is_err());
        assert!(substr(&Value::text("John"), &[Value::Number(-1.0)]).is_err());
        assert!(substr(&Value::text("John"), &[Value::text("x")]).is_err());
    }

    #[test]
    fn tokenize_default_and_custom_separators() {
        assert_eq!(
            tokenize(&Value::text("Mary-Anne  Smith"), &[]).unwrap(),
            Some(Value::Sequence(vec![
                Value::text("Mary"),
                Value::text("Anne"),
                Value::text("Smith"),
            ]))
        );
        assert_eq!(
            tokenize(&Value::text("a/b"), &[Value::text("/")]).unwrap(),
            Some(Value::Sequence(vec![Value::text("a"), Value::text("b")]))
        );
    }

    #[test]
    fn lower_trim_abs() {
        assert_eq!(to_lower(&Value::text("SMITH"), &[]).unwrap(), Some(Value::text("smith")));
        assert_eq!(trim(&Value::text("  x "), &[]).unwrap(), Some(Value::text("x")));
        assert_eq!(abs(&Value::Number(-3.5), &[]).unwrap(), Some(Value::Number(3.5)));
        assert_eq!(abs(&Value::text("abc"), &[]).unwrap(), None);
        assert_eq!(to_lower(&Value::Identified("k".into()), &[]).unwrap(), None);
    }
}
