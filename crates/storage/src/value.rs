//! Property values read from records.
//!
//! `Value` is a closed set of shapes. A missing property is represented
//! by `Option::None` at the accessor boundary, never by a variant here.

use std::cmp::Ordering;
use std::fmt;

use time::macros::format_description;
use time::Date;

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(Date),
    Sequence(Vec<Value>),
    /// A reference to another record by key. Two identified values are
    /// equal when they point at the same record.
    Identified(String),
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "Text",
            Value::Number(_) => "Number",
            Value::Bool(_) => "Bool",
            Value::Date(_) => "Date",
            Value::Sequence(_) => "Sequence",
            Value::Identified(_) => "Identified",
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_empty_sequence(&self) -> bool {
        matches!(self, Value::Sequence(items) if items.is_empty())
    }

    /// Parse an ISO calendar date (`YYYY-MM-DD`).
    pub fn parse_date(s: &str) -> Option<Date> {
        Date::parse(s, format_description!("[year]-[month]-[day]")).ok()
    }

    /// Parse a literal as it appears in a filter expression: `true`/`false`,
    /// an ISO date, a number, or otherwise text.
    pub fn parse_literal(s: &str) -> Value {
        match s {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Some(d) = Value::parse_date(s) {
            return Value::Date(d);
        }
        if let Ok(n) = s.parse::<f64>() {
            if n.is_finite() {
                return Value::Number(n);
            }
        }
        Value::Text(s.to_string())
    }

    /// Convert a JSON value. `null` maps to `None`; nulls inside arrays are
    /// dropped. Strings that parse as ISO dates become `Date`, and an
    /// object of the form `{"ref": "<key>"}` becomes `Identified`.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::String(s) => Some(
                Value::parse_date(s)
                    .map(Value::Date)
                    .unwrap_or_else(|| Value::Text(s.clone())),
            ),
            serde_json::Value::Array(items) => Some(Value::Sequence(
                items.iter().filter_map(Value::from_json).collect(),
            )),
            serde_json::Value::Object(map) => map
                .get("ref")
                .and_then(|r| r.as_str())
                .map(|key| Value::Identified(key.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Date(_) => serde_json::Value::String(self.to_string()),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Identified(key) => serde_json::json!({ "ref": key }),
        }
    }

    /// Equality with numeric coercion between numbers and numeric text,
    /// and case-insensitive text comparison. Used where a configured
    /// literal meets a computed value.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Text(b)) | (Value::Text(b), Value::Number(a)) => {
                b.trim().parse::<f64>().map(|b| b == *a).unwrap_or(false)
            }
            (Value::Text(a), Value::Text(b)) => a.eq_ignore_ascii_case(b),
            _ => self == other,
        }
    }

    /// Ordering between values of the same shape (numbers, dates, text).
    /// Returns `None` when the values are not comparable.
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Text(b)) => {
                b.trim().parse::<f64>().ok().and_then(|b| a.partial_cmp(&b))
            }
            (Value::Text(a), Value::Number(b)) => {
                a.trim().parse::<f64>().ok().and_then(|a| a.partial_cmp(b))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Date(d) => write!(
                f,
                "{:04}-{:02}-{:02}",
                d.year(),
                u8::from(d.month()),
                d.day()
            ),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Identified(key) => write!(f, "@{}", key),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Date(d)
    }
}
