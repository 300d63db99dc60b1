//! Records and property access.
//!
//! The engine never inspects record types directly. It needs a key, a
//! type tag, optionally a lifecycle state, and a [`PropertyAccessor`] that
//! reads named properties as [`Value`]s.

use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::value::Value;

/// A record that can be blocked and classified.
pub trait Record: Clone + Send + Sync + 'static {
    /// Whether records of this type carry a lifecycle state. When true,
    /// blocking queries restrict candidates to the active states.
    const HAS_LIFECYCLE: bool = false;

    /// The record's key. Empty for records that have not been persisted.
    fn key(&self) -> &str;

    /// The resource type tag matched against configuration targets.
    fn record_type(&self) -> &str;

    fn lifecycle_state(&self) -> Option<&str> {
        None
    }
}

/// Reads a property of a record by path.
pub trait PropertyAccessor<R>: Send + Sync {
    /// Returns `None` when the property is absent or null.
    fn property(&self, record: &R, path: &str) -> Option<Value>;
}

impl<R, F> PropertyAccessor<R> for F
where
    F: Fn(&R, &str) -> Option<Value> + Send + Sync,
{
    fn property(&self, record: &R, path: &str) -> Option<Value> {
        self(record, path)
    }
}

// ── DynamicRecord ───────────────────────────────────────────────────

/// A schemaless record: key, type, optional state, and a flat map of
/// property paths to values.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    pub key: String,
    pub record_type: String,
    pub state: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

impl DynamicRecord {
    pub fn new(key: impl Into<String>, record_type: impl Into<String>) -> Self {
        DynamicRecord {
            key: key.into(),
            record_type: record_type.into(),
            state: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_field(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(path.into(), value.into());
        self
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    /// Build a record from JSON of the form
    /// `{"key": .., "type": .., "state": .., "fields": {..}}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, StorageError> {
        let key = json
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StorageError::InvalidRecord {
                message: "missing string field 'key'".to_string(),
            })?;
        let record_type = json
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StorageError::InvalidRecord {
                message: format!("record '{}' missing string field 'type'", key),
            })?;

        let mut record = DynamicRecord::new(key, record_type);
        if let Some(state) = json.get("state").and_then(|v| v.as_str()) {
            record.state = Some(state.to_string());
        }
        if let Some(fields) = json.get("fields") {
            let map = fields
                .as_object()
                .ok_or_else(|| StorageError::InvalidRecord {
                    message: format!("record '{}': 'fields' must be an object", key),
                })?;
            for (path, value) in map {
                if let Some(v) = Value::from_json(value) {
                    record.fields.insert(path.clone(), v);
                }
            }
        }
        Ok(record)
    }

    /// Parse a JSON array of records.
    pub fn list_from_json(json: &serde_json::Value) -> Result<Vec<Self>, StorageError> {
        json.as_array()
            .ok_or_else(|| StorageError::InvalidRecord {
                message: "expected a JSON array of records".to_string(),
            })?
            .iter()
            .map(DynamicRecord::from_json)
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        let mut out = serde_json::json!({
            "key": self.key,
            "type": self.record_type,
            "fields": fields,
        });
        if let Some(state) = &self.state {
            out["state"] = serde_json::Value::String(state.clone());
        }
        out
    }
}

impl Record for DynamicRecord {
    const HAS_LIFECYCLE: bool = true;

    fn key(&self) -> &str {
        &self.key
    }

    fn record_type(&self) -> &str {
        &self.record_type
    }

    fn lifecycle_state(&self) -> Option<&str> {
        self.state.as_deref()
    }
}

/// Property accessor over [`DynamicRecord`] field paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldAccessor;

impl PropertyAccessor<DynamicRecord> for FieldAccessor {
    fn property(&self, record: &DynamicRecord, path: &str) -> Option<Value> {
        record.get(path).cloned()
    }
}
