//! Typed structs representing match configuration documents.
//!
//! These are the document form of a configuration: what an author writes
//! and what gets persisted. The evaluator converts them into its own
//! runtime model (parsed assertion trees, weight caches, compiled blocks).
//! Literal values inside assertions and transform arguments are kept as
//! `serde_json::Value` so each consumer can interpret them on its own terms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parsed configuration document, dispatched by its `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ConfigDocument {
    #[serde(rename = "MatchConfiguration")]
    Configuration(ConfigurationDoc),
    #[serde(rename = "MatchConfigurationCollection")]
    Collection(CollectionDoc),
}

impl ConfigDocument {
    /// The name the document is registered under.
    pub fn id(&self) -> &str {
        match self {
            ConfigDocument::Configuration(c) => &c.id,
            ConfigDocument::Collection(c) => &c.id,
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// A single match configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDoc {
    pub id: String,
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    #[serde(rename = "target")]
    pub targets: Vec<TargetDoc>,
    #[serde(default)]
    pub blocking: Vec<BlockDoc>,
    #[serde(default)]
    pub scoring: Vec<AttributeDoc>,
    pub match_threshold: f64,
    pub non_match_threshold: f64,
    #[serde(default)]
    pub evaluation_mode: EvaluationMode,
    #[serde(default)]
    pub metadata: MetadataDoc,
}

/// The record type a configuration applies to, plus the events that
/// trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDoc {
    pub resource: String,
    #[serde(default, rename = "event")]
    pub events: Vec<String>,
}

/// Whether thresholds apply to the raw score or the normalized strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    AbsoluteScore,
    Strength,
}

/// Authoring metadata. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub status: ConfigurationStatus,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationStatus {
    #[default]
    Active,
    Inactive,
}

// ── Blocking ────────────────────────────────────────────────────────

/// One blocking block: filters plus how the block's result combines with
/// the running candidate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDoc {
    #[serde(rename = "filter")]
    pub filters: Vec<FilterDoc>,
    #[serde(default)]
    pub op: BlockOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub skip_when_null: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDoc {
    pub expression: String,
    #[serde(default)]
    pub guard: Vec<String>,
    #[serde(default)]
    pub true_if_null: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOp {
    #[default]
    And,
    Or,
}

// ── Scoring ─────────────────────────────────────────────────────────

/// A scoring attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDoc {
    pub id: String,
    #[serde(rename = "property")]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_match_weight: Option<f64>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub when_null: NullBehavior,
    #[serde(default)]
    pub when: Vec<String>,
    pub assertion: AssertionDoc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<MeasureDoc>,
}

/// What an attribute contributes when its operands could not be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullBehavior {
    Disqualify,
    Zero,
    Match,
    #[default]
    NonMatch,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
}

impl AssertionOp {
    pub fn is_composite(self) -> bool {
        matches!(self, AssertionOp::AndAlso | AssertionOp::OrElse)
    }
}

/// A node of an assertion tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionDoc {
    pub op: AssertionOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, rename = "transform")]
    pub transforms: Vec<TransformDoc>,
    #[serde(default, rename = "assertion")]
    pub assertions: Vec<AssertionDoc>,
}

/// A named transform invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDoc {
    pub name: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// Partial-credit transform chain applied after a passing assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureDoc {
    #[serde(rename = "transform")]
    pub transforms: Vec<TransformDoc>,
}

// ── Collection ──────────────────────────────────────────────────────

/// Several configurations sharing transform aliases. Resolves to the
/// first member targeting the requested record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDoc {
    pub id: String,
    #[serde(rename = "configuration")]
    pub configurations: Vec<ConfigurationDoc>,
    #[serde(default, rename = "transform")]
    pub transforms: Vec<TransformAliasDoc>,
}

/// An alias binding a new transform name to a registered transform plus
/// leading arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformAliasDoc {
    pub name: String,
    pub transform: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}
