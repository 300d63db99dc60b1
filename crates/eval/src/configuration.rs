//! Runtime configuration model.
//!
//! These types are DISTINCT from the document types in
//! `recordlink-interchange`. A document is validated and converted once
//! (`from_document`); the runtime form is then logically immutable and
//! may be shared across concurrent matching runs. The only interior
//! mutability is compute-once caching: attribute weights and compiled
//! blocking filters.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use recordlink_interchange::{
    validate_configuration, AssertionDoc, AssertionOp, AttributeDoc, BlockDoc, CollectionDoc,
    ConfigDocument, ConfigurationDoc, ConfigurationStatus, TransformAliasDoc, TransformDoc,
};
pub use recordlink_interchange::{BlockOp, EvaluationMode, NullBehavior};
use recordlink_storage::Value;
use uuid::Uuid;

use crate::blocking::CompiledBlock;
use crate::error::MatchError;
use crate::transforms::{TransformRef, TransformRegistry};
use crate::weights::{self, Weights};

/// Score assigned by the `Disqualify` null policy. Finite so that sums
/// over attributes stay finite.
pub const DISQUALIFY_SCORE: f64 = -1.0e9;

// ──────────────────────────────────────────────
// Assertions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOp {
    pub fn is_ordering(self) -> bool {
        !matches!(self, ComparisonOp::Equal | ComparisonOp::NotEqual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    AndAlso,
    OrElse,
}

/// A node of an assertion tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    /// Compare the operands, or the binary scope against `value` when set.
    Comparison {
        op: ComparisonOp,
        value: Option<Value>,
        transforms: Vec<TransformRef>,
    },
    /// Fold children with AND/OR after applying `transforms`.
    Composite {
        op: LogicalOp,
        transforms: Vec<TransformRef>,
        children: Vec<Assertion>,
    },
}

impl Assertion {
    pub fn transforms(&self) -> &[TransformRef] {
        match self {
            Assertion::Comparison { transforms, .. } | Assertion::Composite { transforms, .. } => {
                transforms
            }
        }
    }

    fn from_doc(doc: &AssertionDoc, aliases: &Aliases) -> Result<Assertion, MatchError> {
        let transforms = build_transforms(&doc.transforms, aliases)?;
        let comparison = |op| Assertion::Comparison {
            op,
            value: doc.value.as_ref().and_then(Value::from_json),
            transforms: transforms.clone(),
        };
        Ok(match doc.op {
            AssertionOp::AndAlso | AssertionOp::OrElse => Assertion::Composite {
                op: if doc.op == AssertionOp::AndAlso {
                    LogicalOp::AndAlso
                } else {
                    LogicalOp::OrElse
                },
                transforms: transforms.clone(),
                children: doc
                    .assertions
                    .iter()
                    .map(|child| Assertion::from_doc(child, aliases))
                    .collect::<Result<_, _>>()?,
            },
            AssertionOp::Equal => comparison(ComparisonOp::Equal),
            AssertionOp::NotEqual => comparison(ComparisonOp::NotEqual),
            AssertionOp::LessThan => comparison(ComparisonOp::LessThan),
            AssertionOp::LessThanOrEqual => comparison(ComparisonOp::LessThanOrEqual),
            AssertionOp::GreaterThan => comparison(ComparisonOp::GreaterThan),
            AssertionOp::GreaterThanOrEqual => comparison(ComparisonOp::GreaterThanOrEqual),
        })
    }

    /// Check every transform in the tree against `registry`. A comparison
    /// against a literal needs a binary transform in its own chain.
    pub fn check_transforms(&self, registry: &TransformRegistry) -> Result<(), MatchError> {
        let mut binary = false;
        for transform in self.transforms() {
            binary |= registry.resolve(&transform.name)?.is_binary();
        }
        match self {
            Assertion::Comparison {
                value: Some(value), ..
            } if !binary => Err(MatchError::argument(format!(
                "assertion compares against '{}' but has no binary transform",
                value
            ))),
            Assertion::Comparison { .. } => Ok(()),
            Assertion::Composite { children, .. } => children
                .iter()
                .try_for_each(|child| child.check_transforms(registry)),
        }
    }
}

type Aliases = BTreeMap<String, TransformAliasDoc>;

/// Resolve transform references, expanding collection aliases: an alias
/// names a registry transform and supplies leading arguments.
fn build_transforms(
    docs: &[TransformDoc],
    aliases: &Aliases,
) -> Result<Vec<TransformRef>, MatchError> {
    docs.iter()
        .map(|doc| {
            let args = transform_args(&doc.name, &doc.args)?;
            Ok(match aliases.get(&doc.name) {
                Some(alias) => {
                    let mut all = transform_args(&alias.name, &alias.args)?;
                    all.extend(args);
                    TransformRef::new(alias.transform.clone(), all)
                }
                None => TransformRef::new(doc.name.clone(), args),
            })
        })
        .collect()
}

/// Arguments are positional, so one that has no value is an error rather
/// than being skipped.
fn transform_args(name: &str, args: &[serde_json::Value]) -> Result<Vec<Value>, MatchError> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            Value::from_json(arg).ok_or_else(|| {
                MatchError::argument(format!(
                    "transform '{}' argument {} ({}) has no value",
                    name,
                    i + 1,
                    arg
                ))
            })
        })
        .collect()
}

// ──────────────────────────────────────────────
// Attributes
// ──────────────────────────────────────────────

/// A scoring attribute.
#[derive(Debug)]
pub struct MatchAttribute {
    pub id: String,
    /// Alternative property paths; the best-scoring one wins.
    pub properties: Vec<String>,
    pub m: Option<f64>,
    pub u: Option<f64>,
    pub match_weight: Option<f64>,
    pub non_match_weight: Option<f64>,
    pub required: bool,
    pub when_null: NullBehavior,
    /// Ids of attributes that must score positively for this one to count.
    pub when: Vec<String>,
    pub assertion: Assertion,
    /// Transform chain whose binary result scales a passing score.
    pub measure: Option<Vec<TransformRef>>,
    weights: OnceLock<Weights>,
}

impl MatchAttribute {
    pub fn new(id: impl Into<String>, properties: Vec<String>, assertion: Assertion) -> Self {
        MatchAttribute {
            id: id.into(),
            properties,
            m: None,
            u: None,
            match_weight: None,
            non_match_weight: None,
            required: false,
            when_null: NullBehavior::default(),
            when: Vec::new(),
            assertion,
            measure: None,
            weights: OnceLock::new(),
        }
    }

    pub fn with_probabilities(mut self, m: f64, u: f64) -> Self {
        self.m = Some(m);
        self.u = Some(u);
        self
    }

    pub fn with_weights(mut self, match_weight: f64, non_match_weight: f64) -> Self {
        self.match_weight = Some(match_weight);
        self.non_match_weight = Some(non_match_weight);
        self
    }

    pub fn with_null_behavior(mut self, when_null: NullBehavior) -> Self {
        self.when_null = when_null;
        self
    }

    fn from_doc(doc: &AttributeDoc, aliases: &Aliases) -> Result<Self, MatchError> {
        Ok(MatchAttribute {
            id: doc.id.clone(),
            properties: doc.properties.clone(),
            m: doc.m,
            u: doc.u,
            match_weight: doc.match_weight,
            non_match_weight: doc.non_match_weight,
            required: doc.required,
            when_null: doc.when_null,
            when: doc.when.clone(),
            assertion: Assertion::from_doc(&doc.assertion, aliases)?,
            measure: doc
                .measure
                .as_ref()
                .map(|m| build_transforms(&m.transforms, aliases))
                .transpose()?,
            weights: OnceLock::new(),
        })
    }

    /// Check the assertion and measure transforms against `registry`.
    pub fn check_transforms(&self, registry: &TransformRegistry) -> Result<(), MatchError> {
        let checked = self.assertion.check_transforms(registry).and_then(|_| {
            self.measure
                .iter()
                .flatten()
                .try_for_each(|t| registry.resolve(&t.name).map(|_| ()))
        });
        checked.map_err(|e| match e {
            MatchError::ArgumentInvalid { message } => {
                MatchError::argument(format!("attribute '{}': {}", self.id, message))
            }
            other => other,
        })
    }

    /// The attribute's weights, derived on first use and cached. Concurrent
    /// first readers may each derive them; the first stored value wins and
    /// every derivation is identical.
    pub fn weights(&self) -> Result<Weights, MatchError> {
        if let Some(w) = self.weights.get() {
            return Ok(*w);
        }
        let derived = weights::derive(
            &self.id,
            self.m,
            self.u,
            self.match_weight,
            self.non_match_weight,
        )?;
        Ok(*self.weights.get_or_init(|| derived))
    }

    /// Score under the `when_null` policy. `None` drops the attribute.
    pub fn null_score(&self) -> Result<Option<f64>, MatchError> {
        Ok(match self.when_null {
            NullBehavior::Disqualify => Some(DISQUALIFY_SCORE),
            NullBehavior::Zero => Some(0.0),
            NullBehavior::Match => Some(self.weights()?.match_weight),
            NullBehavior::NonMatch => Some(self.weights()?.non_match_weight),
            NullBehavior::Ignore => None,
        })
    }
}

// ──────────────────────────────────────────────
// Blocks
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFilter {
    pub expression: String,
    pub guard: Vec<String>,
    pub true_if_null: bool,
}

/// A blocking block. Its filters are parsed on first use and cached.
#[derive(Debug)]
pub struct MatchBlock {
    pub filters: Vec<BlockFilter>,
    pub op: BlockOp,
    pub max_results: Option<usize>,
    pub skip_when_null: bool,
    compiled: OnceLock<CompiledBlock>,
}

impl MatchBlock {
    pub fn new(filters: Vec<BlockFilter>, op: BlockOp) -> Self {
        MatchBlock {
            filters,
            op,
            max_results: None,
            skip_when_null: false,
            compiled: OnceLock::new(),
        }
    }

    fn from_doc(doc: &BlockDoc) -> Self {
        let mut block = MatchBlock::new(
            doc.filters
                .iter()
                .map(|f| BlockFilter {
                    expression: f.expression.clone(),
                    guard: f.guard.clone(),
                    true_if_null: f.true_if_null,
                })
                .collect(),
            doc.op,
        );
        block.max_results = doc.max_results;
        block.skip_when_null = doc.skip_when_null;
        block
    }

    pub fn compiled(&self) -> Result<&CompiledBlock, MatchError> {
        if let Some(c) = self.compiled.get() {
            return Ok(c);
        }
        let compiled = CompiledBlock::compile(&self.filters)?;
        Ok(self.compiled.get_or_init(|| compiled))
    }
}

// ──────────────────────────────────────────────
// Configurations
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTarget {
    pub resource: String,
    pub events: Vec<String>,
}

/// A single match configuration.
#[derive(Debug)]
pub struct MatchConfiguration {
    pub id: String,
    pub uuid: Uuid,
    pub targets: Vec<MatchTarget>,
    pub blocks: Vec<MatchBlock>,
    pub attributes: Vec<MatchAttribute>,
    pub match_threshold: f64,
    pub non_match_threshold: f64,
    pub evaluation_mode: EvaluationMode,
    pub active: bool,
    document: ConfigurationDoc,
}

impl MatchConfiguration {
    /// Validate a configuration document and build the runtime model.
    pub fn from_document(doc: &ConfigurationDoc) -> Result<Self, MatchError> {
        Self::build(doc, &Aliases::new())
    }

    fn build(doc: &ConfigurationDoc, aliases: &Aliases) -> Result<Self, MatchError> {
        validate_configuration(doc)?;
        Ok(MatchConfiguration {
            id: doc.id.clone(),
            uuid: doc.uuid,
            targets: doc
                .targets
                .iter()
                .map(|t| MatchTarget {
                    resource: t.resource.clone(),
                    events: t.events.clone(),
                })
                .collect(),
            blocks: doc.blocking.iter().map(MatchBlock::from_doc).collect(),
            attributes: doc
                .scoring
                .iter()
                .map(|a| MatchAttribute::from_doc(a, aliases))
                .collect::<Result<_, _>>()?,
            match_threshold: doc.match_threshold,
            non_match_threshold: doc.non_match_threshold,
            evaluation_mode: doc.evaluation_mode,
            active: doc.metadata.status == ConfigurationStatus::Active,
            document: doc.clone(),
        })
    }

    pub fn targets_type(&self, record_type: &str) -> bool {
        self.targets.iter().any(|t| t.resource == record_type)
    }

    pub fn attribute(&self, id: &str) -> Option<&MatchAttribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// The source document, for diagnostics snapshots.
    pub fn document(&self) -> &ConfigurationDoc {
        &self.document
    }

    /// Compile every blocking block and check every transform reference
    /// against `registry`, so a configuration fails when loaded rather
    /// than part-way through a run.
    pub fn check(&self, registry: &TransformRegistry) -> Result<(), MatchError> {
        for block in &self.blocks {
            block.compiled()?;
        }
        for attribute in &self.attributes {
            attribute.check_transforms(registry)?;
        }
        Ok(())
    }
}

/// Configurations grouped under one name. Transform aliases are already
/// expanded into the members' transform references.
#[derive(Debug)]
pub struct MatchConfigurationCollection {
    pub id: String,
    pub configurations: Vec<MatchConfiguration>,
}

impl MatchConfigurationCollection {
    pub fn from_document(doc: &CollectionDoc) -> Result<Self, MatchError> {
        let aliases: Aliases = doc
            .transforms
            .iter()
            .map(|a| (a.name.clone(), a.clone()))
            .collect();
        let configurations = doc
            .configurations
            .iter()
            .map(|c| MatchConfiguration::build(c, &aliases))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MatchConfigurationCollection {
            id: doc.id.clone(),
            configurations,
        })
    }
}

/// What a configuration provider returns for a name.
#[derive(Debug)]
pub enum ConfigurationSet {
    Single(MatchConfiguration),
    Collection(MatchConfigurationCollection),
}

impl ConfigurationSet {
    pub fn from_document(doc: &ConfigDocument) -> Result<Self, MatchError> {
        Ok(match doc {
            ConfigDocument::Configuration(c) => {
                ConfigurationSet::Single(MatchConfiguration::from_document(c)?)
            }
            ConfigDocument::Collection(c) => {
                ConfigurationSet::Collection(MatchConfigurationCollection::from_document(c)?)
            }
        })
    }

    pub fn id(&self) -> &str {
        match self {
            ConfigurationSet::Single(c) => &c.id,
            ConfigurationSet::Collection(c) => &c.id,
        }
    }

    pub fn configurations(&self) -> &[MatchConfiguration] {
        match self {
            ConfigurationSet::Single(c) => std::slice::from_ref(c),
            ConfigurationSet::Collection(c) => &c.configurations,
        }
    }

    /// Run [`MatchConfiguration::check`] on every configuration.
    pub fn check(&self, registry: &TransformRegistry) -> Result<(), MatchError> {
        self.configurations()
            .iter()
            .try_for_each(|c| c.check(registry))
    }

    /// Pick the configuration for a record type. A collection yields its
    /// first member targeting the type.
    pub fn resolve(&self, record_type: &str) -> Result<&MatchConfiguration, MatchError> {
        let found = match self {
            ConfigurationSet::Single(c) => Some(c).filter(|c| c.targets_type(record_type)),
            ConfigurationSet::Collection(col) => col
                .configurations
                .iter()
                .find(|c| c.targets_type(record_type)),
        };
        found.ok_or_else(|| {
            MatchError::invalid_state(format!(
                "configuration '{}' does not target record type '{}'",
                self.id(),
                record_type
            ))
        })
    }
}
