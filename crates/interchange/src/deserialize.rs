//! Deserialization from JSON configuration documents into typed structs.
//!
//! The main entry point is [`from_json`], which takes a
//! `&serde_json::Value`, dispatches on its `kind` field and validates the
//! result. [`from_str`] parses text first.

use std::collections::BTreeSet;

use crate::types::*;

/// Errors during configuration document deserialization.
#[derive(Debug, thiserror::Error)]
pub enum InterchangeError {
    /// The document is missing a required top-level field.
    #[error("document missing required field: '{field}'")]
    MissingField { field: String },

    /// The document does not have the expected shape.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A configuration parsed but violates a load-time rule.
    #[error("configuration '{id}': {message}")]
    ConfigurationError { id: String, message: String },

    /// The text is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a configuration document from JSON text.
pub fn from_str(text: &str) -> Result<ConfigDocument, InterchangeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    from_json(&value)
}

/// Deserialize a configuration document into typed structs.
///
/// `kind` selects between a single configuration and a collection. Every
/// configuration is validated before it is returned.
pub fn from_json(document: &serde_json::Value) -> Result<ConfigDocument, InterchangeError> {
    if !document.is_object() {
        return Err(InterchangeError::InvalidDocument(
            "document must be a JSON object".to_string(),
        ));
    }

    let kind = document
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "kind".to_string(),
        })?;

    // Surface a missing id before serde reports it as a generic error.
    if document.get("id").and_then(|v| v.as_str()).is_none() {
        return Err(InterchangeError::MissingField {
            field: "id".to_string(),
        });
    }

    match kind {
        "MatchConfiguration" => {
            let doc = parse_configuration(document)?;
            Ok(ConfigDocument::Configuration(doc))
        }
        "MatchConfigurationCollection" => {
            let doc: CollectionDoc = serde_json::from_value(document.clone())?;
            if doc.configurations.is_empty() {
                return Err(InterchangeError::ConfigurationError {
                    id: doc.id,
                    message: "collection has no configurations".to_string(),
                });
            }
            for configuration in &doc.configurations {
                validate_configuration(configuration)?;
            }
            let mut alias_names = BTreeSet::new();
            for alias in &doc.transforms {
                if !alias_names.insert(alias.name.as_str()) {
                    return Err(InterchangeError::ConfigurationError {
                        id: doc.id.clone(),
                        message: format!("duplicate transform alias '{}'", alias.name),
                    });
                }
                validate_args(&alias.name, &alias.args).map_err(|message| {
                    InterchangeError::ConfigurationError {
                        id: doc.id.clone(),
                        message,
                    }
                })?;
            }
            Ok(ConfigDocument::Collection(doc))
        }
        other => Err(InterchangeError::InvalidDocument(format!(
            "unknown document kind '{}'",
            other
        ))),
    }
}

fn parse_configuration(document: &serde_json::Value) -> Result<ConfigurationDoc, InterchangeError> {
    let doc: ConfigurationDoc = serde_json::from_value(document.clone())?;
    validate_configuration(&doc)?;
    Ok(doc)
}

// ── Validation ──────────────────────────────────────────────────────

/// Check the load-time rules for a single configuration.
pub fn validate_configuration(doc: &ConfigurationDoc) -> Result<(), InterchangeError> {
    let fail = |message: String| InterchangeError::ConfigurationError {
        id: doc.id.clone(),
        message,
    };

    if doc.targets.is_empty() {
        return Err(fail("at least one target is required".to_string()));
    }
    if doc.non_match_threshold > doc.match_threshold {
        return Err(fail(format!(
            "nonMatchThreshold {} exceeds matchThreshold {}",
            doc.non_match_threshold, doc.match_threshold
        )));
    }

    for block in &doc.blocking {
        if block.filters.is_empty() {
            return Err(fail("blocking block has no filters".to_string()));
        }
    }

    let mut ids = BTreeSet::new();
    for attribute in &doc.scoring {
        if !ids.insert(attribute.id.as_str()) {
            return Err(fail(format!("duplicate attribute id '{}'", attribute.id)));
        }
    }

    for attribute in &doc.scoring {
        validate_attribute(attribute, &ids).map_err(fail)?;
    }
    Ok(())
}

fn validate_attribute(attribute: &AttributeDoc, ids: &BTreeSet<&str>) -> Result<(), String> {
    if attribute.properties.is_empty() {
        return Err(format!("attribute '{}' has no property", attribute.id));
    }

    for (name, p) in [("m", attribute.m), ("u", attribute.u)] {
        if let Some(p) = p {
            if !(p > 0.0 && p < 1.0) {
                return Err(format!(
                    "attribute '{}': {} must be between 0 and 1 exclusive, got {}",
                    attribute.id, name, p
                ));
            }
        }
    }

    let has_probabilities = attribute.m.is_some() && attribute.u.is_some();
    let has_weights = attribute.match_weight.is_some() && attribute.non_match_weight.is_some();
    if !has_probabilities && !has_weights {
        return Err(format!(
            "attribute '{}' needs m and u or explicit matchWeight and nonMatchWeight",
            attribute.id
        ));
    }

    for dependency in &attribute.when {
        if dependency == &attribute.id {
            return Err(format!("attribute '{}' depends on itself", attribute.id));
        }
        if !ids.contains(dependency.as_str()) {
            return Err(format!(
                "attribute '{}' depends on unknown attribute '{}'",
                attribute.id, dependency
            ));
        }
    }

    if let Some(measure) = &attribute.measure {
        validate_transforms(&measure.transforms)
            .map_err(|m| format!("attribute '{}' measure: {}", attribute.id, m))?;
    }

    validate_assertion(&attribute.assertion)
        .map_err(|m| format!("attribute '{}': {}", attribute.id, m))
}

fn validate_assertion(assertion: &AssertionDoc) -> Result<(), String> {
    if assertion.op.is_composite() {
        if assertion.assertions.is_empty() {
            return Err(format!("{:?} assertion has no children", assertion.op));
        }
        if assertion.value.is_some() {
            return Err(format!("{:?} assertion cannot carry a value", assertion.op));
        }
    } else if !assertion.assertions.is_empty() {
        return Err(format!(
            "{:?} assertion cannot have child assertions",
            assertion.op
        ));
    } else if assertion.value.is_some() && assertion.transforms.is_empty() {
        // A literal is compared against a binary transform's result.
        return Err(format!(
            "{:?} assertion compares against a value but has no transform to produce one",
            assertion.op
        ));
    }
    validate_transforms(&assertion.transforms)?;
    for child in &assertion.assertions {
        validate_assertion(child)?;
    }
    Ok(())
}

fn validate_transforms(transforms: &[TransformDoc]) -> Result<(), String> {
    for transform in transforms {
        validate_args(&transform.name, &transform.args)?;
    }
    Ok(())
}

/// Transform arguments are positional; a null would leave a hole.
fn validate_args(name: &str, args: &[serde_json::Value]) -> Result<(), String> {
    match args.iter().position(serde_json::Value::is_null) {
        Some(i) => Err(format!("transform '{}' argument {} is null", name, i + 1)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configuration() -> serde_json::Value {
        json!({
            "kind": "MatchConfiguration",
            "id": "patient.default",
            "target": [{ "resource": "Patient", "event": ["create", "update"] }],
            "blocking": [{
                "op": "and",
                "filter": [{ "expression": "dateOfBirth=$input.dateOfBirth" }]
            }],
            "scoring": [{
                "id": "given",
                "property": ["name.given"],
                "m": 0.9,
                "u": 0.1,
                "assertion": { "op": "equal" }
            }],
            "matchThreshold": 3.0,
            "nonMatchThreshold": -3.0
        })
    }

    #[test]
    fn parses_single_configuration() {
        let doc = from_json(&configuration()).unwrap();
        let ConfigDocument::Configuration(c) = doc else {
            panic!("expected configuration");
        };
        assert_eq!(c.id, "patient.default");
        assert_eq!(c.targets[0].resource, "Patient");
        assert_eq!(c.targets[0].events, vec!["create", "update"]);
        assert_eq!(c.blocking[0].op, BlockOp::And);
        assert_eq!(c.scoring[0].when_null, NullBehavior::NonMatch);
        assert_eq!(c.evaluation_mode, EvaluationMode::AbsoluteScore);
        assert_eq!(c.metadata.status, ConfigurationStatus::Active);
    }

    #[test]
    fn missing_kind_is_reported() {
        let mut doc = configuration();
        doc.as_object_mut().unwrap().remove("kind");
        match from_json(&doc).unwrap_err() {
            InterchangeError::MissingField { field } => assert_eq!(field, "kind"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn missing_id_is_reported() {
        let mut doc = configuration();
        doc.as_object_mut().unwrap().remove("id");
        match from_json(&doc).unwrap_err() {
            InterchangeError::MissingField { field } => assert_eq!(field, "id"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut doc = configuration();
        doc["kind"] = json!("Bundle");
        assert!(matches!(
            from_json(&doc),
            Err(InterchangeError::InvalidDocument(_))
        ));
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let mut doc = configuration();
        doc["nonMatchThreshold"] = json!(5.0);
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("exceeds matchThreshold"), "{}", err);
    }

    #[test]
    fn attribute_needs_probabilities_or_weights() {
        let mut doc = configuration();
        doc["scoring"][0].as_object_mut().unwrap().remove("u");
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("needs m and u"), "{}", err);

        doc["scoring"][0]["matchWeight"] = json!(2.0);
        doc["scoring"][0]["nonMatchWeight"] = json!(-2.0);
        assert!(from_json(&doc).is_ok());
    }

    #[test]
    fn probabilities_must_be_open_interval() {
        let mut doc = configuration();
        doc["scoring"][0]["m"] = json!(1.0);
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("between 0 and 1"), "{}", err);
    }

    #[test]
    fn composite_assertion_needs_children() {
        let mut doc = configuration();
        doc["scoring"][0]["assertion"] = json!({ "op": "and_also" });
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("no children"), "{}", err);
    }

    #[test]
    fn literal_comparison_needs_a_transform() {
        let mut doc = configuration();
        doc["scoring"][0]["assertion"] = json!({ "op": "greater_than_or_equal", "value": 0.9 });
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("no transform to produce one"), "{}", err);

        doc["scoring"][0]["assertion"]["transform"] = json!([{ "name": "jaro_winkler" }]);
        assert!(from_json(&doc).is_ok());
    }

    #[test]
    fn literal_check_applies_inside_composites() {
        let mut doc = configuration();
        doc["scoring"][0]["assertion"] = json!({
            "op": "or_else",
            "assertion": [
                { "op": "equal" },
                { "op": "equal", "value": true }
            ]
        });
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("no transform to produce one"), "{}", err);
    }

    #[test]
    fn null_transform_arguments_rejected() {
        let mut doc = configuration();
        doc["scoring"][0]["assertion"]["transform"] =
            json!([{ "name": "substr", "args": [null, 3] }]);
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("'substr' argument 1 is null"), "{}", err);

        let mut doc = configuration();
        doc["scoring"][0]["measure"] =
            json!({ "transform": [{ "name": "similarity", "args": [1, null] }] });
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("'similarity' argument 2 is null"), "{}", err);
    }

    #[test]
    fn null_alias_arguments_rejected() {
        let mut member = configuration();
        member.as_object_mut().unwrap().remove("kind");
        let doc = json!({
            "kind": "MatchConfigurationCollection",
            "id": "org.default",
            "configuration": [member],
            "transform": [{ "name": "prefix", "transform": "substr", "args": [null, 3] }]
        });
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("'prefix' argument 1 is null"), "{}", err);
    }

    #[test]
    fn unknown_dependency_rejected() {
        let mut doc = configuration();
        doc["scoring"][0]["when"] = json!(["family"]);
        let err = from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("unknown attribute 'family'"), "{}", err);
    }

    #[test]
    fn parses_collection_with_aliases() {
        let mut member = configuration();
        member.as_object_mut().unwrap().remove("kind");
        let doc = json!({
            "kind": "MatchConfigurationCollection",
            "id": "org.default",
            "configuration": [member],
            "transform": [{ "name": "year", "transform": "date_extract", "args": ["y"] }]
        });
        let ConfigDocument::Collection(c) = from_json(&doc).unwrap() else {
            panic!("expected collection");
        };
        assert_eq!(c.configurations.len(), 1);
        assert_eq!(c.transforms[0].transform, "date_extract");
    }

    #[test]
    fn from_str_reports_bad_json() {
        assert!(matches!(from_str("{"), Err(InterchangeError::Json(_))));
    }
}
