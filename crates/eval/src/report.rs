//! Serializable projection of match results and diagnostics.

use recordlink_storage::Record;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::classify::{Classification, MatchMethod, MatchResult, VectorResult};
use crate::diagnostics::{DiagnosticSession, DiagnosticSessionData};
use crate::error::MatchError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReportEntry {
    pub key: String,
    pub score: f64,
    pub strength: f64,
    pub classification: Classification,
    pub method: MatchMethod,
    pub vectors: Vec<VectorResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub record_type: String,
    pub input_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    pub created: String,
    pub results: Vec<MatchReportEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticSessionData>,
}

impl MatchReport {
    /// Build a report. A supplied session must have ended.
    pub fn new<R: Record>(
        record_type: &str,
        input: &R,
        results: &[MatchResult<R>],
        session: Option<&DiagnosticSession>,
    ) -> Result<Self, MatchError> {
        let diagnostics = session.map(DiagnosticSession::session_data).transpose()?;
        let created = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| MatchError::invalid_state(format!("cannot format timestamp: {}", e)))?;
        Ok(MatchReport {
            record_type: record_type.to_string(),
            input_key: input.key().to_string(),
            configuration: results.first().map(|r| r.configuration.clone()),
            created,
            results: results
                .iter()
                .map(|r| MatchReportEntry {
                    key: r.record.key().to_string(),
                    score: r.score,
                    strength: r.strength,
                    classification: r.classification,
                    method: r.method,
                    vectors: r.vectors.clone(),
                })
                .collect(),
            diagnostics,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
