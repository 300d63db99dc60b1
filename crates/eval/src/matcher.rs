//! The matching API: `block`, `classify` and `match_records`.
//!
//! Every operation resolves its configuration first. Lookup failures
//! (`NotFound`, `InvalidState`, `ArgumentInvalid` on the input) are
//! returned as-is; any failure after that is logged and wrapped in
//! `MatchError::Matching` with the original cause.

use std::sync::Arc;
use std::time::Instant;

use recordlink_storage::{PropertyAccessor, Record, RecordQueryProvider};
use tracing::{Instrument, Level};

use crate::blocking::BlockingEngine;
use crate::classify::{ClassificationEngine, MatchResult};
use crate::configuration::{ConfigurationSet, MatchConfiguration};
use crate::diagnostics::{DiagnosticSession, SessionState};
use crate::error::MatchError;
use crate::provider::ConfigurationProvider;
use crate::report::MatchReport;
use crate::settings::MatcherSettings;
use crate::transforms::TransformRegistry;

/// Starts the caller's session when it has not been started, and ends it
/// again on `finish` only in that case.
struct SessionGuard<'s> {
    session: Option<&'s mut DiagnosticSession>,
    owned: bool,
}

impl<'s> SessionGuard<'s> {
    fn begin(
        mut session: Option<&'s mut DiagnosticSession>,
        configuration: &MatchConfiguration,
    ) -> Result<Self, MatchError> {
        let mut owned = false;
        if let Some(s) = session.as_deref_mut() {
            match s.state() {
                SessionState::NotStarted => {
                    s.start(serde_json::to_value(configuration.document()).ok())?;
                    owned = true;
                }
                SessionState::Started => {}
                SessionState::Ended => {
                    return Err(MatchError::invalid_state(
                        "diagnostic session has already ended",
                    ))
                }
            }
        }
        Ok(SessionGuard { session, owned })
    }

    fn handle(&mut self) -> Option<&mut DiagnosticSession> {
        self.session.as_deref_mut()
    }

    fn finish<T>(mut self, result: Result<T, MatchError>) -> Result<T, MatchError> {
        let Some(s) = self.session.as_deref_mut() else {
            return result;
        };
        if result.is_err() {
            s.unwind();
        }
        if self.owned {
            if let Err(e) = s.end() {
                if result.is_ok() {
                    return Err(e);
                }
            }
        }
        result
    }
}

/// Record matching over one record type `R`.
pub struct Matcher<R: Record> {
    configurations: Arc<dyn ConfigurationProvider>,
    records: Arc<dyn RecordQueryProvider<R>>,
    accessor: Arc<dyn PropertyAccessor<R>>,
    transforms: Arc<TransformRegistry>,
    settings: MatcherSettings,
}

impl<R: Record> Matcher<R> {
    /// A matcher with the standard transform library and default settings.
    pub fn new(
        configurations: Arc<dyn ConfigurationProvider>,
        records: Arc<dyn RecordQueryProvider<R>>,
        accessor: Arc<dyn PropertyAccessor<R>>,
    ) -> Self {
        Matcher {
            configurations,
            records,
            accessor,
            transforms: Arc::new(TransformRegistry::standard()),
            settings: MatcherSettings::default(),
        }
    }

    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = Arc::new(transforms);
        self
    }

    pub fn with_settings(mut self, settings: MatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn create_diagnostic_session(&self) -> DiagnosticSession {
        DiagnosticSession::new()
    }

    pub fn create_match_report(
        &self,
        record_type: &str,
        input: &R,
        results: &[MatchResult<R>],
        session: Option<&DiagnosticSession>,
    ) -> Result<MatchReport, MatchError> {
        MatchReport::new(record_type, input, results, session)
    }

    fn configuration_set(&self, input: &R, name: &str) -> Result<Arc<ConfigurationSet>, MatchError> {
        if input.record_type().is_empty() {
            return Err(MatchError::argument("input record has no record type"));
        }
        self.configurations
            .get_configuration(name)
            .ok_or_else(|| MatchError::not_found(format!("match configuration '{}'", name)))
    }

    fn require_blocks(configuration: &MatchConfiguration) -> Result<(), MatchError> {
        if configuration.blocks.is_empty() {
            return Err(MatchError::invalid_state(format!(
                "configuration '{}' has no blocking rules",
                configuration.id
            )));
        }
        Ok(())
    }

    fn blocking_engine(&self) -> BlockingEngine<'_, R> {
        BlockingEngine::new(
            self.accessor.as_ref(),
            self.records.as_ref(),
            &self.settings.active_states,
        )
    }

    fn classification_engine(&self) -> ClassificationEngine<'_, R> {
        ClassificationEngine::new(self.accessor.as_ref(), &self.transforms)
    }

    /// Find candidate records for `input`. The input itself and
    /// `ignore_keys` never appear in the result.
    pub async fn block(
        &self,
        input: &R,
        configuration_name: &str,
        ignore_keys: &[String],
        diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<R>, MatchError> {
        let span = tracing::span!(
            Level::INFO,
            "recordlink.block",
            configuration = configuration_name,
            key = input.key()
        );
        self.block_in_span(input, configuration_name, ignore_keys, diagnostics)
            .instrument(span)
            .await
    }

    async fn block_in_span(
        &self,
        input: &R,
        configuration_name: &str,
        ignore_keys: &[String],
        diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<R>, MatchError> {
        let set = self.configuration_set(input, configuration_name)?;
        let configuration = set.resolve(input.record_type())?;
        Self::require_blocks(configuration)?;

        let started = Instant::now();
        let mut session = SessionGuard::begin(diagnostics, configuration)?;
        let result = self
            .blocking_engine()
            .block(input, configuration, ignore_keys, session.handle())
            .await;

        match session.finish(result) {
            Ok(candidates) => {
                tracing::info!(
                    configuration = %configuration.id,
                    key = input.key(),
                    candidates = candidates.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "block_success"
                );
                Ok(candidates)
            }
            Err(e) => {
                tracing::error!(
                    configuration = %configuration.id,
                    key = input.key(),
                    error = %e,
                    "block_failure"
                );
                Err(MatchError::matching(configuration_name, input.key(), e))
            }
        }
    }

    /// Score `candidates` against `input`.
    pub fn classify(
        &self,
        input: &R,
        candidates: &[R],
        configuration_name: &str,
        diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<MatchResult<R>>, MatchError> {
        let span = tracing::span!(
            Level::INFO,
            "recordlink.classify",
            configuration = configuration_name,
            key = input.key()
        );
        let _entered = span.enter();

        let set = self.configuration_set(input, configuration_name)?;
        let configuration = set.resolve(input.record_type())?;

        let started = Instant::now();
        let mut session = SessionGuard::begin(diagnostics, configuration)?;
        let result = self.classification_engine().classify(
            input,
            candidates,
            configuration,
            session.handle(),
        );

        match session.finish(result) {
            Ok(results) => {
                tracing::info!(
                    configuration = %configuration.id,
                    key = input.key(),
                    candidates = candidates.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "classify_success"
                );
                Ok(results)
            }
            Err(e) => {
                tracing::error!(
                    configuration = %configuration.id,
                    key = input.key(),
                    error = %e,
                    "classify_failure"
                );
                Err(MatchError::matching(configuration_name, input.key(), e))
            }
        }
    }

    /// Block, then classify the candidates, in one diagnostics session.
    pub async fn match_records(
        &self,
        input: &R,
        configuration_name: &str,
        ignore_keys: &[String],
        diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<MatchResult<R>>, MatchError> {
        let span = tracing::span!(
            Level::INFO,
            "recordlink.match",
            configuration = configuration_name,
            key = input.key()
        );
        self.match_in_span(input, configuration_name, ignore_keys, diagnostics)
            .instrument(span)
            .await
    }

    async fn match_in_span(
        &self,
        input: &R,
        configuration_name: &str,
        ignore_keys: &[String],
        diagnostics: Option<&mut DiagnosticSession>,
    ) -> Result<Vec<MatchResult<R>>, MatchError> {
        let set = self.configuration_set(input, configuration_name)?;
        let configuration = set.resolve(input.record_type())?;
        Self::require_blocks(configuration)?;

        let started = Instant::now();
        let mut session = SessionGuard::begin(diagnostics, configuration)?;
        let blocked = self
            .blocking_engine()
            .block(input, configuration, ignore_keys, session.handle())
            .await;
        let result = match blocked {
            Ok(candidates) => self.classification_engine().classify(
                input,
                &candidates,
                configuration,
                session.handle(),
            ),
            Err(e) => Err(e),
        };

        match session.finish(result) {
            Ok(results) => {
                tracing::info!(
                    configuration = %configuration.id,
                    key = input.key(),
                    results = results.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "match_success"
                );
                Ok(results)
            }
            Err(e) => {
                tracing::error!(
                    configuration = %configuration.id,
                    key = input.key(),
                    error = %e,
                    "match_failure"
                );
                Err(MatchError::matching(configuration_name, input.key(), e))
            }
        }
    }
}
