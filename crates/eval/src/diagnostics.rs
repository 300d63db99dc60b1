//! Diagnostics session: a hierarchical recorder of what one matching run
//! did.
//!
//! ```text
//! Session ── Stage ── Action ── Sample
//!                        └── Action (nested) ── Sample
//! ```
//!
//! A session moves `NotStarted → Started → Ended`. Stages are strictly
//! sequential; actions nest as a stack inside the open stage; samples
//! attach to the innermost open action. Every misuse (ending something
//! that is not open, starting a child without an open parent, reading
//! data before the end) is `MatchError::InvalidState`.
//!
//! A session is single-threaded: it belongs to one invocation.

use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::MatchError;

fn rfc3339<S: Serializer>(at: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
    let text = at.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
    s.serialize_str(&text)
}

fn rfc3339_opt<S: Serializer>(at: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => rfc3339(at, s),
        None => s.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NotStarted,
    Started,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticSample {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticAction {
    pub action_type: String,
    pub data: serde_json::Value,
    #[serde(serialize_with = "rfc3339")]
    pub started: OffsetDateTime,
    #[serde(serialize_with = "rfc3339_opt")]
    pub ended: Option<OffsetDateTime>,
    pub samples: Vec<DiagnosticSample>,
    pub children: Vec<DiagnosticAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticStage {
    pub name: String,
    #[serde(serialize_with = "rfc3339")]
    pub started: OffsetDateTime,
    #[serde(serialize_with = "rfc3339_opt")]
    pub ended: Option<OffsetDateTime>,
    pub actions: Vec<DiagnosticAction>,
}

/// Everything a finished session recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticSessionData {
    pub configuration: Option<serde_json::Value>,
    #[serde(serialize_with = "rfc3339")]
    pub started: OffsetDateTime,
    #[serde(serialize_with = "rfc3339")]
    pub ended: OffsetDateTime,
    pub stages: Vec<DiagnosticStage>,
}

#[derive(Debug)]
pub struct DiagnosticSession {
    state: SessionState,
    configuration: Option<serde_json::Value>,
    started: Option<OffsetDateTime>,
    ended: Option<OffsetDateTime>,
    stages: Vec<DiagnosticStage>,
    stage_open: bool,
    /// Index path from the open stage's action list to the innermost open
    /// action.
    open_actions: Vec<usize>,
}

impl Default for DiagnosticSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSession {
    pub fn new() -> Self {
        DiagnosticSession {
            state: SessionState::NotStarted,
            configuration: None,
            started: None,
            ended: None,
            stages: Vec::new(),
            stage_open: false,
            open_actions: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start the session with an optional configuration snapshot.
    pub fn start(&mut self, configuration: Option<serde_json::Value>) -> Result<(), MatchError> {
        if self.state != SessionState::NotStarted {
            return Err(MatchError::invalid_state(format!(
                "cannot start a diagnostic session that is {:?}",
                self.state
            )));
        }
        self.state = SessionState::Started;
        self.configuration = configuration;
        self.started = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), MatchError> {
        if self.state != SessionState::Started {
            return Err(MatchError::invalid_state(format!(
                "cannot end a diagnostic session that is {:?}",
                self.state
            )));
        }
        if self.stage_open {
            return Err(MatchError::invalid_state(
                "cannot end a diagnostic session while a stage is open",
            ));
        }
        self.state = SessionState::Ended;
        self.ended = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    pub fn start_stage(&mut self, name: &str) -> Result<(), MatchError> {
        if self.state != SessionState::Started {
            return Err(MatchError::invalid_state(format!(
                "cannot start stage '{}': session is {:?}",
                name, self.state
            )));
        }
        if self.stage_open {
            return Err(MatchError::invalid_state(format!(
                "cannot start stage '{}': another stage is open",
                name
            )));
        }
        self.stages.push(DiagnosticStage {
            name: name.to_string(),
            started: OffsetDateTime::now_utc(),
            ended: None,
            actions: Vec::new(),
        });
        self.stage_open = true;
        Ok(())
    }

    pub fn end_stage(&mut self) -> Result<(), MatchError> {
        if !self.stage_open {
            return Err(MatchError::invalid_state("no open stage to end"));
        }
        if !self.open_actions.is_empty() {
            return Err(MatchError::invalid_state(
                "cannot end a stage while actions are open",
            ));
        }
        if let Some(stage) = self.stages.last_mut() {
            stage.ended = Some(OffsetDateTime::now_utc());
        }
        self.stage_open = false;
        Ok(())
    }

    /// Open an action nested inside the innermost open action (or directly
    /// in the stage).
    pub fn start_action(
        &mut self,
        action_type: &str,
        data: serde_json::Value,
    ) -> Result<(), MatchError> {
        let action = DiagnosticAction {
            action_type: action_type.to_string(),
            data,
            started: OffsetDateTime::now_utc(),
            ended: None,
            samples: Vec::new(),
            children: Vec::new(),
        };
        let siblings = self.open_children()?;
        siblings.push(action);
        let index = siblings.len() - 1;
        self.open_actions.push(index);
        Ok(())
    }

    pub fn end_action(&mut self) -> Result<(), MatchError> {
        let action = self.innermost()?;
        action.ended = Some(OffsetDateTime::now_utc());
        self.open_actions.pop();
        Ok(())
    }

    /// Attach a sample to the innermost open action.
    pub fn sample(&mut self, key: &str, value: serde_json::Value) -> Result<(), MatchError> {
        let action = self.innermost()?;
        action.samples.push(DiagnosticSample {
            key: key.to_string(),
            value,
            timestamp: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    /// Close every open action and the open stage. Used when an operation
    /// fails part-way so the session can still be ended.
    pub fn unwind(&mut self) {
        while self.end_action().is_ok() {}
        let _ = self.end_stage();
    }

    /// The recorded data. Only available once the session has ended.
    pub fn session_data(&self) -> Result<DiagnosticSessionData, MatchError> {
        match (self.state, self.started, self.ended) {
            (SessionState::Ended, Some(started), Some(ended)) => Ok(DiagnosticSessionData {
                configuration: self.configuration.clone(),
                started,
                ended,
                stages: self.stages.clone(),
            }),
            _ => Err(MatchError::invalid_state(format!(
                "diagnostic session data is only available after the session ends (session is {:?})",
                self.state
            ))),
        }
    }

    // ── stack navigation ────────────────────────────────────────────

    /// The action list new actions are pushed onto.
    fn open_children(&mut self) -> Result<&mut Vec<DiagnosticAction>, MatchError> {
        if !self.stage_open {
            return Err(MatchError::invalid_state("no open stage for action"));
        }
        let stage = self
            .stages
            .last_mut()
            .ok_or_else(|| MatchError::invalid_state("no open stage for action"))?;
        let mut list = &mut stage.actions;
        for &i in &self.open_actions {
            list = &mut list[i].children;
        }
        Ok(list)
    }

    fn innermost(&mut self) -> Result<&mut DiagnosticAction, MatchError> {
        let Some((&last, path)) = self.open_actions.split_last() else {
            return Err(MatchError::invalid_state("no open action"));
        };
        let stage = self
            .stages
            .last_mut()
            .ok_or_else(|| MatchError::invalid_state("no open action"))?;
        let mut list = &mut stage.actions;
        for &i in path {
            list = &mut list[i].children;
        }
        Ok(&mut list[last])
    }
}

/// Run `f` against the session when one was supplied.
pub(crate) fn record<F>(session: &mut Option<&mut DiagnosticSession>, f: F) -> Result<(), MatchError>
where
    F: FnOnce(&mut DiagnosticSession) -> Result<(), MatchError>,
{
    match session {
        Some(s) => f(&mut **s),
        None => Ok(()),
    }
}
