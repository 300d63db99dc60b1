//! Errors raised by the matching engine.

use recordlink_interchange::InterchangeError;
use recordlink_storage::StorageError;

/// All errors that can be returned by a matching operation.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// A configuration or collaborator could not be found.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The engine was asked to do something its current state does not allow:
    /// a configuration that does not target the record type, missing
    /// blocking rules, missing m/u probabilities, diagnostics misuse.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// An argument was malformed: empty input record, bad transform or
    /// filter parameters, incomparable values.
    #[error("invalid argument: {message}")]
    ArgumentInvalid { message: String },

    /// A failure during block/classify computation, with the original cause.
    #[error("matching failed for record '{record}' using configuration '{configuration}': {source}")]
    Matching {
        configuration: String,
        record: String,
        source: Box<MatchError>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Interchange(#[from] InterchangeError),
}

impl MatchError {
    pub fn not_found(what: impl Into<String>) -> Self {
        MatchError::NotFound { what: what.into() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        MatchError::InvalidState {
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        MatchError::ArgumentInvalid {
            message: message.into(),
        }
    }

    /// Wrap a computation failure with the operation's context.
    pub fn matching(configuration: &str, record: &str, cause: MatchError) -> Self {
        MatchError::Matching {
            configuration: configuration.to_string(),
            record: record.to_string(),
            source: Box::new(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn matching_error_keeps_cause() {
        let err = MatchError::matching("patients", "p-1", MatchError::argument("bad filter"));
        assert!(err.to_string().contains("patients"));
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "invalid argument: bad filter");
    }
}
