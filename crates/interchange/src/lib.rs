//! recordlink-interchange: match configuration documents.
//!
//! Provides typed structs for the two document kinds
//! (`MatchConfiguration`, `MatchConfigurationCollection`) and a single
//! `from_json()` entry point that deserializes and validates a
//! `serde_json::Value` document into a `ConfigDocument`.
//!
//! The evaluator depends on this crate for initial JSON parsing, then
//! converts document types to its own runtime representation.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_json, from_str, validate_configuration, InterchangeError};
pub use types::*;
