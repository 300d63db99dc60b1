//! Record matching engine: accepts a configuration and an input record,
//! finds candidate records (blocking) and scores them (classification),
//! with attribute-level provenance and optional diagnostics.
//!
//! The engine consumes configuration documents from
//! `recordlink-interchange` and queries records through the
//! `recordlink-storage` contract; it does not care how either is stored.
//!
//! ```ignore
//! let matcher = Matcher::new(configurations, store, Arc::new(FieldAccessor));
//! let mut session = matcher.create_diagnostic_session();
//! let results = matcher
//!     .match_records(&input, "patients", &[], Some(&mut session))
//!     .await?;
//! let report = matcher.create_match_report("Patient", &input, &results, Some(&session))?;
//! ```

pub mod assertion;
pub mod blocking;
pub mod classify;
pub mod configuration;
pub mod diagnostics;
pub mod error;
pub mod matcher;
pub mod provider;
pub mod report;
pub mod settings;
pub mod store;
pub mod transforms;
pub mod weights;

pub use assertion::{AssertionEvaluator, AssertionOutcome};
pub use classify::{Classification, MatchMethod, MatchResult, VectorResult};
pub use configuration::{
    Assertion, ConfigurationSet, MatchAttribute, MatchBlock, MatchConfiguration,
    MatchConfigurationCollection, DISQUALIFY_SCORE,
};
pub use diagnostics::{DiagnosticSession, DiagnosticSessionData, SessionState};
pub use error::MatchError;
pub use matcher::Matcher;
pub use provider::{ConfigurationProvider, InMemoryConfigurationProvider};
pub use report::{MatchReport, MatchReportEntry};
pub use settings::MatcherSettings;
pub use store::{ApproxOptions, InMemoryStore};
pub use transforms::{Transform, TransformRef, TransformRegistry};
pub use weights::Weights;
