//! recordlink-storage: the contract between the matching engine and the
//! place records live.
//!
//! Defines the record abstraction ([`Record`], [`PropertyAccessor`],
//! [`Value`]), the backend-neutral [`BlockingQuery`], and the
//! [`RecordQueryProvider`] trait backends implement. The
//! [`conformance`] module checks a backend against the query semantics.

pub mod conformance;
mod error;
mod query;
mod record;
mod traits;
mod value;

pub use error::StorageError;
pub use query::{BlockingQuery, QueryOp, QueryTerm};
pub use record::{DynamicRecord, FieldAccessor, PropertyAccessor, Record};
pub use traits::RecordQueryProvider;
pub use value::Value;
