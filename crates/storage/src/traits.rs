use async_trait::async_trait;

use crate::error::StorageError;
use crate::query::BlockingQuery;
use crate::record::Record;

/// The record query trait for recordlink backends.
///
/// A `RecordQueryProvider` executes a compiled [`BlockingQuery`] against
/// wherever records of type `R` live and returns the matching records.
///
/// ## Query Semantics
///
/// - Only records whose `record_type()` equals `query.record_type` qualify.
/// - Every term must hold (AND); a term holds when the record's property
///   satisfies the operator against at least one of the term's values (OR).
///   A `None` value matches records where the property is absent.
/// - Records whose key is in `exclude_keys` are never returned.
/// - When `states` is non-empty, only records whose lifecycle state is one
///   of them are returned.
/// - When `limit` is set, at most that many records are returned.
///
/// Backend-specific operator translation (SQL functions, phonetic indexes)
/// is the implementation's concern. A backend that cannot evaluate an
/// operator returns `StorageError::UnsupportedOperator`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` so one provider can serve
/// concurrent matching runs.
#[async_trait]
pub trait RecordQueryProvider<R: Record>: Send + Sync {
    /// Execute the query and materialize the matching records.
    async fn query(&self, query: &BlockingQuery) -> Result<Vec<R>, StorageError>;

    /// Count the records the query would return.
    async fn count(&self, query: &BlockingQuery) -> Result<usize, StorageError> {
        Ok(self.query(query).await?.len())
    }
}
