/// All errors that can be returned by a RecordQueryProvider implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend cannot evaluate an operator used in the query.
    #[error("unsupported query operator '{op}'")]
    UnsupportedOperator { op: String },

    /// A record could not be read or built from its stored form.
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
