use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Operation not permitted: {0}")]
    OperationNotPermitted(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Database connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// Infrastructure faults that a caller may reasonably retry.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_) | StorageError::Cache(_) | StorageError::ConnectionError(_)
        )
    }
}
