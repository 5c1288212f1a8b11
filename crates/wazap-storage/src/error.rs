use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage gateway is shutting down")]
    ShuttingDown,

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
