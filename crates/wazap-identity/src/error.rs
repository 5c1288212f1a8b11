use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("storage error: {0}")]
    Storage(#[from] wazap_storage::StorageError),
    #[error("write queue error: {0}")]
    Queue(#[from] wazap_queue::QueueError),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
