use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("write queue is full")]
    Full,

    #[error("write queue consumer has shut down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, QueueError>;
