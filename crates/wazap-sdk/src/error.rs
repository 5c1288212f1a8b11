use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("rate limited")]
    RateLimited,

    #[error("auth store error: {0}")]
    AuthStore(String),

    #[error("not connected")]
    NotConnected,
}

impl SdkError {
    /// Whether a transient-fault retrier (reconnect supervisor, broadcast
    /// engine) should treat this as retryable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SdkError::ConnectionFailed(_)
                | SdkError::SendFailed(_)
                | SdkError::Timeout { .. }
                | SdkError::RateLimited
        )
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
