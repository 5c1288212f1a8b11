use thiserror::Error;

/// Top-level error type shared across the workspace. Per-crate errors
/// (`StorageError`, `QueueError`, `IdentityError`, ...) carry their own
/// richer variants and convert into this one at the binary's outer edge.
#[derive(Debug, Error)]
pub enum WazapError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("messaging provider error: {0}")]
    Provider(String),

    #[error("identity resolution error: {0}")]
    Identity(String),

    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WazapError {
    /// Short machine-readable tag, used in structured log fields so
    /// dashboards can group on error kind without parsing the message.
    pub fn code(&self) -> &'static str {
        match self {
            WazapError::Config(_) => "CONFIG_ERROR",
            WazapError::Database(_) => "DATABASE_ERROR",
            WazapError::Provider(_) => "PROVIDER_ERROR",
            WazapError::Identity(_) => "IDENTITY_ERROR",
            WazapError::PermissionDenied { .. } => "PERMISSION_DENIED",
            WazapError::Serialization(_) => "SERIALIZATION_ERROR",
            WazapError::Io(_) => "IO_ERROR",
            WazapError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WazapError>;
