use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("storage error: {0}")]
    Storage(#[from] wazap_storage::StorageError),
    #[error("sdk error: {0}")]
    Sdk(#[from] wazap_sdk::SdkError),
    #[error("groups error: {0}")]
    Groups(#[from] wazap_groups::GroupsError),
    #[error("invalid regex in anti-link configuration: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("usage: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, AdminError>;
