use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupsError {
    #[error("storage error: {0}")]
    Storage(#[from] wazap_storage::StorageError),
    #[error("sdk error: {0}")]
    Sdk(#[from] wazap_sdk::SdkError),
    #[error("malformed group metadata payload: {0}")]
    MalformedPayload(String),
}

pub type Result<T> = std::result::Result<T, GroupsError>;
