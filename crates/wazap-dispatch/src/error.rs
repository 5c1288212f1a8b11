use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("storage error: {0}")]
    Storage(#[from] wazap_storage::StorageError),
    #[error("sdk error: {0}")]
    Sdk(#[from] wazap_sdk::SdkError),
    #[error("queue error: {0}")]
    Queue(#[from] wazap_queue::error::QueueError),
    #[error("identity error: {0}")]
    Identity(#[from] wazap_identity::IdentityError),
    #[error("groups error: {0}")]
    Groups(#[from] wazap_groups::GroupsError),
    #[error("admin error: {0}")]
    Admin(#[from] wazap_admin::AdminError),
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
