use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("sdk error: {0}")]
    Sdk(#[from] wazap_sdk::SdkError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
