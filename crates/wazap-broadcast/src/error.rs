use thiserror::Error;

/// Errors that can occur wiring a broadcast call. The fan-out itself never
/// surfaces a per-group send failure here — those land in the
/// `TerminalReport`'s failure sample instead.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast session error: {0}")]
    Session(#[from] wazap_sdk::SdkError),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
