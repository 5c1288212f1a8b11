/// Connection supervisor state (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Open,
    Closed,
    ReconnectDelay,
    Shutdown,
}
