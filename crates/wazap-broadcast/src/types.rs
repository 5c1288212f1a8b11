//! Inputs and outputs of a single broadcast call (spec §4.L).

/// Selects which `BroadcastModeConfig` preset (spec §6 / `wazap_core::config`)
/// governs concurrency, jitter range, retry count, and backoff base for a
/// given call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    Default,
    Fast,
    Safe,
}

/// What a caller gets back once every group has been attempted. A broadcast
/// always completes and reports, even when every single send failed — the
/// batch itself never aborts on a failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminalReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Bounded sample of group ids that never succeeded, capped at
    /// `BroadcastConfig::failure_sample_size`.
    pub failed_sample: Vec<String>,
    pub rate_limit_hits: u64,
}

impl TerminalReport {
    pub fn empty() -> Self {
        Self::default()
    }
}
