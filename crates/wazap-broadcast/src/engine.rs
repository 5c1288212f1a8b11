//! Fixed-size worker pool draining a job channel of group ids, modeled on
//! `skynet-channels::manager::ChannelManager::connect_with_backoff` (retry
//! with exponential backoff) generalized to a process-wide rate-limit gate
//! all workers honor rather than a single connection's own backoff.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value as Json;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use wazap_core::config::{BroadcastConfig, BroadcastModeConfig};
use wazap_sdk::{SdkError, Session};

use crate::types::{BroadcastMode, TerminalReport};

/// Drives broadcast sends through a shared `Session`. Cheap to hold as a
/// long-lived service object — the rate-limit gate lives across calls so a
/// hit from one broadcast still protects the next one that starts seconds
/// later.
pub struct BroadcastEngine {
    session: Arc<dyn Session>,
    config: BroadcastConfig,
    rate_limit_until: Arc<RwLock<Option<Instant>>>,
}

impl BroadcastEngine {
    pub fn new(session: Arc<dyn Session>, config: BroadcastConfig) -> Self {
        Self {
            session,
            config,
            rate_limit_until: Arc::new(RwLock::new(None)),
        }
    }

    fn mode_config(&self, mode: BroadcastMode) -> BroadcastModeConfig {
        match mode {
            BroadcastMode::Default => self.config.default.clone(),
            BroadcastMode::Fast => self.config.fast.clone(),
            BroadcastMode::Safe => self.config.safe.clone(),
        }
    }

    /// Sends `payload` to every id in `group_ids`. Returns immediately with
    /// an empty report for an empty list — no workers spawned, no progress
    /// logged.
    pub async fn broadcast(&self, group_ids: Vec<String>, payload: Json, mode: BroadcastMode) -> TerminalReport {
        let total = group_ids.len();
        if total == 0 {
            return TerminalReport::empty();
        }
        let mode_cfg = self.mode_config(mode);

        let (tx, rx) = mpsc::channel(total);
        for id in group_ids {
            // Capacity equals `total`, so this never blocks.
            let _ = tx.send(id).await;
        }
        drop(tx);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let completed = Arc::new(AtomicUsize::new(0));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let rate_limit_hits = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failure_sample_size = self.config.failure_sample_size;

        let reporter = spawn_reporter(
            completed.clone(),
            total,
            self.config.progress_every_n,
            Duration::from_secs(self.config.progress_every_secs),
        );

        let mut workers = Vec::with_capacity(mode_cfg.concurrency.max(1));
        for _ in 0..mode_cfg.concurrency.max(1) {
            let rx = rx.clone();
            let session = self.session.clone();
            let payload = payload.clone();
            let mode_cfg = mode_cfg.clone();
            let rate_limit_until = self.rate_limit_until.clone();
            let completed = completed.clone();
            let succeeded = succeeded.clone();
            let rate_limit_hits = rate_limit_hits.clone();
            let failures = failures.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let group_id = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(group_id) = group_id else {
                        break;
                    };

                    jitter_sleep(mode_cfg.jitter_min_ms, mode_cfg.jitter_max_ms).await;
                    wait_out_rate_limit(&rate_limit_until).await;

                    let ok = send_with_retry(
                        session.as_ref(),
                        &group_id,
                        &payload,
                        &mode_cfg,
                        &rate_limit_until,
                        &rate_limit_hits,
                    )
                    .await;

                    if ok {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    } else {
                        let mut guard = failures.lock().expect("broadcast failure sample lock poisoned");
                        if guard.len() < failure_sample_size {
                            guard.push(group_id.clone());
                        }
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }
        reporter.abort();

        let succeeded = succeeded.load(Ordering::SeqCst);
        TerminalReport {
            total,
            succeeded,
            failed: total - succeeded,
            failed_sample: failures.lock().expect("broadcast failure sample lock poisoned").clone(),
            rate_limit_hits: rate_limit_hits.load(Ordering::SeqCst),
        }
    }
}

/// Logs progress every `every_n` completions or `every` elapsed, whichever
/// comes first, then exits once `total` is reached.
fn spawn_reporter(completed: Arc<AtomicUsize>, total: usize, every_n: u32, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_reported = 0usize;
        let mut last_report_at = Instant::now();
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let now = completed.load(Ordering::SeqCst);
            let n_elapsed = now.saturating_sub(last_reported) >= every_n as usize;
            let t_elapsed = last_report_at.elapsed() >= every;
            if now > last_reported && (n_elapsed || t_elapsed) {
                info!(completed = now, total, "broadcast progress");
                last_reported = now;
                last_report_at = Instant::now();
            }
            if now >= total {
                break;
            }
        }
    })
}

async fn jitter_sleep(min_ms: u64, max_ms: u64) {
    let delay_ms = if max_ms > min_ms {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

/// Blocks while the shared gate is set to a future instant. A no-op once
/// nothing is currently rate-limited.
async fn wait_out_rate_limit(rate_limit_until: &RwLock<Option<Instant>>) {
    loop {
        let until = *rate_limit_until.read().await;
        match until {
            Some(deadline) if deadline > Instant::now() => {
                tokio::time::sleep(deadline - Instant::now()).await;
            }
            _ => break,
        }
    }
}

/// Attempts one group's send up to `mode_cfg.retries` times. A rate-limit
/// response extends the shared gate so every other worker backs off too,
/// then retries once the gate clears; any other transient fault retries
/// with a local exponential backoff. A permanent fault or an exhausted
/// retry budget gives up and returns `false`.
async fn send_with_retry(
    session: &dyn Session,
    group_id: &str,
    payload: &Json,
    mode_cfg: &BroadcastModeConfig,
    rate_limit_until: &RwLock<Option<Instant>>,
    rate_limit_hits: &AtomicU64,
) -> bool {
    let max_attempts = mode_cfg.retries.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match session.send(group_id, payload.clone()).await {
            Ok(_) => return true,
            Err(SdkError::RateLimited) => {
                rate_limit_hits.fetch_add(1, Ordering::SeqCst);
                let extension = Duration::from_secs(mode_cfg.backoff_base_secs.max(1)) * 2u32.pow(attempt.min(5));
                extend_rate_limit(rate_limit_until, Instant::now() + extension).await;
                if attempt >= max_attempts {
                    return false;
                }
                wait_out_rate_limit(rate_limit_until).await;
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = Duration::from_secs(mode_cfg.backoff_base_secs.max(1)) * 2u32.pow(attempt - 1);
                warn!(group_id, error = %e, attempt, "broadcast send failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(group_id, error = %e, attempt, "broadcast send failed, giving up");
                return false;
            }
        }
    }
}

async fn extend_rate_limit(rate_limit_until: &RwLock<Option<Instant>>, until: Instant) {
    let mut guard = rate_limit_until.write().await;
    if guard.map(|current| current < until).unwrap_or(true) {
        *guard = Some(until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use tokio::sync::mpsc as tmpsc;
    use wazap_sdk::event::SdkEvent;
    use wazap_sdk::session::{JoinRequestAction, MemberAddMode, ParticipantAction};

    /// Minimal `Session` test double whose `send` behavior is scripted;
    /// every other method is a bare stub since the engine never calls them.
    struct ScriptedSession {
        sends: StdAtomicUsize,
        fail_group: Option<String>,
        rate_limit_first_n: u64,
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn connect(&self) -> wazap_sdk::Result<tmpsc::Receiver<SdkEvent>> {
            let (_tx, rx) = tmpsc::channel(1);
            Ok(rx)
        }
        async fn disconnect(&self) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn send(&self, chat_id: &str, _content: Json) -> wazap_sdk::Result<String> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst) as u64;
            if n < self.rate_limit_first_n {
                return Err(SdkError::RateLimited);
            }
            if self.fail_group.as_deref() == Some(chat_id) {
                return Err(SdkError::SendFailed("permanent".to_string()));
            }
            Ok(format!("MSG{n}"))
        }
        async fn fetch_group_metadata(&self, _group_id: &str) -> wazap_sdk::Result<Json> {
            Ok(json!({}))
        }
        async fn group_update_participants(
            &self,
            _group_id: &str,
            _participant_ids: &[String],
            _action: ParticipantAction,
        ) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn group_set_subject(&self, _group_id: &str, _subject: &str) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn group_set_description(&self, _group_id: &str, _description: &str) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn delete_message(&self, _chat_id: &str, _message_id: &str) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn react(&self, _chat_id: &str, _message_id: &str, _emoji: &str) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn group_leave(&self, _group_id: &str) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn group_invite_code(&self, _group_id: &str) -> wazap_sdk::Result<String> {
            Ok("FAKE".to_string())
        }
        async fn group_revoke_invite(&self, _group_id: &str) -> wazap_sdk::Result<String> {
            Ok("FAKE2".to_string())
        }
        async fn group_accept_invite(&self, code: &str) -> wazap_sdk::Result<String> {
            Ok(format!("joined-{code}"))
        }
        async fn group_info_from_invite(&self, _code: &str) -> wazap_sdk::Result<Json> {
            Ok(json!({}))
        }
        async fn group_set_ephemeral(&self, _group_id: &str, _duration_secs: Option<u64>) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn group_set_member_add_mode(&self, _group_id: &str, _mode: MemberAddMode) -> wazap_sdk::Result<()> {
            Ok(())
        }
        async fn group_join_requests(&self, _group_id: &str) -> wazap_sdk::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn group_update_join_requests(
            &self,
            _group_id: &str,
            _participant_ids: &[String],
            _action: JoinRequestAction,
        ) -> wazap_sdk::Result<()> {
            Ok(())
        }
    }

    fn engine(session: ScriptedSession) -> BroadcastEngine {
        let mut config = BroadcastConfig::default();
        // Keep the test's own jitter/backoff wall-clock cost negligible.
        for mode in [&mut config.default, &mut config.fast, &mut config.safe] {
            mode.jitter_min_ms = 1;
            mode.jitter_max_ms = 2;
            mode.backoff_base_secs = 0;
        }
        BroadcastEngine::new(Arc::new(session), config)
    }

    #[tokio::test]
    async fn empty_group_list_returns_empty_report_immediately() {
        let engine = engine(ScriptedSession {
            sends: StdAtomicUsize::new(0),
            fail_group: None,
            rate_limit_first_n: 0,
        });
        let report = engine.broadcast(vec![], json!({"text": "hi"}), BroadcastMode::Default).await;
        assert_eq!(report, TerminalReport::empty());
    }

    #[tokio::test]
    async fn single_group_failure_does_not_abort_the_batch() {
        let engine = engine(ScriptedSession {
            sends: StdAtomicUsize::new(0),
            fail_group: Some("B@g.us".to_string()),
            rate_limit_first_n: 0,
        });
        let groups = vec!["A@g.us".to_string(), "B@g.us".to_string(), "C@g.us".to_string()];
        let report = engine.broadcast(groups, json!({"text": "hi"}), BroadcastMode::Safe).await;
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_sample, vec!["B@g.us".to_string()]);
    }

    #[tokio::test]
    async fn rate_limit_is_retried_and_eventually_succeeds() {
        let engine = engine(ScriptedSession {
            sends: StdAtomicUsize::new(0),
            fail_group: None,
            rate_limit_first_n: 2,
        });
        let groups = vec!["A@g.us".to_string()];
        let report = engine.broadcast(groups, json!({"text": "hi"}), BroadcastMode::Fast).await;
        assert_eq!(report.succeeded, 1);
        assert!(report.rate_limit_hits >= 1);
    }

    #[tokio::test]
    async fn failure_sample_is_bounded_by_config() {
        struct AlwaysFails;
        #[async_trait]
        impl Session for AlwaysFails {
            async fn connect(&self) -> wazap_sdk::Result<tmpsc::Receiver<SdkEvent>> {
                let (_tx, rx) = tmpsc::channel(1);
                Ok(rx)
            }
            async fn disconnect(&self) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn send(&self, _chat_id: &str, _content: Json) -> wazap_sdk::Result<String> {
                Err(SdkError::SendFailed("always fails".to_string()))
            }
            async fn fetch_group_metadata(&self, _group_id: &str) -> wazap_sdk::Result<Json> {
                Ok(json!({}))
            }
            async fn group_update_participants(
                &self,
                _group_id: &str,
                _participant_ids: &[String],
                _action: ParticipantAction,
            ) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn group_set_subject(&self, _group_id: &str, _subject: &str) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn group_set_description(&self, _group_id: &str, _description: &str) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn delete_message(&self, _chat_id: &str, _message_id: &str) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn react(&self, _chat_id: &str, _message_id: &str, _emoji: &str) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn group_leave(&self, _group_id: &str) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn group_invite_code(&self, _group_id: &str) -> wazap_sdk::Result<String> {
                Ok("FAKE".to_string())
            }
            async fn group_revoke_invite(&self, _group_id: &str) -> wazap_sdk::Result<String> {
                Ok("FAKE2".to_string())
            }
            async fn group_accept_invite(&self, code: &str) -> wazap_sdk::Result<String> {
                Ok(format!("joined-{code}"))
            }
            async fn group_info_from_invite(&self, _code: &str) -> wazap_sdk::Result<Json> {
                Ok(json!({}))
            }
            async fn group_set_ephemeral(&self, _group_id: &str, _duration_secs: Option<u64>) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn group_set_member_add_mode(&self, _group_id: &str, _mode: MemberAddMode) -> wazap_sdk::Result<()> {
                Ok(())
            }
            async fn group_join_requests(&self, _group_id: &str) -> wazap_sdk::Result<Vec<String>> {
                Ok(Vec::new())
            }
            async fn group_update_join_requests(
                &self,
                _group_id: &str,
                _participant_ids: &[String],
                _action: JoinRequestAction,
            ) -> wazap_sdk::Result<()> {
                Ok(())
            }
        }

        let mut config = BroadcastConfig::default();
        config.safe.concurrency = 4;
        config.safe.jitter_min_ms = 1;
        config.safe.jitter_max_ms = 2;
        config.safe.backoff_base_secs = 0;
        config.failure_sample_size = 2;
        let engine = BroadcastEngine::new(Arc::new(AlwaysFails), config);
        let groups: Vec<String> = (0..5).map(|i| format!("G{i}@g.us")).collect();
        let report = engine.broadcast(groups, json!({"text": "hi"}), BroadcastMode::Safe).await;
        assert_eq!(report.failed, 5);
        assert_eq!(report.failed_sample.len(), 2);
    }
}
