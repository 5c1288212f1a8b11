//! Connection state machine (spec §4.G): owns the single live SDK session,
//! drives reconnects with rolling-window backoff, and feeds every other
//! event to the router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use wazap_sdk::auth::AuthStore;
use wazap_sdk::event::{DisconnectReason, SdkEvent};
use wazap_sdk::session::SessionFactory;

use crate::backoff::ReconnectPolicy;
use crate::router::EventRouter;
use crate::state::ConnectionState;

pub struct ConnectionSupervisorConfig {
    pub reconnect_base: Duration,
    pub reconnect_max_attempts: u32,
    pub reconnect_window: Duration,
}

impl Default for ConnectionSupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_secs(3),
            reconnect_max_attempts: 5,
            reconnect_window: Duration::from_secs(10 * 60),
        }
    }
}

/// Called once per successful `connection: open`, before the run loop
/// starts forwarding further events. Used to kick off group-metadata
/// preload and emit a readiness signal to the process manager.
pub type OnOpenHook = Arc<dyn Fn() + Send + Sync>;

pub struct ConnectionSupervisor {
    factory: Arc<dyn SessionFactory>,
    router: Arc<EventRouter>,
    state_tx: watch::Sender<ConnectionState>,
    policy: Mutex<ReconnectPolicy>,
    /// Guards the connect+run body so a manually triggered reconnect never
    /// races the main loop's own reconnect. A second caller simply waits
    /// for the first to finish rather than opening a second socket.
    connecting: Mutex<()>,
    shutting_down: AtomicBool,
    on_open: Option<OnOpenHook>,
    auth: Option<Arc<dyn AuthStore>>,
}

impl ConnectionSupervisor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        router: Arc<EventRouter>,
        cfg: ConnectionSupervisorConfig,
        on_open: Option<OnOpenHook>,
    ) -> (Arc<Self>, watch::Receiver<ConnectionState>) {
        Self::with_auth_store(factory, router, cfg, on_open, None)
    }

    /// Same as [`Self::new`], additionally wiring an [`AuthStore`] whose
    /// `wipe` is invoked on a hard-logout disconnect (spec §7: "Auth-
    /// invalidation fault ... wipe credentials directory").
    pub fn with_auth_store(
        factory: Arc<dyn SessionFactory>,
        router: Arc<EventRouter>,
        cfg: ConnectionSupervisorConfig,
        on_open: Option<OnOpenHook>,
        auth: Option<Arc<dyn AuthStore>>,
    ) -> (Arc<Self>, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Init);
        let supervisor = Arc::new(Self {
            factory,
            router,
            state_tx,
            policy: Mutex::new(ReconnectPolicy::new(
                cfg.reconnect_base,
                cfg.reconnect_max_attempts,
                cfg.reconnect_window,
            )),
            connecting: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            on_open,
            auth,
        });
        (supervisor, state_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Drives connect → event loop → reconnect until `shutdown` is called.
    /// Intended to be spawned once; the `connecting` lock makes a second,
    /// concurrent call to `run` simply wait behind the first rather than
    /// opening a competing socket.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                let _ = self.state_tx.send(ConnectionState::Shutdown);
                return;
            }

            let _guard = self.connecting.lock().await;
            let outcome = self.connect_and_drain().await;
            drop(_guard);

            match outcome {
                LoopOutcome::HardLogout => {
                    let _ = self.state_tx.send(ConnectionState::Closed);
                    if let Some(auth) = &self.auth {
                        if let Err(e) = auth.wipe() {
                            warn!(error = %e, "failed to wipe credentials after hard logout");
                        }
                    }
                    info!("connection closed definitively (hard logout), not reconnecting");
                    return;
                }
                LoopOutcome::ShuttingDown => {
                    let _ = self.state_tx.send(ConnectionState::Shutdown);
                    return;
                }
                LoopOutcome::Reconnect => {
                    let _ = self.state_tx.send(ConnectionState::ReconnectDelay);
                    let delay = self.policy.lock().await.next_delay(Instant::now());
                    warn!(delay_secs = delay.as_secs(), "scheduling reconnect");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn connect_and_drain(&self) -> LoopOutcome {
        let _ = self.state_tx.send(ConnectionState::Connecting);
        let session = self.factory.build();
        let mut rx = match session.connect().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "connect failed");
                return LoopOutcome::Reconnect;
            }
        };

        let generation = self.router.bump_generation();

        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                let _ = session.disconnect().await;
                return LoopOutcome::ShuttingDown;
            }

            let event = match rx.recv().await {
                Some(event) => event,
                None => {
                    warn!("session event stream closed unexpectedly");
                    return LoopOutcome::Reconnect;
                }
            };

            match event {
                SdkEvent::ConnectionOpen => {
                    self.policy.lock().await.reset();
                    let _ = self.state_tx.send(ConnectionState::Open);
                    info!("connected");
                    if let Some(hook) = &self.on_open {
                        hook();
                    }
                }
                SdkEvent::ConnectionQr { qr } => {
                    info!(qr, "scan this QR to authenticate");
                }
                SdkEvent::ConnectionClose { reason } => {
                    if reason.is_hard_logout() {
                        return LoopOutcome::HardLogout;
                    }
                    warn!(reason = ?reason, "connection closed, will reconnect");
                    return LoopOutcome::Reconnect;
                }
                other => {
                    self.router.dispatch(other, generation).await;
                }
            }
        }
    }

    /// Cancels any pending reconnect timer and stops the run loop on its
    /// next check. Disconnecting the live session (if any) happens inside
    /// `connect_and_drain`'s own shutdown check — a pending `sleep` for a
    /// scheduled reconnect is not interrupted early, matching "idempotent,
    /// cancellable only via Shutdown": the next wake tick observes the flag
    /// and exits instead of reconnecting.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }
}

enum LoopOutcome {
    HardLogout,
    ShuttingDown,
    Reconnect,
}

pub use DisconnectReason as ConnectionDisconnectReason;
