//! Event-kind → handler registry (spec §4.F). The router doesn't know what
//! a `messages.upsert` handler does with the payload, only that it's a
//! fallible async function — the same "handler registry is a set" stance
//! spec.md takes for the dispatcher, applied one layer down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::{debug, error};

use wazap_core::metrics::Metrics;
use wazap_sdk::event::SdkEvent;

pub type HandlerFn = Arc<dyn Fn(SdkEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Fans inbound SDK events out to per-kind handlers inside a fault-isolated
/// scope: one handler's error is logged and counted, never propagated to
/// the event loop or to other handlers.
pub struct EventRouter {
    handlers: HashMap<&'static str, HandlerFn>,
    generation: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

impl EventRouter {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            handlers: HashMap::new(),
            generation: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    pub fn register(&mut self, kind: &'static str, handler: HandlerFn) {
        self.handlers.insert(kind, handler);
    }

    /// Called by the supervisor once per successful connect. Any event
    /// still in flight from the previous socket carries the prior
    /// generation and is silently dropped by `dispatch`.
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn dispatch(&self, event: SdkEvent, bound_generation: u64) {
        if self.generation.load(Ordering::SeqCst) != bound_generation {
            debug!(kind = event.kind(), bound_generation, "dropping event from a stale connection generation");
            return;
        }

        let kind = event.kind();
        self.metrics.incr(&format!("router.events.{kind}"));

        let Some(handler) = self.handlers.get(kind).cloned() else {
            debug!(kind, "no handler registered for event kind");
            return;
        };

        let started = Instant::now();
        let result = handler(event).await;
        if kind == "messages.upsert" {
            self.metrics
                .observe_duration("router.messages_upsert_ms", started.elapsed());
        }
        if let Err(e) = result {
            self.metrics.incr(&format!("router.errors.{kind}"));
            error!(kind, error = %e, "event handler failed");
        }
    }
}
