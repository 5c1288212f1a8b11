//! In-process counters/histogram registry shared by the event router, write
//! queue, and broadcast engine. Exposition format (Prometheus, etc.) is out
//! of scope — this registry exposes a `snapshot()` the binary logs on an
//! interval; a real exporter would read the same snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// A single named counter, safe for concurrent increments.
#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn incr(&self, by: u64) {
        self.0.fetch_add(by, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A running-stats histogram (count, sum, min, max) over duration samples in
/// milliseconds. Deliberately not a bucketed histogram — the registry only
/// needs to answer "how many, how long on average, worst case" for the
/// periodic snapshot log line.
#[derive(Debug, Default)]
struct Histogram {
    count: u64,
    sum_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

impl Histogram {
    fn observe(&mut self, ms: u64) {
        if self.count == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.count += 1;
        self.sum_ms += ms;
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let mean_ms = if self.count == 0 {
            0.0
        } else {
            self.sum_ms as f64 / self.count as f64
        };
        HistogramSnapshot {
            count: self.count,
            mean_ms,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub mean_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub histograms: HashMap<String, HistogramSnapshot>,
}

/// Shared metrics registry. Cheap to clone (wraps an `Arc` internally via
/// `Mutex` + interior atomics); construct one per process and pass `Arc`
/// handles to every component that reports.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<HashMap<String, Counter>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a named counter by 1, e.g. an event-kind counter or an
    /// error counter keyed by event kind.
    pub fn incr(&self, name: &str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &str, by: u64) {
        let mut counters = self.counters.lock().expect("metrics counters lock poisoned");
        counters.entry(name.to_string()).or_default().incr(by);
    }

    /// Record a duration sample in milliseconds against a named histogram,
    /// e.g. `messages.upsert` handling duration.
    pub fn observe_ms(&self, name: &str, ms: u64) {
        let mut histograms = self
            .histograms
            .lock()
            .expect("metrics histograms lock poisoned");
        histograms.entry(name.to_string()).or_default().observe(ms);
    }

    pub fn observe_duration(&self, name: &str, duration: std::time::Duration) {
        self.observe_ms(name, duration.as_millis() as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.lock().expect("metrics counters lock poisoned");
        let histograms = self
            .histograms
            .lock()
            .expect("metrics histograms lock poisoned");

        MetricsSnapshot {
            counters: counters.iter().map(|(k, v)| (k.clone(), v.get())).collect(),
            histograms: histograms
                .iter()
                .map(|(k, v)| (k.clone(), v.snapshot()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_names() {
        let metrics = Metrics::new();
        metrics.incr("events.messages_upsert");
        metrics.incr("events.messages_upsert");
        metrics.incr("events.chats_upsert");

        let snap = metrics.snapshot();
        assert_eq!(snap.counters["events.messages_upsert"], 2);
        assert_eq!(snap.counters["events.chats_upsert"], 1);
    }

    #[test]
    fn histogram_tracks_min_max_mean() {
        let metrics = Metrics::new();
        metrics.observe_ms("messages.upsert", 10);
        metrics.observe_ms("messages.upsert", 30);
        metrics.observe_ms("messages.upsert", 20);

        let snap = metrics.snapshot();
        let hist = &snap.histograms["messages.upsert"];
        assert_eq!(hist.count, 3);
        assert_eq!(hist.min_ms, 10);
        assert_eq!(hist.max_ms, 30);
        assert!((hist.mean_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_is_empty_for_unused_registry() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert!(snap.counters.is_empty());
        assert!(snap.histograms.is_empty());
    }
}
