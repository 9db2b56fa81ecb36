//! Tracing setup and in-process counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `telemetry.log_level` when set.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording pipeline counters
#[derive(Debug, Default)]
pub struct Metrics {
    tasks_committed: AtomicU64,
    tasks_partially_committed: AtomicU64,
    tasks_dead_lettered: AtomicU64,
    tasks_interrupted: AtomicU64,
    tasks_undecodable: AtomicU64,
    items_succeeded: AtomicU64,
    items_failed: AtomicU64,
    item_retries: AtomicU64,
    dead_letter_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_committed(&self) {
        self.incr(&self.tasks_committed, "tasks_committed");
    }

    pub fn task_partially_committed(&self) {
        self.incr(&self.tasks_partially_committed, "tasks_partially_committed");
    }

    pub fn task_dead_lettered(&self) {
        self.incr(&self.tasks_dead_lettered, "tasks_dead_lettered");
    }

    pub fn task_interrupted(&self) {
        self.incr(&self.tasks_interrupted, "tasks_interrupted");
    }

    pub fn task_undecodable(&self) {
        self.incr(&self.tasks_undecodable, "tasks_undecodable");
    }

    pub fn item_succeeded(&self) {
        self.incr(&self.items_succeeded, "items_succeeded");
    }

    pub fn item_failed(&self) {
        self.incr(&self.items_failed, "items_failed");
    }

    pub fn item_retried(&self) {
        self.incr(&self.item_retries, "item_retries");
    }

    pub fn dead_letter_failed(&self) {
        self.incr(&self.dead_letter_failures, "dead_letter_failures");
    }

    fn incr(&self, counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = name, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_committed: self.tasks_committed.load(Ordering::Relaxed),
            tasks_partially_committed: self.tasks_partially_committed.load(Ordering::Relaxed),
            tasks_dead_lettered: self.tasks_dead_lettered.load(Ordering::Relaxed),
            tasks_interrupted: self.tasks_interrupted.load(Ordering::Relaxed),
            tasks_undecodable: self.tasks_undecodable.load(Ordering::Relaxed),
            items_succeeded: self.items_succeeded.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            item_retries: self.item_retries.load(Ordering::Relaxed),
            dead_letter_failures: self.dead_letter_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_committed: u64,
    pub tasks_partially_committed: u64,
    pub tasks_dead_lettered: u64,
    pub tasks_interrupted: u64,
    pub tasks_undecodable: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub item_retries: u64,
    pub dead_letter_failures: u64,
}
