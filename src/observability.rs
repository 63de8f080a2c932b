//! Process-wide counters and log setup

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, honouring `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_enqueued: AtomicU64,
    jobs_converted: AtomicU64,
    jobs_failed: AtomicU64,
    attempts_failed: AtomicU64,
    cleanup_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_enqueued", "Metric incremented");
    }

    pub fn job_converted(&self) {
        self.jobs_converted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_converted", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn attempt_failed(&self) {
        self.attempts_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "attempts_failed", "Metric incremented");
    }

    pub fn cleanup_failed(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cleanup_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_converted: self.jobs_converted.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_converted: u64,
    pub jobs_failed: u64,
    pub attempts_failed: u64,
    pub cleanup_failures: u64,
}
