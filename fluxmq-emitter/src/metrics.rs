//! Delivery metrics for the emitter pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Lock-free delivery counters shared between the tracker and the reporter
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    submitted: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    delivery_latency_sum_us: AtomicU64,
    delivery_latency_count: AtomicU64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload accepted by the broker client
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload shed at submission
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful delivery and its end-to-end latency
    pub fn record_delivered(&self, latency: Duration) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.delivery_latency_sum_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.delivery_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal delivery failure
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record messages given up on at drain timeout
    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    /// Get average delivery latency in microseconds
    pub fn average_delivery_latency_us(&self) -> f64 {
        let sum = self.delivery_latency_sum_us.load(Ordering::Relaxed);
        let count = self.delivery_latency_count.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }

    /// Get snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            average_delivery_latency_us: self.average_delivery_latency_us(),
        }
    }

    /// Start periodic metrics reporter
    pub fn start_reporter(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let snapshot = self.snapshot();

                info!(
                    submitted = snapshot.submitted,
                    rejected = snapshot.rejected,
                    delivered = snapshot.delivered,
                    failed = snapshot.failed,
                    abandoned = snapshot.abandoned,
                    avg_latency_ms = format!("{:.2}", snapshot.average_delivery_latency_us / 1000.0),
                    "Metrics report"
                );
            }
        })
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub average_delivery_latency_us: f64,
}
