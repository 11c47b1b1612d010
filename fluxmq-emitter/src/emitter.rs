//! Periodic value emitter
//!
//! One value per tick is drawn, encoded as decimal UTF-8 text and submitted
//! to the [`DeliveryTracker`], after which the tracker is pumped so that
//! outcomes from earlier ticks get logged. When the shutdown token fires the
//! loop stops scheduling ticks and drains the tracker.

use crate::broker::DeliveryOutcome;
use crate::config::EmitterConfig;
use crate::error::EmitterError;
use crate::tracker::{AbandonedMessage, DeliveryReport, DeliveryTracker, DrainReport, OutcomeHandler};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Encode a value the way it is written to the topic
pub fn encode_value(value: u32) -> Bytes {
    Bytes::from(value.to_string())
}

/// Decode a payload written by [`encode_value`]
pub fn decode_value(payload: &[u8]) -> Option<u32> {
    std::str::from_utf8(payload).ok()?.parse().ok()
}

/// Emits one synthetic value per interval into a [`DeliveryTracker`]
pub struct Emitter<R = StdRng> {
    config: EmitterConfig,
    tracker: Arc<DeliveryTracker>,
    rng: R,
}

impl Emitter<StdRng> {
    pub fn new(config: EmitterConfig, tracker: Arc<DeliveryTracker>) -> Self {
        Self::with_rng(config, tracker, StdRng::from_os_rng())
    }
}

impl<R: RngCore> Emitter<R> {
    /// Create an emitter with an explicit random source
    pub fn with_rng(config: EmitterConfig, tracker: Arc<DeliveryTracker>, rng: R) -> Self {
        Self {
            config,
            tracker,
            rng,
        }
    }

    pub fn tracker(&self) -> &Arc<DeliveryTracker> {
        &self.tracker
    }

    /// Generate and submit one value, then serve pending outcomes.
    ///
    /// Submission is fire-and-forget; the generated value is returned for
    /// observation only.
    pub fn tick(&mut self) -> u32 {
        let value = self.rng.random_range(self.config.value_range.clone());

        match self.tracker.submit(encode_value(value)) {
            Ok(id) => info!(id, "Sent: {}", value),
            Err(e) => warn!(value, error = %e, "Error sending message"),
        }

        self.tracker.pump();
        value
    }

    /// Tick until `shutdown` is cancelled, then drain the tracker.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<DrainReport, EmitterError> {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            topic = %self.tracker.config().topic,
            "Emitter started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Stopping producer");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        let tracker = self.tracker.clone();
        let timeout = self.config.drain_timeout;
        tokio::task::spawn_blocking(move || tracker.drain(timeout))
            .await
            .map_err(|e| EmitterError::drain(e.to_string()))
    }
}

/// Outcome handler that logs every terminal message state
#[derive(Debug, Default, Clone, Copy)]
pub struct OutcomeLog;

impl OutcomeHandler for OutcomeLog {
    fn on_outcome(&self, report: &DeliveryReport) {
        match &report.outcome {
            DeliveryOutcome::Success { partition, offset } => info!(
                id = report.id,
                offset,
                latency_ms = report.latency.as_millis() as u64,
                "Message delivered to {} [{}]",
                report.topic,
                partition
            ),
            DeliveryOutcome::Failure { reason } => error!(
                id = report.id,
                topic = %report.topic,
                "Message delivery failed: {}",
                reason
            ),
        }
    }

    fn on_abandoned(&self, message: &AbandonedMessage) {
        error!(
            id = message.id,
            topic = %message.topic,
            payload = %String::from_utf8_lossy(&message.payload),
            "Message abandoned at shutdown"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBehavior, MemoryBroker};
    use crate::config::TrackerConfig;

    fn emitter(broker: Arc<MemoryBroker>, seed: u64) -> Emitter<StdRng> {
        let tracker = Arc::new(DeliveryTracker::new(
            TrackerConfig::default(),
            broker,
            Arc::new(OutcomeLog),
        ));
        Emitter::with_rng(EmitterConfig::default(), tracker, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_value_encoding() {
        assert_eq!(encode_value(42), Bytes::from("42"));
        assert_eq!(decode_value(b"100"), Some(100));
        assert_eq!(decode_value(b"forty"), None);
        assert_eq!(decode_value(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_values_stay_in_range() {
        let broker = Arc::new(MemoryBroker::new(1024));
        let mut emitter = emitter(broker, 7);

        for _ in 0..500 {
            let value = emitter.tick();
            assert!((1..=100).contains(&value), "value {} out of range", value);
        }
        assert_eq!(emitter.tracker().in_flight(), 0);
    }

    #[test]
    fn test_seeded_emitters_agree() {
        let mut left = emitter(Arc::new(MemoryBroker::new(64)), 99);
        let mut right = emitter(Arc::new(MemoryBroker::new(64)), 99);

        let left_values: Vec<u32> = (0..20).map(|_| left.tick()).collect();
        let right_values: Vec<u32> = (0..20).map(|_| right.tick()).collect();
        assert_eq!(left_values, right_values);
    }

    #[test]
    fn test_tick_submits_encoded_value() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let mut emitter = emitter(broker.clone(), 1);

        let value = emitter.tick();
        assert_eq!(broker.queued(), 1);
        assert_eq!(emitter.tracker().in_flight(), 1);

        broker.set_behavior(MemoryBehavior::Acknowledge { partitions: 1 });
        emitter.tracker().pump();
        let acknowledged = broker.acknowledged();
        assert_eq!(decode_value(&acknowledged[0].2), Some(value));
        assert_eq!(acknowledged[0].0, "random_numbers");
    }

    #[test]
    fn test_tick_survives_saturated_queue() {
        let broker = Arc::new(MemoryBroker::with_behavior(1, MemoryBehavior::Hold));
        let mut emitter = emitter(broker, 3);

        emitter.tick();
        emitter.tick();
        emitter.tick();

        assert_eq!(emitter.tracker().in_flight(), 1);
        assert_eq!(emitter.tracker().metrics().snapshot().rejected, 2);
    }
}
