//! Delivery tracker: pending-message bookkeeping and the shutdown drain barrier
//!
//! Every accepted payload becomes a [`PendingMessage`] keyed by a
//! [`MessageId`]. The broker client reports outcomes through a callback that
//! only pushes `(id, outcome)` onto the tracker's outcome channel, from
//! whatever thread the client uses. Outcomes reach the [`OutcomeHandler`]
//! only when the owner calls [`DeliveryTracker::pump`] or
//! [`DeliveryTracker::drain`], on the owner's thread.
//!
//! Each message ends in exactly one terminal state:
//!
//! ```text
//! Submitted ──▶ Resolved-Success
//!           ├─▶ Resolved-Failure
//!           └─▶ Abandoned (drain timeout)
//! ```
//!
//! An outcome arriving for a message that is already resolved or abandoned is
//! discarded, so the handler sees at most one resolution per message.

use crate::broker::{BrokerClient, DeliveryOutcome, ResolveFn};
use crate::config::TrackerConfig;
use crate::error::SubmitError;
use crate::metrics::DeliveryMetrics;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Identifier assigned to each accepted payload
pub type MessageId = u64;

/// A payload handed to the broker client and not yet resolved
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub payload: Bytes,
    pub submit_time: Instant,
    /// Hand-offs to the broker client; client-internal retries are not counted
    pub attempt_count: u32,
}

impl PendingMessage {
    fn new(payload: Bytes) -> Self {
        Self {
            payload,
            submit_time: Instant::now(),
            attempt_count: 0,
        }
    }
}

/// A resolved message as seen by the outcome handler
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub id: MessageId,
    pub topic: String,
    pub payload: Bytes,
    pub outcome: DeliveryOutcome,
    pub latency: Duration,
}

/// A message given up on when the drain deadline passed
#[derive(Debug, Clone)]
pub struct AbandonedMessage {
    pub id: MessageId,
    pub topic: String,
    pub payload: Bytes,
    pub age: Duration,
}

/// Result of [`DeliveryTracker::drain`]
#[derive(Debug, Clone)]
pub struct DrainReport {
    /// Outcomes dispatched while draining
    pub resolved: usize,
    /// Every message abandoned so far, including by an earlier drain, ordered by id
    pub abandoned: Vec<AbandonedMessage>,
    pub elapsed: Duration,
}

impl DrainReport {
    /// True when nothing was abandoned
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty()
    }

    /// Process exit status signalling whether delivery completed
    pub fn exit_code(&self) -> u8 {
        if self.is_complete() {
            0
        } else {
            1
        }
    }
}

/// Subscriber for terminal message states.
///
/// Called on the thread that pumps or drains the tracker, never while the
/// tracker's lock is held.
pub trait OutcomeHandler: Send + Sync {
    fn on_outcome(&self, report: &DeliveryReport);

    fn on_abandoned(&self, message: &AbandonedMessage);
}

#[derive(Default)]
struct TrackerState {
    pending: HashMap<MessageId, PendingMessage>,
    abandoned: HashMap<MessageId, AbandonedMessage>,
    in_flight: usize,
    next_id: MessageId,
    draining: bool,
}

/// Owns in-flight bookkeeping between the emitter and the broker client
pub struct DeliveryTracker {
    config: TrackerConfig,
    client: Arc<dyn BrokerClient>,
    handler: Arc<dyn OutcomeHandler>,
    state: Mutex<TrackerState>,
    outcome_tx: Sender<(MessageId, DeliveryOutcome)>,
    outcome_rx: Receiver<(MessageId, DeliveryOutcome)>,
    metrics: Arc<DeliveryMetrics>,
}

impl DeliveryTracker {
    pub fn new(
        config: TrackerConfig,
        client: Arc<dyn BrokerClient>,
        handler: Arc<dyn OutcomeHandler>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = channel::unbounded();
        Self {
            config,
            client,
            handler,
            state: Mutex::new(TrackerState::default()),
            outcome_tx,
            outcome_rx,
            metrics: Arc::new(DeliveryMetrics::new()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<DeliveryMetrics> {
        self.metrics.clone()
    }

    /// Messages submitted and not yet resolved, abandoned ones included
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Messages still waiting for an outcome
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    /// Hand a payload to the broker client without blocking.
    ///
    /// A rejected payload is dropped: no pending entry survives and nothing
    /// will ever be reported for it.
    pub fn submit(&self, payload: Bytes) -> Result<MessageId, SubmitError> {
        let id = {
            let mut state = self.state.lock();
            if state.draining {
                return Err(SubmitError::Draining);
            }

            let id = state.next_id;
            state.next_id += 1;

            let mut message = PendingMessage::new(payload.clone());
            message.attempt_count += 1;
            state.pending.insert(id, message);
            state.in_flight += 1;
            id
        };

        let outcome_tx = self.outcome_tx.clone();
        let on_resolve: ResolveFn = Box::new(move |outcome| {
            // The receiver lives as long as the tracker
            let _ = outcome_tx.send((id, outcome));
        });

        match self.client.enqueue(&self.config.topic, payload, on_resolve) {
            Ok(()) => {
                self.metrics.record_submitted();
                debug!(id, topic = %self.config.topic, "Message queued");
                Ok(id)
            }
            Err(rejected) => {
                {
                    let mut state = self.state.lock();
                    if state.pending.remove(&id).is_some() {
                        state.in_flight -= 1;
                    }
                }
                self.metrics.record_rejected();
                warn!(
                    id,
                    client = self.client.name(),
                    reason = %rejected,
                    "Message dropped, outbound path saturated"
                );
                Err(SubmitError::rejected(rejected.reason))
            }
        }
    }

    /// Serve delivery callbacks without waiting and dispatch any outcomes.
    ///
    /// Returns the number of messages resolved by this call.
    pub fn pump(&self) -> usize {
        self.client.service_pending_callbacks(Duration::ZERO);
        self.dispatch_outcomes()
    }

    /// Wait at most `timeout` for pending messages to resolve, then abandon the rest.
    ///
    /// New submissions are refused from the moment this is called. A timeout
    /// too large to form a deadline waits until nothing is pending.
    pub fn drain(&self, timeout: Duration) -> DrainReport {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);

        let pending = {
            let mut state = self.state.lock();
            state.draining = true;
            state.pending.len()
        };
        info!(
            pending,
            timeout_ms = timeout.as_millis() as u64,
            "Draining in-flight messages"
        );

        let mut resolved = self.dispatch_outcomes();
        while self.pending() > 0 {
            let step = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    (deadline - now).min(self.config.drain_poll_interval)
                }
                None => self.config.drain_poll_interval,
            };
            let unresolved_in_client = self.client.flush(step);
            resolved += self.dispatch_outcomes();
            debug!(
                unresolved_in_client,
                pending = self.pending(),
                "Drain step finished"
            );
        }

        // Outcomes the client already holds are resolutions, not abandonments
        self.client.service_pending_callbacks(Duration::ZERO);
        resolved += self.dispatch_outcomes();

        let (newly_abandoned, abandoned) = self.abandon_pending();
        if !newly_abandoned.is_empty() {
            self.metrics.record_abandoned(newly_abandoned.len() as u64);
        }
        for message in &newly_abandoned {
            warn!(
                id = message.id,
                topic = %message.topic,
                age_ms = message.age.as_millis() as u64,
                "Message abandoned, delivery not confirmed before drain timeout"
            );
            self.handler.on_abandoned(message);
        }

        let report = DrainReport {
            resolved,
            abandoned,
            elapsed: started.elapsed(),
        };
        info!(
            resolved = report.resolved,
            abandoned = report.abandoned.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Drain finished"
        );
        report
    }

    fn dispatch_outcomes(&self) -> usize {
        let mut resolved = 0;
        while let Ok((id, outcome)) = self.outcome_rx.try_recv() {
            if self.resolve(id, outcome) {
                resolved += 1;
            }
        }
        resolved
    }

    fn resolve(&self, id: MessageId, outcome: DeliveryOutcome) -> bool {
        let message = {
            let mut state = self.state.lock();
            let removed = state.pending.remove(&id);
            match removed {
                Some(message) => {
                    state.in_flight -= 1;
                    message
                }
                None => {
                    let abandoned = state.abandoned.contains_key(&id);
                    drop(state);
                    debug!(id, abandoned, %outcome, "Discarding outcome for settled message");
                    return false;
                }
            }
        };

        let latency = message.submit_time.elapsed();
        match &outcome {
            DeliveryOutcome::Success { .. } => self.metrics.record_delivered(latency),
            DeliveryOutcome::Failure { .. } => self.metrics.record_failed(),
        }

        let report = DeliveryReport {
            id,
            topic: self.config.topic.clone(),
            payload: message.payload,
            outcome,
            latency,
        };
        self.handler.on_outcome(&report);
        true
    }

    /// Moves every pending entry to the abandoned table; they stay counted in flight.
    ///
    /// Returns the messages abandoned by this call and all abandoned messages,
    /// both ordered by id.
    fn abandon_pending(&self) -> (Vec<AbandonedMessage>, Vec<AbandonedMessage>) {
        let mut state = self.state.lock();
        let mut newly_abandoned: Vec<AbandonedMessage> = state
            .pending
            .drain()
            .map(|(id, message)| AbandonedMessage {
                id,
                topic: self.config.topic.clone(),
                age: message.submit_time.elapsed(),
                payload: message.payload,
            })
            .collect();
        newly_abandoned.sort_by_key(|m| m.id);
        for message in &newly_abandoned {
            state.abandoned.insert(message.id, message.clone());
        }

        let mut abandoned: Vec<AbandonedMessage> = state.abandoned.values().cloned().collect();
        abandoned.sort_by_key(|m| m.id);
        (newly_abandoned, abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBehavior, MemoryBroker};

    #[derive(Default)]
    struct Recorder {
        outcomes: Mutex<Vec<DeliveryReport>>,
        abandoned: Mutex<Vec<MessageId>>,
    }

    impl OutcomeHandler for Recorder {
        fn on_outcome(&self, report: &DeliveryReport) {
            self.outcomes.lock().push(report.clone());
        }

        fn on_abandoned(&self, message: &AbandonedMessage) {
            self.abandoned.lock().push(message.id);
        }
    }

    fn tracker(broker: Arc<MemoryBroker>) -> (DeliveryTracker, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let tracker = DeliveryTracker::new(TrackerConfig::default(), broker, recorder.clone());
        (tracker, recorder)
    }

    #[test]
    fn test_submit_counts_in_flight() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let (tracker, _) = tracker(broker.clone());

        let first = tracker.submit(Bytes::from("7")).unwrap();
        let second = tracker.submit(Bytes::from("42")).unwrap();

        assert_ne!(first, second);
        assert_eq!(tracker.in_flight(), 2);
        assert_eq!(tracker.pending(), 2);
        assert_eq!(broker.queued(), 2);
        assert_eq!(tracker.metrics().snapshot().submitted, 2);
    }

    #[test]
    fn test_rejected_submit_leaves_no_entry() {
        let broker = Arc::new(MemoryBroker::with_behavior(1, MemoryBehavior::Hold));
        let (tracker, recorder) = tracker(broker);

        tracker.submit(Bytes::from("1")).unwrap();
        let result = tracker.submit(Bytes::from("2"));

        assert!(matches!(result, Err(SubmitError::Rejected { .. })));
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(tracker.pending(), 1);
        assert_eq!(tracker.metrics().snapshot().rejected, 1);
        assert!(recorder.outcomes.lock().is_empty());
    }

    #[test]
    fn test_pump_dispatches_outcomes() {
        let broker = Arc::new(MemoryBroker::new(8));
        let (tracker, recorder) = tracker(broker);

        let id = tracker.submit(Bytes::from("42")).unwrap();
        assert_eq!(tracker.pump(), 1);

        let outcomes = recorder.outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].id, id);
        assert_eq!(outcomes[0].payload, Bytes::from("42"));
        assert_eq!(outcomes[0].topic, "random_numbers");
        assert_eq!(
            outcomes[0].outcome,
            DeliveryOutcome::Success {
                partition: 0,
                offset: 0
            }
        );
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_pump_without_outcomes_is_noop() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let (tracker, recorder) = tracker(broker);

        assert_eq!(tracker.pump(), 0);
        tracker.submit(Bytes::from("3")).unwrap();
        assert_eq!(tracker.pump(), 0);
        assert_eq!(tracker.pump(), 0);

        assert_eq!(tracker.in_flight(), 1);
        assert!(recorder.outcomes.lock().is_empty());
    }

    #[test]
    fn test_duplicate_outcome_is_discarded() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let (tracker, recorder) = tracker(broker);

        let id = tracker.submit(Bytes::from("9")).unwrap();
        let success = DeliveryOutcome::Success {
            partition: 0,
            offset: 3,
        };
        tracker.outcome_tx.send((id, success.clone())).unwrap();
        tracker.outcome_tx.send((id, success)).unwrap();

        assert_eq!(tracker.pump(), 1);
        assert_eq!(recorder.outcomes.lock().len(), 1);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_drain_refuses_new_submissions() {
        let broker = Arc::new(MemoryBroker::new(8));
        let (tracker, _) = tracker(broker);

        let report = tracker.drain(Duration::from_millis(50));
        assert!(report.is_complete());
        assert_eq!(report.exit_code(), 0);
        assert!(tracker.is_draining());
        assert_eq!(tracker.submit(Bytes::from("1")), Err(SubmitError::Draining));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_drain_with_zero_timeout_abandons_immediately() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let (tracker, recorder) = tracker(broker);
        tracker.submit(Bytes::from("1")).unwrap();
        tracker.submit(Bytes::from("2")).unwrap();

        let report = tracker.drain(Duration::ZERO);

        assert_eq!(report.abandoned.len(), 2);
        assert_eq!(report.abandoned[0].payload, Bytes::from("1"));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(*recorder.abandoned.lock(), vec![0, 1]);
        assert_eq!(tracker.in_flight(), 2);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_late_outcome_after_abandon_is_ignored() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let (tracker, recorder) = tracker(broker.clone());
        tracker.submit(Bytes::from("5")).unwrap();

        let report = tracker.drain(Duration::from_millis(10));
        assert_eq!(report.abandoned.len(), 1);

        assert!(broker.resolve_next(DeliveryOutcome::Success {
            partition: 0,
            offset: 0
        }));
        assert_eq!(tracker.pump(), 0);
        assert!(recorder.outcomes.lock().is_empty());
        assert_eq!(tracker.in_flight(), 1);
    }

    #[test]
    fn test_zero_timeout_drain_resolves_acknowledged_messages() {
        let broker = Arc::new(MemoryBroker::new(8));
        let (tracker, recorder) = tracker(broker);
        let id = tracker.submit(Bytes::from("5")).unwrap();

        let report = tracker.drain(Duration::ZERO);

        assert_eq!(report.resolved, 1);
        assert!(report.is_complete());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(recorder.outcomes.lock()[0].id, id);
        assert!(recorder.abandoned.lock().is_empty());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_repeated_drain_keeps_reporting_abandoned() {
        let broker = Arc::new(MemoryBroker::with_behavior(8, MemoryBehavior::Hold));
        let (tracker, recorder) = tracker(broker);
        let id = tracker.submit(Bytes::from("5")).unwrap();

        let first = tracker.drain(Duration::from_millis(10));
        let second = tracker.drain(Duration::from_millis(10));

        assert_eq!(first.abandoned.len(), 1);
        assert_eq!(second.abandoned.len(), 1);
        assert_eq!(second.abandoned[0].id, id);
        assert_eq!(second.exit_code(), 1);
        assert_eq!(tracker.in_flight(), second.abandoned.len());
        assert_eq!(*recorder.abandoned.lock(), vec![id]);
        assert_eq!(tracker.metrics().snapshot().abandoned, 1);
    }

    #[test]
    fn test_drain_without_representable_deadline() {
        let broker = Arc::new(MemoryBroker::new(8));
        let (tracker, recorder) = tracker(broker);
        tracker.submit(Bytes::from("77")).unwrap();
        tracker.submit(Bytes::from("78")).unwrap();

        let report = tracker.drain(Duration::MAX);

        assert!(report.is_complete());
        assert_eq!(report.resolved, 2);
        assert_eq!(recorder.outcomes.lock().len(), 2);
        assert_eq!(tracker.in_flight(), 0);
    }
}
