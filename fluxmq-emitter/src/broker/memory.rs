//! In-process broker client
//!
//! Holds accepted payloads in a bounded outbound queue and resolves them
//! according to a [`MemoryBehavior`] when callbacks are serviced. Callbacks
//! run on whichever thread services them, never while the internal lock is
//! held.

use super::{BrokerClient, DeliveryOutcome, Rejected, ResolveFn};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// How queued messages are resolved when callbacks are serviced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryBehavior {
    /// Acknowledge everything, spreading messages round-robin over partitions
    Acknowledge { partitions: i32 },
    /// Report a terminal failure for everything
    Fail { reason: String },
    /// Never resolve on its own; only manual resolution completes messages
    Hold,
}

impl Default for MemoryBehavior {
    fn default() -> Self {
        Self::Acknowledge { partitions: 1 }
    }
}

struct Queued {
    topic: String,
    payload: Bytes,
    on_resolve: ResolveFn,
}

#[derive(Default)]
struct BrokerState {
    queue: VecDeque<Queued>,
    behavior: MemoryBehavior,
    next_partition: i32,
    offsets: HashMap<(String, i32), i64>,
    log: Vec<(String, i32, Bytes)>,
}

impl BrokerState {
    fn acknowledge(&mut self, topic: String, payload: Bytes, partitions: i32) -> DeliveryOutcome {
        let partition = self.next_partition % partitions.max(1);
        self.next_partition = self.next_partition.wrapping_add(1).max(0);

        let next = self.offsets.entry((topic.clone(), partition)).or_insert(0);
        let offset = *next;
        *next += 1;

        self.log.push((topic, partition, payload));
        DeliveryOutcome::Success { partition, offset }
    }
}

/// Broker client that keeps everything in memory
pub struct MemoryBroker {
    capacity: usize,
    state: Mutex<BrokerState>,
}

impl MemoryBroker {
    /// Create a broker that acknowledges on a single partition
    pub fn new(capacity: usize) -> Self {
        Self::with_behavior(capacity, MemoryBehavior::default())
    }

    pub fn with_behavior(capacity: usize, behavior: MemoryBehavior) -> Self {
        Self {
            capacity,
            state: Mutex::new(BrokerState {
                behavior,
                ..BrokerState::default()
            }),
        }
    }

    pub fn set_behavior(&self, behavior: MemoryBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Number of accepted, unresolved messages
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Payloads acknowledged so far, in acknowledgment order
    pub fn acknowledged(&self) -> Vec<(String, i32, Bytes)> {
        self.state.lock().log.clone()
    }

    /// Resolve the oldest queued message with an explicit outcome.
    ///
    /// Returns false when nothing is queued.
    pub fn resolve_next(&self, outcome: DeliveryOutcome) -> bool {
        let queued = self.state.lock().queue.pop_front();
        match queued {
            Some(queued) => {
                (queued.on_resolve)(outcome);
                true
            }
            None => false,
        }
    }

    /// Resolve the most recently queued message with an explicit outcome
    pub fn resolve_last(&self, outcome: DeliveryOutcome) -> bool {
        let queued = self.state.lock().queue.pop_back();
        match queued {
            Some(queued) => {
                (queued.on_resolve)(outcome);
                true
            }
            None => false,
        }
    }

    fn take_resolvable(&self) -> Vec<(ResolveFn, DeliveryOutcome)> {
        let mut state = self.state.lock();
        match state.behavior.clone() {
            MemoryBehavior::Hold => Vec::new(),
            MemoryBehavior::Fail { reason } => state
                .queue
                .drain(..)
                .map(|queued| {
                    let outcome = DeliveryOutcome::Failure {
                        reason: reason.clone(),
                    };
                    (queued.on_resolve, outcome)
                })
                .collect(),
            MemoryBehavior::Acknowledge { partitions } => {
                let queued: Vec<Queued> = state.queue.drain(..).collect();
                queued
                    .into_iter()
                    .map(|queued| {
                        let outcome = state.acknowledge(queued.topic, queued.payload, partitions);
                        (queued.on_resolve, outcome)
                    })
                    .collect()
            }
        }
    }
}

impl BrokerClient for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn enqueue(&self, topic: &str, payload: Bytes, on_resolve: ResolveFn) -> Result<(), Rejected> {
        let mut state = self.state.lock();
        if state.queue.len() >= self.capacity {
            return Err(Rejected::queue_full());
        }

        state.queue.push_back(Queued {
            topic: topic.to_string(),
            payload,
            on_resolve,
        });
        Ok(())
    }

    fn service_pending_callbacks(&self, max_wait: Duration) {
        let resolvable = self.take_resolvable();

        if resolvable.is_empty() {
            if !max_wait.is_zero() {
                std::thread::sleep(max_wait);
            }
            return;
        }

        debug!(count = resolvable.len(), "Serving delivery callbacks");
        for (on_resolve, outcome) in resolvable {
            on_resolve(outcome);
        }
    }

    fn flush(&self, timeout: Duration) -> usize {
        self.service_pending_callbacks(timeout);
        self.queued()
    }
}
