//! Broker client abstraction consumed by the delivery tracker
//!
//! The tracker never talks to a broker directly. It hands payloads to a
//! [`BrokerClient`], which owns transport, partitioning and internal retries,
//! and later reports exactly one [`DeliveryOutcome`] per accepted payload
//! through the callback it was given.
//!
//! Two implementations ship with the crate:
//!
//! - [`KafkaBrokerClient`] - librdkafka based, for real Kafka-compatible brokers
//!   (FluxMQ, Apache Kafka). Requires the `kafka` feature.
//! - [`MemoryBroker`] - in-process broker used for tests and dry runs

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

#[cfg(feature = "kafka")]
pub use kafka::KafkaBrokerClient;
pub use memory::{MemoryBehavior, MemoryBroker};

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Terminal result of one delivery, as reported by the broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The broker acknowledged the message
    Success { partition: i32, offset: i64 },
    /// Retries were exhausted or the error was not retryable
    Failure { reason: String },
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { partition, offset } => {
                write!(f, "delivered [{}] @ {}", partition, offset)
            }
            Self::Failure { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Callback a broker client invokes once an accepted payload resolves.
///
/// Clients may invoke it from any thread.
pub type ResolveFn = Box<dyn FnOnce(DeliveryOutcome) + Send + Sync>;

/// The client refused to accept a payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejected {
    pub reason: String,
}

impl Rejected {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn queue_full() -> Self {
        Self::new("local outbound queue is full")
    }
}

/// Capability the delivery tracker needs from a producer client.
///
/// # Contract
///
/// - `enqueue` must not block. When it returns `Err`, `on_resolve` is dropped
///   without being invoked.
/// - When it returns `Ok`, `on_resolve` is invoked exactly once, eventually,
///   unless the client is dropped first.
/// - Callbacks are served when the owner calls `service_pending_callbacks` or
///   `flush`; neither may wait longer than the duration it is given.
pub trait BrokerClient: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Queue a payload for transmission to `topic`
    fn enqueue(&self, topic: &str, payload: Bytes, on_resolve: ResolveFn) -> Result<(), Rejected>;

    /// Serve queued delivery callbacks, waiting at most `max_wait`
    fn service_pending_callbacks(&self, max_wait: Duration);

    /// Push out buffered messages for at most `timeout`.
    ///
    /// Returns how many messages are still unresolved inside the client.
    fn flush(&self, timeout: Duration) -> usize;
}
