//! # FluxMQ Emitter
//!
//! A periodic producer that writes synthetic numeric events to a
//! Kafka-compatible broker and tracks every delivery to a terminal state.
//!
//! ## Pipeline
//!
//! - [`Emitter`] draws a value in `[1, 100]` per tick, submits it and pumps
//!   outcomes
//! - [`DeliveryTracker`] owns pending messages, dispatches outcomes exactly
//!   once and drains on shutdown
//! - [`BrokerClient`] is the producer capability underneath: librdkafka via
//!   [`KafkaBrokerClient`], or the in-process [`MemoryBroker`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxmq_emitter::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tracker = Arc::new(DeliveryTracker::new(
//!         TrackerConfig::default(),
//!         Arc::new(MemoryBroker::new(1024)),
//!         Arc::new(OutcomeLog),
//!     ));
//!
//!     let shutdown = CancellationToken::new();
//!     let emitter = Emitter::new(EmitterConfig::default(), tracker);
//!     let task = tokio::spawn(emitter.run(shutdown.clone()));
//!
//!     tokio::signal::ctrl_c().await?;
//!     shutdown.cancel();
//!
//!     let report = task.await.expect("emitter task panicked")?;
//!     println!("abandoned: {}", report.abandoned.len());
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod emitter;
pub mod error;
pub mod metrics;
pub mod tracker;

#[cfg(feature = "kafka")]
pub use broker::KafkaBrokerClient;
pub use broker::{BrokerClient, DeliveryOutcome, MemoryBehavior, MemoryBroker, Rejected, ResolveFn};
pub use crate::config::{
    EmitterConfig, EmitterConfigBuilder, Settings, TrackerConfig, TrackerConfigBuilder, DEFAULT_TOPIC,
};
pub use emitter::*;
pub use error::*;
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use tracker::*;

/// Emitter library result type
pub type Result<T> = std::result::Result<T, EmitterError>;

/// Emitter library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
