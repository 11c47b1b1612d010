//! Configuration types for the FluxMQ emitter

mod settings;

pub use settings::Settings;

use crate::error::EmitterError;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Destination used when none is configured
pub const DEFAULT_TOPIC: &str = "random_numbers";

/// Delivery tracker configuration
///
/// `retries` and `request_timeout` are owned here but executed by the broker
/// client; the tracker only ever observes terminal outcomes.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Destination topic for every submitted payload
    pub topic: String,
    /// List of bootstrap broker addresses
    pub bootstrap_servers: Vec<String>,
    /// Per-attempt request deadline
    pub request_timeout: Duration,
    /// Maximum internal retries before a terminal failure
    pub retries: u32,
    /// Capacity of the client's local outbound queue
    pub queue_capacity: usize,
    /// Upper bound of a single flush/poll step while draining
    pub drain_poll_interval: Duration,
    /// Client identifier reported to the broker
    pub client_id: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            bootstrap_servers: vec!["localhost:9092".to_string()],
            request_timeout: Duration::from_millis(25000),
            retries: 10,
            queue_capacity: 100_000,
            drain_poll_interval: Duration::from_millis(100),
            client_id: None,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), EmitterError> {
        if self.topic.trim().is_empty() {
            return Err(EmitterError::invalid_config("topic must not be empty"));
        }
        if self.bootstrap_servers.iter().all(|s| s.trim().is_empty()) {
            return Err(EmitterError::invalid_config(
                "at least one bootstrap server is required",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(EmitterError::invalid_config(
                "queue capacity must be greater than zero",
            ));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(EmitterError::invalid_config(
                "drain poll interval must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Bootstrap servers joined the way Kafka clients expect them
    pub fn bootstrap_list(&self) -> String {
        self.bootstrap_servers.join(",")
    }
}

/// Emitter loop configuration
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Time between two ticks
    pub interval: Duration,
    /// Inclusive range the synthetic values are drawn from
    pub value_range: RangeInclusive<u32>,
    /// How long shutdown waits for in-flight messages
    pub drain_timeout: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            value_range: 1..=100,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl EmitterConfig {
    pub fn validate(&self) -> Result<(), EmitterError> {
        if self.interval.is_zero() {
            return Err(EmitterError::invalid_config(
                "tick interval must be greater than zero",
            ));
        }
        if self.value_range.is_empty() {
            return Err(EmitterError::invalid_config(format!(
                "value range {:?} is empty",
                self.value_range
            )));
        }
        Ok(())
    }
}

/// Builder for TrackerConfig
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic<S: Into<String>>(mut self, topic: S) -> Self {
        self.config.topic = topic.into();
        self
    }

    pub fn bootstrap_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.bootstrap_servers = servers.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn drain_poll_interval(mut self, interval: Duration) -> Self {
        self.config.drain_poll_interval = interval;
        self
    }

    pub fn client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    pub fn build(self) -> Result<TrackerConfig, EmitterError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder for EmitterConfig
#[derive(Debug, Default)]
pub struct EmitterConfigBuilder {
    config: EmitterConfig,
}

impl EmitterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn value_range(mut self, range: RangeInclusive<u32>) -> Self {
        self.config.value_range = range;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<EmitterConfig, EmitterError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
