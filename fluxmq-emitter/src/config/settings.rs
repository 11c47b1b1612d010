use super::{EmitterConfig, TrackerConfig, DEFAULT_TOPIC};
use crate::error::EmitterError;
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "FLUXMQ_EMITTER";

/// Flat process settings, read from `FLUXMQ_EMITTER_*` environment variables.
///
/// Command line flags are applied on top of these in `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Comma-separated bootstrap broker list
    pub bootstrap_servers: String,
    pub topic: String,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub queue_capacity: usize,
    pub interval_ms: u64,
    pub drain_timeout_ms: u64,
    pub client_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            request_timeout_ms: 25000,
            retries: 10,
            queue_capacity: 100_000,
            interval_ms: 500,
            drain_timeout_ms: 10_000,
            client_id: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, EmitterError> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: Environment) -> Result<Self, EmitterError> {
        let settings = Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize::<Settings>()?)
    }

    pub fn tracker_config(&self) -> Result<TrackerConfig, EmitterError> {
        let config = TrackerConfig {
            topic: self.topic.clone(),
            bootstrap_servers: self
                .bootstrap_servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retries: self.retries,
            queue_capacity: self.queue_capacity,
            client_id: self.client_id.clone(),
            ..TrackerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn emitter_config(&self) -> Result<EmitterConfig, EmitterError> {
        let config = EmitterConfig {
            interval: Duration::from_millis(self.interval_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            ..EmitterConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = Settings::from_environment(environment(&[])).unwrap();
        assert_eq!(settings.topic, "random_numbers");
        assert_eq!(settings.retries, 10);
        assert_eq!(settings.request_timeout_ms, 25000);
        assert_eq!(settings.interval_ms, 500);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_environment(environment(&[
            ("FLUXMQ_EMITTER_TOPIC", "numbers"),
            ("FLUXMQ_EMITTER_RETRIES", "4"),
            ("FLUXMQ_EMITTER_BOOTSTRAP_SERVERS", "kafka-1:9093, kafka-2:9093"),
        ]))
        .unwrap();

        assert_eq!(settings.topic, "numbers");
        assert_eq!(settings.retries, 4);

        let tracker = settings.tracker_config().unwrap();
        assert_eq!(tracker.bootstrap_servers, vec!["kafka-1:9093", "kafka-2:9093"]);
        assert_eq!(tracker.request_timeout, Duration::from_millis(25000));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings {
            interval_ms: 0,
            ..Settings::default()
        };
        assert!(settings.emitter_config().is_err());

        let settings = Settings {
            bootstrap_servers: " , ".to_string(),
            ..Settings::default()
        };
        assert!(settings.tracker_config().is_err());
    }
}
