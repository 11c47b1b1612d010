//! Error types for the FluxMQ emitter

/// Main error type for emitter setup and shutdown
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    /// Broker client could not be created
    #[error("Broker client error: {message}")]
    BrokerClient { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Settings could not be loaded from the environment
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    /// The blocking drain task did not complete
    #[error("Drain task failed: {message}")]
    Drain { message: String },
}

impl EmitterError {
    /// Create a new broker client error
    pub fn broker_client<S: Into<String>>(message: S) -> Self {
        Self::BrokerClient {
            message: message.into(),
        }
    }

    /// Create a new invalid config error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new drain error
    pub fn drain<S: Into<String>>(message: S) -> Self {
        Self::Drain {
            message: message.into(),
        }
    }
}

/// Why a payload was not accepted by [`crate::DeliveryTracker::submit`].
///
/// A rejected payload is never tracked and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The broker client refused the payload, typically a full outbound queue
    #[error("Rejected by broker client: {reason}")]
    Rejected { reason: String },

    /// The tracker is draining and accepts no new work
    #[error("Tracker is draining, submission refused")]
    Draining,
}

impl SubmitError {
    /// Create a new rejection
    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}
