use clap::{Parser, ValueEnum};
use fluxmq_emitter::{
    BrokerClient, DeliveryTracker, Emitter, EmitterError, MemoryBroker, OutcomeLog, Settings,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BrokerKind {
    /// librdkafka producer against a Kafka-compatible broker
    Kafka,
    /// In-process broker that acknowledges everything (dry run)
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "fluxmq-emitter")]
#[command(about = "Emits a random number in [1, 100] every tick into a Kafka-compatible topic")]
struct Args {
    /// Comma-separated bootstrap brokers (overrides FLUXMQ_EMITTER_BOOTSTRAP_SERVERS)
    #[arg(short, long)]
    bootstrap_servers: Option<String>,

    /// Destination topic
    #[arg(short, long)]
    topic: Option<String>,

    /// Milliseconds between two emitted values
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Milliseconds to wait for in-flight messages on shutdown
    #[arg(long)]
    drain_timeout_ms: Option<u64>,

    /// Internal producer retries before a delivery is reported failed
    #[arg(long)]
    retries: Option<u32>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value = "kafka")]
    broker: BrokerKind,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Seconds between metrics log lines
    #[arg(long, default_value = "30")]
    metrics_interval_secs: u64,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(servers) = &self.bootstrap_servers {
            settings.bootstrap_servers = servers.clone();
        }
        if let Some(topic) = &self.topic {
            settings.topic = topic.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            settings.interval_ms = interval_ms;
        }
        if let Some(drain_timeout_ms) = self.drain_timeout_ms {
            settings.drain_timeout_ms = drain_timeout_ms;
        }
        if let Some(retries) = self.retries {
            settings.retries = retries;
        }
        if let Some(request_timeout_ms) = self.request_timeout_ms {
            settings.request_timeout_ms = request_timeout_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = parse_log_level(&args.log_level);
    tracing_subscriber::fmt()
        .with_max_level(log_level.unwrap_or(tracing::Level::INFO))
        .init();
    if log_level.is_none() {
        warn!("Invalid log level '{}', defaulting to 'info'", args.log_level);
    }

    let mut settings = Settings::from_env()?;
    args.apply(&mut settings);
    let tracker_config = settings.tracker_config()?;
    let emitter_config = settings.emitter_config()?;

    info!("Starting FluxMQ emitter");
    info!("Broker client: {:?}", args.broker);
    info!("Bootstrap servers: {}", tracker_config.bootstrap_list());
    info!("Topic: {}", tracker_config.topic);
    info!(
        "Retries: {}, request timeout: {}ms",
        tracker_config.retries,
        tracker_config.request_timeout.as_millis()
    );
    info!(
        "Tick interval: {}ms, drain timeout: {}ms",
        emitter_config.interval.as_millis(),
        emitter_config.drain_timeout.as_millis()
    );

    let client = create_client(args.broker, &tracker_config)?;
    let tracker = Arc::new(DeliveryTracker::new(
        tracker_config,
        client,
        Arc::new(OutcomeLog),
    ));

    let metrics = tracker.metrics();
    let reporter = metrics
        .clone()
        .start_reporter(Duration::from_secs(args.metrics_interval_secs.max(1)));

    let shutdown = CancellationToken::new();
    let emitter = Emitter::new(emitter_config, tracker);
    let emitter_handle = tokio::spawn(emitter.run(shutdown.clone()));

    // Set up signal handlers
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, draining..."),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
    shutdown.cancel();

    let report = emitter_handle.await??;
    reporter.abort();

    let snapshot = metrics.snapshot();
    info!(
        submitted = snapshot.submitted,
        rejected = snapshot.rejected,
        delivered = snapshot.delivered,
        failed = snapshot.failed,
        abandoned = snapshot.abandoned,
        "Final delivery summary"
    );

    if report.is_complete() {
        info!("FluxMQ emitter shut down cleanly");
    } else {
        error!(
            "Drain timed out with {} unconfirmed message(s)",
            report.abandoned.len()
        );
    }
    Ok(ExitCode::from(report.exit_code()))
}

fn create_client(
    kind: BrokerKind,
    config: &fluxmq_emitter::TrackerConfig,
) -> Result<Arc<dyn BrokerClient>, EmitterError> {
    match kind {
        #[cfg(feature = "kafka")]
        BrokerKind::Kafka => Ok(Arc::new(fluxmq_emitter::KafkaBrokerClient::new(config)?)),
        #[cfg(not(feature = "kafka"))]
        BrokerKind::Kafka => Err(EmitterError::invalid_config(
            "built without the `kafka` feature, use --broker memory",
        )),
        BrokerKind::Memory => Ok(Arc::new(MemoryBroker::new(config.queue_capacity))),
    }
}

fn parse_log_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_log_level("WARN"), Some(tracing::Level::WARN));
        assert_eq!(parse_log_level("verbose"), None);
    }
}
