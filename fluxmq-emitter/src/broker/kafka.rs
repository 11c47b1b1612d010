//! librdkafka backed broker client
//!
//! Uses a polling `BaseProducer`: delivery reports are only served from
//! [`BrokerClient::service_pending_callbacks`] and [`BrokerClient::flush`],
//! never from a background thread of ours. Retries and request deadlines are
//! handed to librdkafka through the producer configuration.

use super::{BrokerClient, DeliveryOutcome, Rejected, ResolveFn};
use crate::config::TrackerConfig;
use crate::error::EmitterError;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext};
use rdkafka::ClientContext;
use std::time::Duration;
use tracing::{debug, info};

/// Routes each delivery report to the callback it was sent with
struct DeliveryContext;

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<ResolveFn>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, on_resolve: Self::DeliveryOpaque) {
        let outcome = match delivery_result {
            Ok(message) => DeliveryOutcome::Success {
                partition: message.partition(),
                offset: message.offset(),
            },
            Err((error, _)) => DeliveryOutcome::Failure {
                reason: error.to_string(),
            },
        };
        on_resolve(outcome);
    }
}

/// Producer client for Kafka-compatible brokers
pub struct KafkaBrokerClient {
    producer: BaseProducer<DeliveryContext>,
}

impl KafkaBrokerClient {
    pub fn new(config: &TrackerConfig) -> Result<Self, EmitterError> {
        let producer = Self::client_config(config)
            .create_with_context(DeliveryContext)
            .map_err(|e| {
                EmitterError::broker_client(format!("Failed to create producer: {}", e))
            })?;

        info!(
            bootstrap_servers = %config.bootstrap_list(),
            retries = config.retries,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Kafka producer created"
        );
        Ok(Self { producer })
    }

    fn client_config(config: &TrackerConfig) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.bootstrap_list())
            .set(
                "request.timeout.ms",
                config.request_timeout.as_millis().to_string(),
            )
            .set("message.send.max.retries", config.retries.to_string())
            .set(
                "queue.buffering.max.messages",
                config.queue_capacity.to_string(),
            );

        if let Some(client_id) = &config.client_id {
            client_config.set("client.id", client_id);
        }
        client_config
    }
}

impl BrokerClient for KafkaBrokerClient {
    fn name(&self) -> &'static str {
        "kafka"
    }

    fn enqueue(&self, topic: &str, payload: Bytes, on_resolve: ResolveFn) -> Result<(), Rejected> {
        let record =
            BaseRecord::<(), [u8], _>::with_opaque_to(topic, Box::new(on_resolve)).payload(&payload[..]);

        // On error the record, and the callback inside it, comes back to us and is dropped
        self.producer.send(record).map_err(|(error, _)| match error {
            KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull) => Rejected::queue_full(),
            other => Rejected::new(other.to_string()),
        })
    }

    fn service_pending_callbacks(&self, max_wait: Duration) {
        self.producer.poll(max_wait);
    }

    fn flush(&self, timeout: Duration) -> usize {
        if let Err(e) = self.producer.flush(timeout) {
            debug!(error = %e, "Flush returned before all messages resolved");
        }
        self.producer.in_flight_count().max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfigBuilder;

    #[test]
    fn test_client_config_carries_delivery_policy() {
        let config = TrackerConfigBuilder::new()
            .bootstrap_servers(vec!["kafka-1:9093", "kafka-2:9093"])
            .client_id("emitter")
            .build()
            .unwrap();

        let client_config = KafkaBrokerClient::client_config(&config);
        assert_eq!(
            client_config.get("bootstrap.servers"),
            Some("kafka-1:9093,kafka-2:9093")
        );
        assert_eq!(client_config.get("request.timeout.ms"), Some("25000"));
        assert_eq!(client_config.get("message.send.max.retries"), Some("10"));
        assert_eq!(client_config.get("client.id"), Some("emitter"));
    }

    #[test]
    fn test_producer_creation_is_lazy() {
        // librdkafka connects in the background, so creation succeeds without a broker
        let config = TrackerConfig::default();
        let client = KafkaBrokerClient::new(&config).unwrap();
        assert_eq!(client.name(), "kafka");
        assert_eq!(client.flush(Duration::ZERO), 0);
    }
}
