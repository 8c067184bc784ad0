//! Kafka-backed [`SourceConnector`].

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;
use std::time::Duration;

use tix_utils::{KafkaConfig, TixError, TixResult};

use crate::consumer::{MessageSource, SourceConnector};

fn messaging(error: KafkaError) -> TixError {
    TixError::messaging(error.to_string())
}

pub struct KafkaConnector {
    brokers: String,
    group_id: String,
    metadata_timeout: Duration,
}

impl KafkaConnector {
    pub fn new(config: &KafkaConfig) -> Self {
        Self {
            brokers: config.brokers.clone(),
            group_id: config.group_id.clone(),
            metadata_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl SourceConnector for KafkaConnector {
    async fn connect(&self, topic: &str) -> TixResult<Box<dyn MessageSource>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(messaging)?;

        // Creating a client never touches the network; a metadata fetch
        // is what proves the broker is reachable.
        let owned_topic = topic.to_string();
        let timeout = self.metadata_timeout;
        let consumer = tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(Some(&owned_topic), timeout)
                .map(|_| consumer)
        })
        .await
        .map_err(|e| TixError::internal(e.to_string()))?
        .map_err(messaging)?;

        consumer.subscribe(&[topic]).map_err(messaging)?;
        Ok(Box::new(KafkaSource { consumer }))
    }
}

struct KafkaSource {
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&mut self) -> TixResult<Option<Vec<u8>>> {
        let message = self.consumer.recv().await.map_err(messaging)?;
        Ok(Some(message.payload().unwrap_or_default().to_vec()))
    }
}
