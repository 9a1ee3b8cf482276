//! Broker publishing seam.
//!
//! The relay state machine talks to `EventPublisher` so its retry/DLQ
//! behavior can be exercised with an in-memory publisher; the production
//! implementation wraps an rdkafka `FutureProducer`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use polis_config::KafkaConfig;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Durable synchronous send: returns Ok only once the broker has
    /// acknowledged the record with acks=all.
    async fn publish(&self, topic: &str, key: &str, value: &Value) -> Result<()>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, topic: &str, key: &str, value: &Value) -> Result<()> {
        (**self).publish(topic, key, value).await
    }
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(cfg: &KafkaConfig, timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap)
            .set("client.id", "polis-relay")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            .set("message.timeout.ms", (timeout.as_millis() as u64).to_string())
            .create()
            .context("failed to create Kafka producer")?;

        Ok(Self { producer, timeout })
    }

    /// Drain in-flight records before process exit.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(timeout)
            .map_err(|e| anyhow!("producer flush failed: {e}"))
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, value: &Value) -> Result<()> {
        let payload = serde_json::to_string(value).context("serialize wire message")?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| anyhow!("KafkaError: {err}"))?;

        Ok(())
    }
}
