//! Consumer-side dead-letter seam, mirrored on the relay's publisher seam so
//! the processing loop is testable without a broker.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;

use polis_config::KafkaConfig;
use polis_events::ConsumerDlqMessage;

#[async_trait]
pub trait DlqSink: Send + Sync {
    async fn send(&self, key: Option<&str>, msg: &ConsumerDlqMessage) -> Result<()>;
}

pub struct KafkaDlqSink {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDlqSink {
    pub fn new(cfg: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap)
            .set("client.id", "polis-consumer-dlq")
            .set("acks", "all")
            .create()
            .context("failed to create DLQ producer")?;

        Ok(Self {
            producer,
            topic: cfg.dlq_topic.clone(),
            timeout: Duration::from_secs(10),
        })
    }

    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(timeout)
            .map_err(|e| anyhow!("dlq producer flush failed: {e}"))
    }
}

#[async_trait]
impl DlqSink for KafkaDlqSink {
    async fn send(&self, key: Option<&str>, msg: &ConsumerDlqMessage) -> Result<()> {
        let payload = serde_json::to_string(msg).context("serialize dlq message")?;

        let send = match key {
            Some(k) => {
                let record = FutureRecord::to(&self.topic).key(k).payload(&payload);
                self.producer.send(record, self.timeout).await
            }
            None => {
                let record = FutureRecord::<(), String>::to(&self.topic).payload(&payload);
                self.producer.send(record, self.timeout).await
            }
        };

        send.map_err(|(err, _)| anyhow!("KafkaError: {err}"))?;

        Ok(())
    }
}
