//! Shared helpers: in-memory DLQ sink and wire-envelope construction from
//! outbox rows, so consumer semantics run without a broker.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use polis_consumer::{DlqSink, RecordMeta};
use polis_events::ConsumerDlqMessage;

#[derive(Default)]
struct SinkState {
    messages: Vec<(Option<String>, ConsumerDlqMessage)>,
    fail_next: usize,
}

#[derive(Clone, Default)]
pub struct MockDlqSink {
    state: Arc<Mutex<SinkState>>,
}

impl MockDlqSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn messages(&self) -> Vec<(Option<String>, ConsumerDlqMessage)> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl DlqSink for MockDlqSink {
    async fn send(&self, key: Option<&str>, msg: &ConsumerDlqMessage) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            bail!("KafkaError: dlq unavailable");
        }
        state.messages.push((key.map(str::to_string), msg.clone()));
        Ok(())
    }
}

pub async fn test_pool() -> Result<Option<PgPool>> {
    if std::env::var(polis_db::ENV_DB_URL).is_err() {
        eprintln!("SKIP: {} not set", polis_db::ENV_DB_URL);
        return Ok(None);
    }
    let pool = polis_db::testkit_db_pool().await?;
    Ok(Some(pool))
}

pub fn rand_chat_id() -> i64 {
    (Uuid::new_v4().as_u128() as i64).abs() % 1_000_000_000_000
}

pub fn test_config(max_attempts: u32) -> polis_config::ConsumerConfig {
    polis_config::ConsumerConfig {
        kafka: polis_config::KafkaConfig {
            bootstrap: "localhost:19092".to_string(),
            topic: "game-events".to_string(),
            dlq_topic: "game-events.dlq".to_string(),
        },
        group_id: "game-consumer-test".to_string(),
        max_attempts,
        base_backoff_secs: 0.001,
        metrics_every_secs: 10.0,
    }
}

/// Wire bytes for an outbox row, exactly as the relay would publish them.
pub fn envelope_bytes(row: &polis_db::OutboxRow) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "schema_version": 1,
        "event_id": row.id,
        "type": row.event_type,
        "aggregate": {"type": row.aggregate_type, "id": row.aggregate_id},
        "idempotency_key": row.idempotency_key,
        "created_at": row.created_at,
        "payload": row.payload,
    }))
    .unwrap()
}

pub fn meta(offset: i64, key: Option<&str>) -> RecordMeta {
    RecordMeta {
        topic: "game-events".to_string(),
        partition: 0,
        offset,
        key: key.map(str::to_string),
    }
}
