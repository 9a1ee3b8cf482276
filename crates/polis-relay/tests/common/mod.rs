//! In-memory publisher with scripted failures so the relay state machine can
//! be exercised without a broker. Records every acknowledged publish.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use polis_relay::EventPublisher;

#[derive(Default)]
struct MockState {
    /// (topic, key, message) for every successful publish, in order.
    published: Vec<(String, String, Value)>,
    /// Number of upcoming main-topic publishes to fail.
    fail_main: usize,
    /// Number of upcoming DLQ-topic publishes to fail.
    fail_dlq: usize,
}

#[derive(Clone, Default)]
pub struct MockPublisher {
    state: Arc<Mutex<MockState>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_main(&self, n: usize) {
        self.state.lock().unwrap().fail_main = n;
    }

    pub fn fail_next_dlq(&self, n: usize) {
        self.state.lock().unwrap().fail_dlq = n;
    }

    pub fn published(&self) -> Vec<(String, String, Value)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, _, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, topic: &str, key: &str, value: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if topic.ends_with(".dlq") {
            if state.fail_dlq > 0 {
                state.fail_dlq -= 1;
                bail!("KafkaError: dlq broker unavailable");
            }
        } else if state.fail_main > 0 {
            state.fail_main -= 1;
            bail!("KafkaError: broker unavailable");
        }
        state
            .published
            .push((topic.to_string(), key.to_string(), value.clone()));
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

/// Relay config pointed at unique topics per test run, so assertions on the
/// mock's recorded traffic never see another test's messages.
pub fn test_config(max_attempts: i32) -> polis_config::RelayConfig {
    let suffix = Uuid::new_v4().simple().to_string();
    polis_config::RelayConfig {
        kafka: polis_config::KafkaConfig {
            bootstrap: "localhost:19092".to_string(),
            topic: format!("game-events-{suffix}"),
            dlq_topic: format!("game-events-{suffix}.dlq"),
        },
        batch_size: 50,
        max_attempts,
        lock_ttl_secs: 30,
        publish_timeout_secs: 10.0,
        idle_sleep_secs: 0.05,
    }
}

/// Lease exactly one row for `owner`, bypassing the retry timer (tests
/// control the clock by leasing directly instead of waiting out backoff).
/// Leaves every other pending row alone, so concurrently running tests in
/// the same binary cannot steal each other's rows.
pub async fn lease_one(pool: &PgPool, id: Uuid, owner: &str) -> Result<polis_db::OutboxRow> {
    let res = sqlx::query(
        r#"
        update outbox_events
        set status = 'processing',
            locked_until = now() + interval '30 seconds',
            lock_owner = $2
        where id = $1
          and status = 'new'
        "#,
    )
    .bind(id)
    .bind(owner)
    .execute(pool)
    .await?;
    anyhow::ensure!(res.rows_affected() == 1, "row {id} was not leasable");

    polis_db::fetch_outbox_row(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("row {id} vanished"))
}

/// Lease every pending row of one aggregate for `owner`, oldest first.
pub async fn lease_aggregate(
    pool: &PgPool,
    aggregate_id: Uuid,
    owner: &str,
) -> Result<Vec<polis_db::OutboxRow>> {
    sqlx::query(
        r#"
        update outbox_events
        set status = 'processing',
            locked_until = now() + interval '30 seconds',
            lock_owner = $2
        where aggregate_id = $1
          and status = 'new'
          and published_at is null
        "#,
    )
    .bind(aggregate_id)
    .bind(owner)
    .execute(pool)
    .await?;

    let mut rows: Vec<_> = polis_db::list_outbox_by_aggregate(pool, aggregate_id, 500)
        .await?
        .into_iter()
        .filter(|r| r.status == "processing" && r.lock_owner.as_deref() == Some(owner))
        .collect();
    rows.sort_by_key(|r| r.created_at);
    Ok(rows)
}
