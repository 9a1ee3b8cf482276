//! Idempotent consumer: materializes the per-chat read model from the event
//! stream with effectively-exactly-once semantics.
//!
//! At-least-once delivery from the broker is narrowed to one observable
//! application per event id by the consumed-events ledger; poison messages
//! are dead-lettered and then recorded in the same ledger so they can never
//! wedge a partition.

pub mod processor;
pub mod sink;

pub use processor::{retry_backoff, EventProcessor, Metrics, Outcome, RecordMeta};
pub use sink::{DlqSink, KafkaDlqSink};

use anyhow::Result;
use polis_config::ConsumerConfig;
use serde_json::json;
use sqlx::PgPool;

/// Readiness probe for `--check`: DB and broker reachable.
pub async fn readiness(pool: &PgPool, cfg: &ConsumerConfig) -> Result<(serde_json::Value, bool)> {
    let db = polis_db::status(pool).await?;
    let kafka_ok = cfg.kafka.tcp_ping(std::time::Duration::from_secs(1));

    let ready = db.ok && kafka_ok;
    let report = json!({
        "ok": ready,
        "db": if db.ok { "ok" } else { "fail" },
        "kafka": if kafka_ok { "ok" } else { "fail" },
        "kafka_bootstrap": cfg.kafka.bootstrap,
        "topic": cfg.kafka.topic,
        "dlq_topic": cfg.kafka.dlq_topic,
        "group_id": cfg.group_id,
        "time_utc": chrono::Utc::now(),
    });

    Ok((report, ready))
}
