//! Outbox relay: leases ready outbox rows, publishes them to the broker
//! keyed by aggregate id, and finalizes each row as sent, retried or dead.
//!
//! Multiple relay instances may run against one outbox; reservation uses
//! skip-locked row leases and every finalize is guarded by the lease owner,
//! so a reclaimed row is finalized by exactly one instance.

pub mod backoff;
pub mod publisher;
pub mod relay;

pub use backoff::publish_backoff;
pub use publisher::{EventPublisher, KafkaPublisher};
pub use relay::{Relay, RowOutcome};

use anyhow::Result;
use polis_config::RelayConfig;
use serde_json::json;
use sqlx::PgPool;

/// Readiness probe for `--check`: DB reachable, broker TCP-reachable, and the
/// current unpublished backlog. Exit-code contract: ready iff both are up.
pub async fn readiness(pool: &PgPool, cfg: &RelayConfig, owner: &str) -> Result<(serde_json::Value, bool)> {
    let db = polis_db::status(pool).await?;
    let pending = polis_db::pending_count(pool).await?;
    let kafka_ok = cfg.kafka.tcp_ping(std::time::Duration::from_secs(1));

    let ready = db.ok && kafka_ok;
    let report = json!({
        "ok": ready,
        "db": if db.ok { "ok" } else { "fail" },
        "kafka": if kafka_ok { "ok" } else { "fail" },
        "kafka_bootstrap": cfg.kafka.bootstrap,
        "topic": cfg.kafka.topic,
        "dlq_topic": cfg.kafka.dlq_topic,
        "outbox_pending": pending,
        "owner": owner,
        "time_utc": chrono::Utc::now(),
    });

    Ok((report, ready))
}
