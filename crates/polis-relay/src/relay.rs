//! The relay state machine.
//!
//! ```text
//! new ──reserve──▶ processing ──publish ok──▶ sent
//!   ▲                 │
//!   │                 ├── publish fail, attempts+1 < max ──▶ new (next_retry_at)
//!   │                 ├── publish fail, attempts+1 ≥ max, DLQ ok ──▶ dead
//!   │                 └── publish fail, attempts+1 ≥ max, DLQ fail ──▶ new
//!   └── lease expired ──────────────────────────────────────────────┘
//! ```
//!
//! A row reaches `dead` only after its augmented envelope landed on the DLQ
//! topic; a broker-wide outage therefore recycles rows instead of losing
//! them.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use polis_config::RelayConfig;
use polis_db::{mark_dead, mark_retry, mark_sent, reclaim_expired, reserve_batch, OutboxRow};
use polis_events::{AggregateRef, EventEnvelope, SCHEMA_VERSION};

use crate::backoff::publish_backoff;
use crate::publisher::EventPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Sent,
    Retried,
    Dead,
    /// Finalize found the lease gone: another relay reclaimed the row.
    /// Nothing to do; the reclaiming side republishes.
    LeaseLost,
}

pub struct Relay<P> {
    pool: PgPool,
    publisher: P,
    cfg: RelayConfig,
    owner: String,
}

impl<P: EventPublisher> Relay<P> {
    pub fn new(pool: PgPool, publisher: P, cfg: RelayConfig, owner: String) -> Self {
        Self {
            pool,
            publisher,
            cfg,
            owner,
        }
    }

    /// One polling cycle: reclaim expired leases, reserve a batch, publish
    /// and finalize each row. Returns the number of rows reserved so the
    /// caller can idle-sleep on an empty outbox.
    ///
    /// Per-row failures are finalized into the row itself (retry schedule);
    /// only reserve/reclaim infrastructure errors propagate.
    pub async fn run_cycle(&self) -> Result<usize> {
        let reclaimed = reclaim_expired(&self.pool).await?;
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed expired outbox leases");
        }

        let batch = reserve_batch(
            &self.pool,
            self.cfg.batch_size,
            self.cfg.lock_ttl_secs,
            &self.owner,
        )
        .await?;

        for row in &batch {
            match self.process_row(row).await {
                Ok(outcome) => {
                    debug!(event_id = %row.id, event_type = %row.event_type, ?outcome, "row finalized");
                }
                Err(e) => {
                    // DB trouble mid-finalize; the lease TTL will recycle the row.
                    error!(event_id = %row.id, error = ?e, "row processing failed");
                }
            }
        }

        Ok(batch.len())
    }

    /// Publish one reserved row and finalize it according to the outcome.
    pub async fn process_row(&self, row: &OutboxRow) -> Result<RowOutcome> {
        let attempt_next = row.publish_attempts + 1;
        let envelope = build_envelope(row);
        let key = envelope.partition_key();

        // Structurally broken envelopes never go to the main topic.
        if let Err(reason) = envelope.validate() {
            let err = format!("PermanentError: invalid envelope for outbox id={}: {reason}", row.id);
            warn!(event_id = %row.id, %reason, "envelope invalid, escalating to DLQ");
            return self.escalate_dlq(row, envelope, &key, attempt_next, &err).await;
        }

        let value = serde_json::to_value(&envelope).context("serialize envelope")?;
        match self.publisher.publish(&self.cfg.kafka.topic, &key, &value).await {
            Ok(()) => {
                if mark_sent(&self.pool, row.id, &self.owner).await? {
                    Ok(RowOutcome::Sent)
                } else {
                    Ok(RowOutcome::LeaseLost)
                }
            }
            Err(e) => {
                let err = format!("{e:#}");
                if attempt_next >= self.cfg.max_attempts {
                    self.escalate_dlq(row, envelope, &key, attempt_next, &err).await
                } else {
                    let delay = publish_backoff(attempt_next).as_secs() as i64;
                    warn!(
                        event_id = %row.id,
                        attempt = attempt_next,
                        delay_secs = delay,
                        error = %err,
                        "publish failed, scheduling retry"
                    );
                    if mark_retry(&self.pool, row.id, &self.owner, &err, delay).await? {
                        Ok(RowOutcome::Retried)
                    } else {
                        Ok(RowOutcome::LeaseLost)
                    }
                }
            }
        }
    }

    /// Attempts have run out (or the envelope is invalid): try the DLQ.
    /// DLQ success parks the row as dead; DLQ failure recycles it. A row
    /// must never become dead without a matching DLQ record.
    async fn escalate_dlq(
        &self,
        row: &OutboxRow,
        envelope: EventEnvelope,
        key: &str,
        attempt_next: i32,
        err: &str,
    ) -> Result<RowOutcome> {
        let dlq_envelope = envelope.with_dlq(attempt_next, err);
        let value = serde_json::to_value(&dlq_envelope).context("serialize dlq envelope")?;

        match self.publisher.publish(&self.cfg.kafka.dlq_topic, key, &value).await {
            Ok(()) => {
                warn!(event_id = %row.id, attempts = attempt_next, "event parked on DLQ");
                if mark_dead(&self.pool, row.id, &self.owner, &format!("DLQ: {err}")).await? {
                    Ok(RowOutcome::Dead)
                } else {
                    Ok(RowOutcome::LeaseLost)
                }
            }
            Err(e2) => {
                let delay = publish_backoff(attempt_next).as_secs() as i64;
                let combined = format!("DLQ failed: {e2:#}; original: {err}");
                warn!(
                    event_id = %row.id,
                    delay_secs = delay,
                    error = %combined,
                    "DLQ publish failed, recycling row"
                );
                if mark_retry(&self.pool, row.id, &self.owner, &combined, delay).await? {
                    Ok(RowOutcome::Retried)
                } else {
                    Ok(RowOutcome::LeaseLost)
                }
            }
        }
    }
}

/// Project an outbox row onto the wire envelope. Field names are contract;
/// see the envelope type itself.
pub fn build_envelope(row: &OutboxRow) -> EventEnvelope {
    EventEnvelope {
        schema_version: SCHEMA_VERSION,
        event_id: row.id,
        event_type: row.event_type.clone(),
        aggregate: AggregateRef {
            kind: row.aggregate_type.clone(),
            id: row.aggregate_id,
        },
        idempotency_key: row.idempotency_key.clone(),
        created_at: row.created_at,
        payload: row.payload.clone(),
        dlq: None,
    }
}
