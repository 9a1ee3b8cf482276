//! Record processing: permissive parse → dedup → transactional apply →
//! bounded retries → dead-letter.
//!
//! The caller commits the broker offset after ANY Ok outcome, including
//! `DeadLettered`, whose mark-consumed step is what prevents a poison
//! message from looping forever. An Err means the record was neither applied
//! nor dead-lettered; the offset stays uncommitted and the broker redelivers.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use polis_config::ConsumerConfig;
use polis_db::{already_consumed, insert_consumed, recompute_read_model, NewConsumedEvent};
use polis_events::{is_materialized, ConsumerDlqMessage, SourceRef};

use crate::sink::DlqSink;

/// Broker coordinates of one record.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Read model recomputed and the event recorded as consumed.
    Applied,
    /// Event id already in the ledger; nothing changed.
    Dedup,
    /// Malformed or irrelevant record; not recorded, safe to commit past.
    Skipped,
    /// Retries exhausted; context shipped to the DLQ and the event id
    /// recorded (as `DLQ:<type>`) so redeliveries dedup.
    DeadLettered,
}

/// Retry delay: base doubling per 1-based attempt, capped at 2 seconds.
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    const CAP: Duration = Duration::from_secs(2);
    let attempt = attempt.max(1);
    let delay = base.saturating_mul(1u32 << (attempt - 1).min(16));
    delay.min(CAP)
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub ok: AtomicU64,
    pub dedup: AtomicU64,
    pub skipped: AtomicU64,
    pub dlq: AtomicU64,
    pub errors: AtomicU64,
}

impl Metrics {
    pub fn summary(&self) -> String {
        format!(
            "ok={} dedup={} skipped={} dlq={} errors={}",
            self.ok.load(Ordering::Relaxed),
            self.dedup.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.dlq.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }

    fn count(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Applied => &self.ok,
            Outcome::Dedup => &self.dedup,
            Outcome::Skipped => &self.skipped,
            Outcome::DeadLettered => &self.dlq,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct EventProcessor<S> {
    pool: PgPool,
    dlq: S,
    cfg: ConsumerConfig,
    pub metrics: Metrics,
}

/// Fields pulled out of a record that passed the permissive parse.
struct ParsedRecord {
    event_id: Uuid,
    event_type: String,
    aggregate_type: Option<String>,
    aggregate_id: Uuid,
    message: serde_json::Value,
}

impl<S: DlqSink> EventProcessor<S> {
    pub fn new(pool: PgPool, dlq: S, cfg: ConsumerConfig) -> Self {
        Self {
            pool,
            dlq,
            cfg,
            metrics: Metrics::default(),
        }
    }

    /// Process one delivered record through parse → dedup → apply/retry.
    pub async fn handle_record(&self, meta: &RecordMeta, payload: Option<&[u8]>) -> Result<Outcome> {
        let outcome = self.handle_inner(meta, payload).await?;
        self.metrics.count(outcome);
        Ok(outcome)
    }

    async fn handle_inner(&self, meta: &RecordMeta, payload: Option<&[u8]>) -> Result<Outcome> {
        // Tombstones, garbage bytes, unknown shapes: count and move on.
        // A malformed record can never become consumable, so blocking the
        // partition on it would be pure harm.
        let Some(parsed) = parse_record(payload) else {
            debug!(topic = %meta.topic, offset = meta.offset, "skipping malformed record");
            return Ok(Outcome::Skipped);
        };

        if !is_materialized(&parsed.event_type) {
            return Ok(Outcome::Skipped);
        }

        if already_consumed(&self.pool, parsed.event_id).await? {
            return Ok(Outcome::Dedup);
        }

        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 1..=self.cfg.max_attempts {
            match self.apply(meta, &parsed).await {
                Ok(applied) => {
                    return Ok(if applied { Outcome::Applied } else { Outcome::Dedup });
                }
                Err(e) => {
                    self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_id = %parsed.event_id,
                        attempt,
                        error = ?e,
                        "apply failed"
                    );
                    last_err = Some(e);
                    if attempt < self.cfg.max_attempts {
                        tokio::time::sleep(retry_backoff(self.cfg.base_backoff(), attempt)).await;
                    }
                }
            }
        }

        let err = last_err.expect("retry loop leaves an error");
        self.dead_letter(meta, &parsed, &err).await?;
        Ok(Outcome::DeadLettered)
    }

    /// One transaction: recompute the aggregate's read-model row and record
    /// the event as consumed. Returns false when a concurrent consumer won
    /// the ledger race (its recompute already covers this state).
    async fn apply(&self, meta: &RecordMeta, parsed: &ParsedRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("begin apply tx")?;

        recompute_read_model(&mut tx, parsed.aggregate_id).await?;

        let inserted = insert_consumed(
            &mut tx,
            &NewConsumedEvent {
                event_id: parsed.event_id,
                topic: meta.topic.clone(),
                partition: meta.partition,
                kafka_offset: meta.offset,
                aggregate_type: parsed.aggregate_type.clone(),
                aggregate_id: Some(parsed.aggregate_id),
                event_type: Some(parsed.event_type.clone()),
            },
        )
        .await?;

        tx.commit().await.context("commit apply tx")?;
        Ok(inserted)
    }

    /// Retries exhausted: ship full context to the DLQ, then record the event
    /// id with a `DLQ:` type prefix so the next redelivery dedups instead of
    /// looping. Propagates an error if the DLQ itself is down; the offset
    /// must not be committed in that case.
    async fn dead_letter(
        &self,
        meta: &RecordMeta,
        parsed: &ParsedRecord,
        err: &anyhow::Error,
    ) -> Result<()> {
        error!(
            event_id = %parsed.event_id,
            event_type = %parsed.event_type,
            attempts = self.cfg.max_attempts,
            error = ?err,
            "retries exhausted, dead-lettering"
        );

        let msg = ConsumerDlqMessage {
            dlq_version: 1,
            reason: "processing_failed".to_string(),
            failed_at: Utc::now(),
            attempt: self.cfg.max_attempts,
            error: format!("{err:#}"),
            src: SourceRef {
                topic: meta.topic.clone(),
                partition: meta.partition,
                offset: meta.offset,
                key: meta.key.clone(),
            },
            message: Some(parsed.message.clone()),
        };
        self.dlq.send(meta.key.as_deref(), &msg).await?;

        let mut tx = self.pool.begin().await.context("begin dlq-mark tx")?;
        insert_consumed(
            &mut tx,
            &NewConsumedEvent {
                event_id: parsed.event_id,
                topic: meta.topic.clone(),
                partition: meta.partition,
                kafka_offset: meta.offset,
                aggregate_type: parsed.aggregate_type.clone(),
                aggregate_id: Some(parsed.aggregate_id),
                event_type: Some(format!("DLQ:{}", parsed.event_type)),
            },
        )
        .await?;
        tx.commit().await.context("commit dlq-mark tx")?;

        Ok(())
    }
}

/// Permissive envelope extraction. Returns None for anything that cannot be
/// a processable event: no payload, invalid JSON, missing/invalid ids.
fn parse_record(payload: Option<&[u8]>) -> Option<ParsedRecord> {
    let bytes = payload?;
    if bytes.is_empty() {
        return None;
    }

    let message: serde_json::Value = serde_json::from_slice(bytes).ok()?;

    let event_type = message.get("type")?.as_str()?.to_string();
    let event_id = Uuid::parse_str(message.get("event_id")?.as_str()?).ok()?;
    let aggregate = message.get("aggregate")?;
    let aggregate_id = Uuid::parse_str(aggregate.get("id")?.as_str()?).ok()?;
    let aggregate_type = aggregate
        .get("type")
        .and_then(|t| t.as_str())
        .map(str::to_string);

    Some(ParsedRecord {
        event_id,
        event_type,
        aggregate_type,
        aggregate_id,
        message,
    })
}
