//! Read-only operator views over the read model, the audit trail and the
//! outbox. This is the whole admin contract: queries, no mutations; the
//! pipeline is observed here, never driven from here.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub use polis_db::{AuditRow, ReadModelRow, ReadyEntry, SnapshotRow};

/// Current game view for a chat, straight from the read model.
pub async fn current_game_by_chat(pool: &PgPool, chat_id: i64) -> Result<Option<ReadModelRow>> {
    polis_db::get_read_model_by_chat(pool, chat_id).await
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadySummary {
    pub chat_id: i64,
    pub game_id: Uuid,
    pub phase_seq: i32,
    pub ready_count: i32,
    pub ready_total: i32,
    pub entries: Vec<ReadyEntry>,
}

/// Who is ready in the chat's current phase. None when the chat has no
/// materialized game.
pub async fn ready_status(pool: &PgPool, chat_id: i64) -> Result<Option<ReadySummary>> {
    let Some(rm) = polis_db::get_read_model_by_chat(pool, chat_id).await? else {
        return Ok(None);
    };

    let entries = polis_db::list_ready_current(pool, rm.game_id, rm.phase_seq).await?;

    Ok(Some(ReadySummary {
        chat_id,
        game_id: rm.game_id,
        phase_seq: rm.phase_seq,
        ready_count: rm.ready_count,
        ready_total: rm.ready_total,
        entries,
    }))
}

/// Serializable projection of an outbox row for operator output.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxItem {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub idempotency_key: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub publish_attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub payload: Value,
}

impl From<polis_db::OutboxRow> for OutboxItem {
    fn from(r: polis_db::OutboxRow) -> Self {
        OutboxItem {
            id: r.id,
            event_type: r.event_type,
            aggregate_id: r.aggregate_id,
            idempotency_key: r.idempotency_key,
            status: r.status,
            created_at: r.created_at,
            published_at: r.published_at,
            publish_attempts: r.publish_attempts,
            last_error: r.last_error,
            next_retry_at: r.next_retry_at,
            payload: r.payload,
        }
    }
}

/// Oldest unpublished events: the relay's backlog as the operator sees it.
pub async fn outbox_unpublished(pool: &PgPool, limit: i64) -> Result<Vec<OutboxItem>> {
    let rows = polis_db::list_unpublished(pool, limit).await?;
    Ok(rows.into_iter().map(OutboxItem::from).collect())
}

/// Outbox history for the chat's current game, newest first.
pub async fn outbox_by_chat(
    pool: &PgPool,
    chat_id: i64,
    limit: i64,
) -> Result<Option<(Uuid, Vec<OutboxItem>)>> {
    let Some(rm) = polis_db::get_read_model_by_chat(pool, chat_id).await? else {
        return Ok(None);
    };
    let rows = polis_db::list_outbox_by_aggregate(pool, rm.game_id, limit).await?;
    Ok(Some((
        rm.game_id,
        rows.into_iter().map(OutboxItem::from).collect(),
    )))
}

/// Events parked on the dead-letter path; each of these has a DLQ record.
pub async fn outbox_dead(pool: &PgPool, limit: i64) -> Result<Vec<OutboxItem>> {
    let rows = polis_db::list_dead(pool, limit).await?;
    Ok(rows.into_iter().map(OutboxItem::from).collect())
}

pub async fn audit_by_chat(pool: &PgPool, chat_id: i64, limit: i64) -> Result<Vec<AuditRow>> {
    polis_db::recent_audit_by_chat(pool, chat_id, limit).await
}

pub async fn latest_snapshot(pool: &PgPool, chat_id: i64) -> Result<Option<SnapshotRow>> {
    polis_db::latest_snapshot_by_chat(pool, chat_id).await
}
