//! Outbox rows and the relay's reserve/finalize SQL.
//!
//! Row states: new → processing → sent | dead, with processing falling back
//! to new on retry, DLQ failure, or lease expiry. Finalize updates are guarded
//! by `status = 'processing' AND lock_owner = $owner`: a relay that lost its
//! lease performs a no-op and the reclaiming relay republishes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use polis_events::{requires_idempotency_key, EmitError, GameEvent, AGGREGATE_GAME_SESSION};

/// last_error is operator-facing; anything longer than this is noise.
const MAX_ERROR_LEN: usize = 4000;

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub publish_attempts: i32,
    pub last_error: Option<String>,
    pub status: String,
    pub locked_until: Option<DateTime<Utc>>,
    pub lock_owner: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

const OUTBOX_COLUMNS: &str = r#"
    id, event_type, aggregate_type, aggregate_id, payload, idempotency_key,
    created_at, published_at, publish_attempts, last_error, status,
    locked_until, lock_owner, next_retry_at
"#;

fn row_to_outbox(row: &sqlx::postgres::PgRow) -> Result<OutboxRow> {
    Ok(OutboxRow {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        payload: row.try_get("payload")?,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
        publish_attempts: row.try_get("publish_attempts")?,
        last_error: row.try_get("last_error")?,
        status: row.try_get("status")?,
        locked_until: row.try_get("locked_until")?,
        lock_owner: row.try_get("lock_owner")?,
        next_retry_at: row.try_get("next_retry_at")?,
    })
}

/// Queue a catalog event for a session within the caller's transaction.
///
/// Idempotent behavior:
/// - The key is derived from the event (`phase.changed:<sid>:<seq>`, ...).
/// - If the key already exists, returns Ok(false) and no second row is created,
///   so command retries cannot double-emit.
pub async fn emit(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    event: &GameEvent,
) -> Result<bool> {
    let key = event.idempotency_key(game_id);
    emit_raw(
        tx,
        event.event_type(),
        AGGREGATE_GAME_SESSION,
        game_id,
        &event.payload_json(),
        Some(&key),
    )
    .await
}

/// Low-level emission for event types outside the closed catalog (admin.*
/// probes, migration backfills). Enforces the required-idempotency-key set.
pub async fn emit_raw(
    tx: &mut Transaction<'_, Postgres>,
    event_type: &str,
    aggregate_type: &str,
    aggregate_id: Uuid,
    payload: &Value,
    idempotency_key: Option<&str>,
) -> Result<bool> {
    if requires_idempotency_key(event_type) && idempotency_key.is_none() {
        return Err(EmitError::MissingIdempotencyKey(event_type.to_string()).into());
    }

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into outbox_events
            (event_type, aggregate_type, aggregate_id, payload, idempotency_key)
        values
            ($1, $2, $3, $4, $5)
        on conflict (idempotency_key)
        where idempotency_key is not null
        do nothing
        returning id
        "#,
    )
    .bind(event_type)
    .bind(aggregate_type)
    .bind(aggregate_id)
    .bind(payload)
    .bind(idempotency_key)
    .fetch_optional(&mut **tx)
    .await
    .context("emit_raw failed")?;

    Ok(row.is_some())
}

/// Reset expired leases back to `new` so a crashed relay cannot freeze events.
/// Returns the number of reclaimed rows.
pub async fn reclaim_expired(pool: &PgPool) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update outbox_events
        set status = 'new',
            locked_until = null,
            lock_owner = null
        where status = 'processing'
          and locked_until is not null
          and locked_until < now()
        "#,
    )
    .execute(pool)
    .await
    .context("reclaim_expired failed")?;

    Ok(res.rows_affected())
}

/// Atomically lease up to `limit` ready rows for this relay instance.
///
/// Ready: unpublished, status new, retry timer elapsed (or never set), oldest
/// first. `FOR UPDATE SKIP LOCKED` lets concurrent relays reserve disjoint
/// batches; no row is ever handed out twice.
pub async fn reserve_batch(
    pool: &PgPool,
    limit: i64,
    lock_ttl_secs: i64,
    owner: &str,
) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(&format!(
        r#"
        with picked as (
            select id
            from outbox_events
            where published_at is null
              and status = 'new'
              and (next_retry_at is null or next_retry_at <= now())
            order by created_at asc
            limit $1
            for update skip locked
        )
        update outbox_events o
        set status = 'processing',
            locked_until = now() + ($2 || ' seconds')::interval,
            lock_owner = $3
        from picked
        where o.id = picked.id
        returning {OUTBOX_COLUMNS}
        "#
    ))
    .bind(limit)
    .bind(lock_ttl_secs.to_string())
    .bind(owner)
    .fetch_all(pool)
    .await
    .context("reserve_batch failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(row_to_outbox(row)?);
    }
    // Publish order within the batch must follow created_at; RETURNING does
    // not guarantee it.
    out.sort_by_key(|r| r.created_at);
    Ok(out)
}

/// processing → sent. No-op (false) when the lease is no longer ours.
pub async fn mark_sent(pool: &PgPool, id: Uuid, owner: &str) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update outbox_events
        set status = 'sent',
            published_at = now(),
            last_error = null,
            locked_until = null,
            lock_owner = null,
            next_retry_at = null
        where id = $1
          and status = 'processing'
          and lock_owner = $2
        returning id
        "#,
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(pool)
    .await
    .context("mark_sent failed")?;

    Ok(row.is_some())
}

/// processing → new with a retry timer. No-op (false) when the lease is no
/// longer ours.
pub async fn mark_retry(
    pool: &PgPool,
    id: Uuid,
    owner: &str,
    err: &str,
    delay_secs: i64,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update outbox_events
        set status = 'new',
            publish_attempts = publish_attempts + 1,
            last_error = $3,
            next_retry_at = now() + ($4 || ' seconds')::interval,
            locked_until = null,
            lock_owner = null
        where id = $1
          and status = 'processing'
          and lock_owner = $2
        returning id
        "#,
    )
    .bind(id)
    .bind(owner)
    .bind(truncate_error(err))
    .bind(delay_secs.to_string())
    .fetch_optional(pool)
    .await
    .context("mark_retry failed")?;

    Ok(row.is_some())
}

/// processing → dead (terminal). Only reachable after a successful DLQ
/// publish; a failed DLQ publish must go through `mark_retry` instead.
pub async fn mark_dead(pool: &PgPool, id: Uuid, owner: &str, err: &str) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update outbox_events
        set status = 'dead',
            published_at = now(),
            publish_attempts = publish_attempts + 1,
            last_error = $3,
            locked_until = null,
            lock_owner = null,
            next_retry_at = null
        where id = $1
          and status = 'processing'
          and lock_owner = $2
        returning id
        "#,
    )
    .bind(id)
    .bind(owner)
    .bind(truncate_error(err))
    .fetch_optional(pool)
    .await
    .context("mark_dead failed")?;

    Ok(row.is_some())
}

fn truncate_error(err: &str) -> String {
    if err.len() <= MAX_ERROR_LEN {
        return err.to_string();
    }
    err.chars().take(MAX_ERROR_LEN).collect()
}

/// Unpublished backlog size (new + processing), for readiness checks.
pub async fn pending_count(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from outbox_events
        where published_at is null
          and status in ('new','processing')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("pending_count failed")?;

    Ok(n)
}

pub async fn fetch_outbox_row(pool: &PgPool, id: Uuid) -> Result<Option<OutboxRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {OUTBOX_COLUMNS}
        from outbox_events
        where id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_outbox_row failed")?;

    row.as_ref().map(row_to_outbox).transpose()
}

pub async fn outbox_fetch_by_idempotency_key(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<Option<OutboxRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {OUTBOX_COLUMNS}
        from outbox_events
        where idempotency_key = $1
        "#
    ))
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_fetch_by_idempotency_key failed")?;

    row.as_ref().map(row_to_outbox).transpose()
}

/// Oldest-first unpublished rows (operator diagnostics).
pub async fn list_unpublished(pool: &PgPool, limit: i64) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {OUTBOX_COLUMNS}
        from outbox_events
        where published_at is null
        order by created_at asc
        limit $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_unpublished failed")?;

    rows.iter().map(row_to_outbox).collect()
}

/// Newest-first rows for one aggregate (operator diagnostics).
pub async fn list_outbox_by_aggregate(
    pool: &PgPool,
    aggregate_id: Uuid,
    limit: i64,
) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {OUTBOX_COLUMNS}
        from outbox_events
        where aggregate_type = $1
          and aggregate_id = $2
        order by created_at desc
        limit $3
        "#
    ))
    .bind(AGGREGATE_GAME_SESSION)
    .bind(aggregate_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_outbox_by_aggregate failed")?;

    rows.iter().map(row_to_outbox).collect()
}

/// Rows parked on the DLQ path (status dead), newest first.
pub async fn list_dead(pool: &PgPool, limit: i64) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {OUTBOX_COLUMNS}
        from outbox_events
        where status = 'dead'
        order by published_at desc nulls last
        limit $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_dead failed")?;

    rows.iter().map(row_to_outbox).collect()
}
