//! Consumer-side dedup log. At-least-once delivery from the broker becomes
//! effectively-exactly-once because the read-model write and this insert
//! share one transaction, keyed on the globally unique event_id.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewConsumedEvent {
    pub event_id: Uuid,
    pub topic: String,
    pub partition: i32,
    pub kafka_offset: i64,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<Uuid>,
    pub event_type: Option<String>,
}

/// Conflict-ignore insert; returns false when the event was already recorded
/// (a concurrent or earlier delivery won).
pub async fn insert_consumed(
    tx: &mut Transaction<'_, Postgres>,
    ev: &NewConsumedEvent,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into consumed_events
            (event_id, topic, partition, kafka_offset, aggregate_type, aggregate_id, event_type)
        values
            ($1, $2, $3, $4, $5, $6, $7)
        on conflict (event_id) do nothing
        returning id
        "#,
    )
    .bind(ev.event_id)
    .bind(&ev.topic)
    .bind(ev.partition)
    .bind(ev.kafka_offset)
    .bind(&ev.aggregate_type)
    .bind(ev.aggregate_id)
    .bind(&ev.event_type)
    .fetch_optional(&mut **tx)
    .await
    .context("insert_consumed failed")?;

    Ok(row.is_some())
}

pub async fn already_consumed(pool: &PgPool, event_id: Uuid) -> Result<bool> {
    let row: Option<(i32,)> = sqlx::query_as(
        r#"
        select 1
        from consumed_events
        where event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("already_consumed failed")?;

    Ok(row.is_some())
}

#[derive(Debug, Clone)]
pub struct ConsumedRow {
    pub event_id: Uuid,
    pub topic: String,
    pub partition: i32,
    pub kafka_offset: i64,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub consumed_at: DateTime<Utc>,
}

pub async fn fetch_consumed(pool: &PgPool, event_id: Uuid) -> Result<Option<ConsumedRow>> {
    let row = sqlx::query(
        r#"
        select event_id, topic, partition, kafka_offset,
               aggregate_type, aggregate_id, event_type, consumed_at
        from consumed_events
        where event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("fetch_consumed failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(ConsumedRow {
        event_id: row.try_get("event_id")?,
        topic: row.try_get("topic")?,
        partition: row.try_get("partition")?,
        kafka_offset: row.try_get("kafka_offset")?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        consumed_at: row.try_get("consumed_at")?,
    }))
}
