//! Append-only state snapshots, taken on demand from the read-model view.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

pub async fn insert_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    chat_id: i64,
    phase_seq: i32,
    round_num: i32,
    snapshot: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into game_state_snapshots (game_id, chat_id, phase_seq, round_num, snapshot)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(game_id)
    .bind(chat_id)
    .bind(phase_seq)
    .bind(round_num)
    .bind(snapshot)
    .execute(&mut **tx)
    .await
    .context("insert_snapshot failed")?;

    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotRow {
    pub game_id: Uuid,
    pub chat_id: i64,
    pub phase_seq: i32,
    pub round_num: i32,
    pub snapshot: Value,
    pub created_at: DateTime<Utc>,
}

pub async fn latest_snapshot_by_chat(pool: &PgPool, chat_id: i64) -> Result<Option<SnapshotRow>> {
    let row = sqlx::query(
        r#"
        select game_id, chat_id, phase_seq, round_num, snapshot, created_at
        from game_state_snapshots
        where chat_id = $1
        order by created_at desc
        limit 1
        "#,
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await
    .context("latest_snapshot_by_chat failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(SnapshotRow {
        game_id: row.try_get("game_id")?,
        chat_id: row.try_get("chat_id")?,
        phase_seq: row.try_get("phase_seq")?,
        round_num: row.try_get("round_num")?,
        snapshot: row.try_get("snapshot")?,
        created_at: row.try_get("created_at")?,
    }))
}
