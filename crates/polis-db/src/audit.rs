//! Append-only audit trail. One row per command occurrence; retries append
//! again (the outbox, not the audit, is the deduplicated record).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub game_id: Uuid,
    pub chat_id: i64,
    pub actor_user_id: Option<i64>,
    pub action_type: String,
    pub phase_seq: Option<i32>,
    pub round_num: Option<i32>,
    pub payload: Value,
}

pub async fn insert_audit(tx: &mut Transaction<'_, Postgres>, ev: &NewAuditEntry) -> Result<()> {
    sqlx::query(
        r#"
        insert into game_audit_log
            (game_id, chat_id, actor_user_id, action_type, phase_seq, round_num, payload)
        values
            ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(ev.game_id)
    .bind(ev.chat_id)
    .bind(ev.actor_user_id)
    .bind(&ev.action_type)
    .bind(ev.phase_seq)
    .bind(ev.round_num)
    .bind(&ev.payload)
    .execute(&mut **tx)
    .await
    .context("insert_audit failed")?;

    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditRow {
    pub id: Uuid,
    pub game_id: Uuid,
    pub chat_id: i64,
    pub actor_user_id: Option<i64>,
    pub action_type: String,
    pub phase_seq: Option<i32>,
    pub round_num: Option<i32>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

pub async fn recent_audit_by_chat(
    pool: &PgPool,
    chat_id: i64,
    limit: i64,
) -> Result<Vec<AuditRow>> {
    let rows = sqlx::query(
        r#"
        select id, game_id, chat_id, actor_user_id, action_type,
               phase_seq, round_num, payload, created_at
        from game_audit_log
        where chat_id = $1
        order by created_at desc
        limit $2
        "#,
    )
    .bind(chat_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("recent_audit_by_chat failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(AuditRow {
            id: row.try_get("id")?,
            game_id: row.try_get("game_id")?,
            chat_id: row.try_get("chat_id")?,
            actor_user_id: row.try_get("actor_user_id")?,
            action_type: row.try_get("action_type")?,
            phase_seq: row.try_get("phase_seq")?,
            round_num: row.try_get("round_num")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(out)
}
