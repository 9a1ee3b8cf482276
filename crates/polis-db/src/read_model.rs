//! Per-chat read model. The consumer calls `recompute_read_model` for the
//! aggregate of every consumed event; the row is a pure projection of the
//! session, its players and the ready marks at the current phase, so the
//! recompute converges regardless of which event triggered it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadModelRow {
    pub chat_id: i64,
    pub game_id: Uuid,
    pub status: String,
    pub current_phase: String,
    pub phase_seq: i32,
    pub round_num: i32,
    pub phase_started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub owner_user_id: Option<i64>,
    pub players_total: i32,
    pub players_active: i32,
    pub ready_count: i32,
    pub ready_total: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    Upserted,
    /// Session row is gone; the read-model row (if any) was removed.
    Deleted,
}

/// Recompute the chat row for one session as a single upsert.
///
/// players_total = all players; players_active = active and not AFK;
/// ready_count = ready marks at the session's current phase_seq joined with
/// live players; ready_total = players_active.
pub async fn recompute_read_model(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
) -> Result<RecomputeOutcome> {
    let res = sqlx::query(
        r#"
        insert into game_read_model (
            chat_id, game_id, status, current_phase, phase_seq, round_num,
            phase_started_at, expires_at, owner_user_id,
            players_total, players_active, ready_count, ready_total, updated_at
        )
        select
            gs.chat_id, gs.id, gs.status, gs.current_phase, gs.phase_seq, gs.round_num,
            gs.phase_started_at, gs.expires_at, gs.owner_user_id,
            (select count(*)::int
               from game_players p
              where p.game_id = gs.id),
            (select count(*)::int
               from game_players p
              where p.game_id = gs.id
                and p.is_active is true
                and p.is_afk is false),
            (select count(*)::int
               from game_phase_ready r
               join game_players p on p.id = r.player_id
              where r.game_id = gs.id
                and r.phase_seq = gs.phase_seq
                and p.is_active is true
                and p.is_afk is false),
            (select count(*)::int
               from game_players p
              where p.game_id = gs.id
                and p.is_active is true
                and p.is_afk is false),
            now()
        from game_sessions gs
        where gs.id = $1
        on conflict (chat_id) do update set
            game_id = excluded.game_id,
            status = excluded.status,
            current_phase = excluded.current_phase,
            phase_seq = excluded.phase_seq,
            round_num = excluded.round_num,
            phase_started_at = excluded.phase_started_at,
            expires_at = excluded.expires_at,
            owner_user_id = excluded.owner_user_id,
            players_total = excluded.players_total,
            players_active = excluded.players_active,
            ready_count = excluded.ready_count,
            ready_total = excluded.ready_total,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .context("recompute_read_model upsert failed")?;

    if res.rows_affected() > 0 {
        return Ok(RecomputeOutcome::Upserted);
    }

    // Session deleted: drop the stale view row.
    sqlx::query(
        r#"
        delete from game_read_model
        where game_id = $1
        "#,
    )
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .context("recompute_read_model delete failed")?;

    Ok(RecomputeOutcome::Deleted)
}

pub async fn get_read_model_by_chat(pool: &PgPool, chat_id: i64) -> Result<Option<ReadModelRow>> {
    let row = sqlx::query(
        r#"
        select chat_id, game_id, status, current_phase, phase_seq, round_num,
               phase_started_at, expires_at, owner_user_id,
               players_total, players_active, ready_count, ready_total, updated_at
        from game_read_model
        where chat_id = $1
        "#,
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await
    .context("get_read_model_by_chat failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(ReadModelRow {
        chat_id: row.try_get("chat_id")?,
        game_id: row.try_get("game_id")?,
        status: row.try_get("status")?,
        current_phase: row.try_get("current_phase")?,
        phase_seq: row.try_get("phase_seq")?,
        round_num: row.try_get("round_num")?,
        phase_started_at: row.try_get("phase_started_at")?,
        expires_at: row.try_get("expires_at")?,
        owner_user_id: row.try_get("owner_user_id")?,
        players_total: row.try_get("players_total")?,
        players_active: row.try_get("players_active")?,
        ready_count: row.try_get("ready_count")?,
        ready_total: row.try_get("ready_total")?,
        updated_at: row.try_get("updated_at")?,
    }))
}
