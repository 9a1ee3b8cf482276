//! Ready marks for the current phase.
//!
//! Freshness (mark's phase_seq == session's phase_seq, player alive) is
//! checked by the command handler inside the same transaction that wrote the
//! session row; the table only enforces one mark per (game, player, phase).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// Insert a ready mark; returns false when the player already confirmed this
/// phase (conflict-ignore on the per-phase uniqueness).
pub async fn mark_ready(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    player_id: Uuid,
    phase_seq: i32,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into game_phase_ready (game_id, player_id, phase_seq)
        values ($1, $2, $3)
        on conflict (game_id, player_id, phase_seq) do nothing
        returning id
        "#,
    )
    .bind(game_id)
    .bind(player_id)
    .bind(phase_seq)
    .fetch_optional(&mut **tx)
    .await
    .context("mark_ready failed")?;

    Ok(row.is_some())
}

/// Ready marks at a phase, counting only live players. Same join as the
/// read-model recompute uses, so command output and view never disagree.
pub async fn count_ready(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    phase_seq: i32,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from game_phase_ready r
        join game_players p on p.id = r.player_id
        where r.game_id = $1
          and r.phase_seq = $2
          and p.is_active is true
          and p.is_afk is false
        "#,
    )
    .bind(game_id)
    .bind(phase_seq)
    .fetch_one(&mut **tx)
    .await
    .context("count_ready failed")?;

    Ok(n)
}

/// Clear every ready mark for a session. Called on any change of phase_seq or
/// current_phase, in the same transaction.
pub async fn delete_ready_for_game(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
) -> Result<u64> {
    let res = sqlx::query(
        r#"
        delete from game_phase_ready
        where game_id = $1
        "#,
    )
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .context("delete_ready_for_game failed")?;

    Ok(res.rows_affected())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadyEntry {
    pub ready_id: Uuid,
    pub ready_at: DateTime<Utc>,
    pub player_id: Uuid,
    pub user_id: i64,
    pub country_code: String,
}

/// Who is ready in the current phase of the chat's session (admin view).
pub async fn list_ready_current(pool: &PgPool, game_id: Uuid, phase_seq: i32) -> Result<Vec<ReadyEntry>> {
    let rows = sqlx::query(
        r#"
        select
            r.id as ready_id,
            r.ready_at,
            p.id as player_id,
            p.user_id,
            p.country_code
        from game_phase_ready r
        join game_players p on p.id = r.player_id
        where r.game_id = $1
          and r.phase_seq = $2
          and p.is_active is true
          and p.is_afk is false
        order by r.ready_at asc
        "#,
    )
    .bind(game_id)
    .bind(phase_seq)
    .fetch_all(pool)
    .await
    .context("list_ready_current failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(ReadyEntry {
            ready_id: row.try_get("ready_id")?,
            ready_at: row.try_get("ready_at")?,
            player_id: row.try_get("player_id")?,
            user_id: row.try_get("user_id")?,
            country_code: row.try_get("country_code")?,
        });
    }
    Ok(out)
}
