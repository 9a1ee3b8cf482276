use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use polis_db::{
    count_active_players, count_ready, insert_audit, insert_snapshot, lock_current_session,
    NewAuditEntry,
};
use polis_events::{GameEvent, SnapshotCreated};

use crate::{CommandOutcome, NO_ACTIVE_GAME};

/// Capture an operational snapshot of the session at its current phase.
///
/// Snapshots append on every call; the outbox event dedupes per
/// (session, phase_seq, round), so repeating the command inside one phase
/// emits once.
pub async fn snapshot_game(
    pool: &PgPool,
    chat_id: i64,
    actor_user_id: Option<i64>,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    let active = count_active_players(&mut tx, session.id).await?;
    let ready = count_ready(&mut tx, session.id, session.phase_seq).await?;

    // Built from the locked aggregate row, not the eventually-consistent view.
    let state = json!({
        "game_id": session.id,
        "chat_id": chat_id,
        "status": session.status.as_str(),
        "current_phase": session.current_phase.as_str(),
        "phase_seq": session.phase_seq,
        "round_num": session.round_num,
        "players_active": active,
        "ready_count": ready,
        "owner_user_id": session.owner_user_id,
    });

    insert_snapshot(
        &mut tx,
        session.id,
        chat_id,
        session.phase_seq,
        session.round_num,
        &state,
    )
    .await?;

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id,
            action_type: "snapshot.created".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({}),
        },
    )
    .await?;

    polis_db::emit(
        &mut tx,
        session.id,
        &GameEvent::SnapshotCreated(SnapshotCreated {
            chat_id,
            phase_seq: session.phase_seq,
            round_num: session.round_num,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied("snapshot stored", session.id))
}
