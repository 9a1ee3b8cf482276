use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use polis_db::{
    count_active_players, count_ready, get_player, insert_audit, lock_current_session, mark_ready,
    NewAuditEntry, Phase,
};
use polis_events::{GameEvent, PlayerReadySet};

use crate::{CommandOutcome, NO_ACTIVE_GAME};

/// Confirm readiness for the current phase.
///
/// The session row lock pins phase_seq for the duration of the transaction,
/// so the stored mark is always fresh: a concurrent phase advance either
/// commits before us (we mark the new phase) or waits for us (and wipes the
/// mark we just wrote).
pub async fn set_ready(pool: &PgPool, chat_id: i64, user_id: i64) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    if session.current_phase == Phase::Finished {
        return Ok(CommandOutcome::rejected("the game is already over"));
    }

    let Some(player) = get_player(&mut tx, session.id, user_id).await? else {
        return Ok(CommandOutcome::rejected(
            "you are not in this game; join and pick a country first",
        ));
    };
    if !player.is_active || player.is_afk {
        return Ok(CommandOutcome::rejected(
            "inactive or AFK players cannot confirm readiness",
        ));
    }

    mark_ready(&mut tx, session.id, player.id, session.phase_seq).await?;

    let active = count_active_players(&mut tx, session.id).await?;
    let ready = count_ready(&mut tx, session.id, session.phase_seq).await?;

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id: Some(user_id),
            action_type: "player.ready_set".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({"player_id": player.id, "ready": ready, "total": active}),
        },
    )
    .await?;

    polis_db::emit(
        &mut tx,
        session.id,
        &GameEvent::PlayerReadySet(PlayerReadySet {
            chat_id,
            player_id: player.id,
            phase_seq: session.phase_seq,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied(
        format!("ready {ready}/{active}"),
        session.id,
    ))
}
