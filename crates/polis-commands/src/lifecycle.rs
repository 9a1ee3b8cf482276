use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use polis_db::{
    archive_session, delete_ready_for_game, finish_session, insert_audit, lock_current_session,
    set_player_afk, NewAuditEntry,
};
use polis_events::{GameArchived, GameEvent, GameFinished};

use crate::{CommandOutcome, NO_ACTIVE_GAME};

/// Terminate the game: status and phase both become `finished`. The phase
/// change wipes the ready marks like any other transition.
pub async fn finish_game(
    pool: &PgPool,
    chat_id: i64,
    actor_user_id: Option<i64>,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    finish_session(&mut tx, session.id).await?;
    delete_ready_for_game(&mut tx, session.id).await?;

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id,
            action_type: "game.finished".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({}),
        },
    )
    .await?;

    polis_db::emit(&mut tx, session.id, &GameEvent::GameFinished(GameFinished { chat_id }))
        .await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied("game finished", session.id))
}

/// Park the game without a result (admin action). The session stops counting
/// against the one-active-per-chat limit.
pub async fn archive_game(
    pool: &PgPool,
    chat_id: i64,
    actor_user_id: Option<i64>,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    archive_session(&mut tx, session.id).await?;

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id,
            action_type: "game.archived".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({}),
        },
    )
    .await?;

    polis_db::emit(&mut tx, session.id, &GameEvent::GameArchived(GameArchived { chat_id }))
        .await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied("game archived", session.id))
}

/// Flip a player's AFK flag. Audited but not emitted: the flag only matters
/// through the counts of later materialized events.
pub async fn mark_afk(
    pool: &PgPool,
    chat_id: i64,
    user_id: i64,
    afk: bool,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    if !set_player_afk(&mut tx, session.id, user_id, afk).await? {
        return Ok(CommandOutcome::rejected("player is not in this game"));
    }

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id: Some(user_id),
            action_type: "player.afk_set".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({"afk": afk}),
        },
    )
    .await?;

    tx.commit().await?;

    let state = if afk { "AFK" } else { "back" };
    Ok(CommandOutcome::applied(
        format!("player {user_id} is {state}"),
        session.id,
    ))
}
