use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use polis_db::{
    archive_current_sessions, insert_audit, insert_session, NewAuditEntry, NewSession,
};
use polis_events::{GameArchived, GameCreated, GameEvent};

use crate::CommandOutcome;

/// Create a new lobby session for a chat.
///
/// Any session still in lobby/active for the chat is archived first, in the
/// same transaction, each with its own audit row and `game.archived` event;
/// otherwise the one-active-per-chat index would reject the insert.
pub async fn create_game(
    pool: &PgPool,
    chat_id: i64,
    owner_user_id: Option<i64>,
    afk_timeout_seconds: i32,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let replaced = archive_current_sessions(&mut tx, chat_id).await?;
    for old in &replaced {
        insert_audit(
            &mut tx,
            &NewAuditEntry {
                game_id: old.id,
                chat_id,
                actor_user_id: owner_user_id,
                action_type: "game.archived".to_string(),
                phase_seq: Some(old.phase_seq),
                round_num: Some(old.round_num),
                payload: json!({"replaced_on_create": true}),
            },
        )
        .await?;
        polis_db::emit(&mut tx, old.id, &GameEvent::GameArchived(GameArchived { chat_id }))
            .await?;
    }

    let session = insert_session(
        &mut tx,
        &NewSession {
            chat_id,
            owner_user_id,
            afk_timeout_seconds,
        },
    )
    .await?;

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id: owner_user_id,
            action_type: "game.created".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({"afk_timeout_seconds": afk_timeout_seconds}),
        },
    )
    .await?;

    polis_db::emit(
        &mut tx,
        session.id,
        &GameEvent::GameCreated(GameCreated {
            chat_id,
            owner: owner_user_id,
            status: session.status.as_str().to_string(),
            phase: session.current_phase.as_str().to_string(),
            phase_seq: session.phase_seq,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied(
        format!("game created, lobby open (replaced {})", replaced.len()),
        session.id,
    ))
}
