use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use polis_db::{insert_audit, insert_player, lock_current_session, NewAuditEntry, Phase, PlayerInsert};
use polis_events::{GameEvent, PlayerJoined};

use crate::{CommandOutcome, NO_ACTIVE_GAME};

/// Join the chat's current session and claim a country. Lobby only; one seat
/// per user, one seat per country.
pub async fn join_game(
    pool: &PgPool,
    chat_id: i64,
    user_id: i64,
    country_code: &str,
    country_name: &str,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    if session.current_phase != Phase::Lobby {
        return Ok(CommandOutcome::rejected(
            "joining is only possible while the lobby is open",
        ));
    }

    let player = match insert_player(&mut tx, session.id, user_id, country_code, country_name).await? {
        PlayerInsert::Inserted(p) => p,
        PlayerInsert::DuplicateUser => {
            return Ok(CommandOutcome::rejected("you are already in this game"));
        }
        PlayerInsert::DuplicateCountry => {
            return Ok(CommandOutcome::rejected(format!(
                "country {country_code} is already taken"
            )));
        }
    };

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id: Some(user_id),
            action_type: "player.joined".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({
                "player_id": player.id,
                "country_code": country_code,
                "country_name": country_name,
            }),
        },
    )
    .await?;

    polis_db::emit(
        &mut tx,
        session.id,
        &GameEvent::PlayerJoined(PlayerJoined {
            player_id: player.id,
            user_id,
            country_code: country_code.to_string(),
            country_name: country_name.to_string(),
            chat_id,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied(
        format!("joined as {country_name}"),
        session.id,
    ))
}
