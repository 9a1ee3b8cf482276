use anyhow::Result;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

use polis_db::{
    count_active_players, count_ready, delete_ready_for_game, insert_audit, lock_current_session,
    set_phase, set_round, set_status_active, NewAuditEntry, Phase, SessionRow,
};
use polis_events::{GameEvent, PhaseChanged, RoundStarted};

use crate::{CommandOutcome, NO_ACTIVE_GAME};

/// Fixed round rotation. Leaving the lobby or closing a resolve both enter
/// `income` and open a new round; `finished` is reachable only through the
/// finish command.
pub fn next_phase(current: Phase) -> Option<(Phase, bool)> {
    match current {
        Phase::Lobby => Some((Phase::Income, true)),
        Phase::Income => Some((Phase::Event, false)),
        Phase::Event => Some((Phase::WorldArena, false)),
        Phase::WorldArena => Some((Phase::Negotiations, false)),
        Phase::Negotiations => Some((Phase::Orders, false)),
        Phase::Orders => Some((Phase::Resolve, false)),
        Phase::Resolve => Some((Phase::Income, true)),
        Phase::Finished => None,
    }
}

/// Advance the session to the next phase.
///
/// Without `force`, every active non-AFK player must hold a ready mark for
/// the current phase. phase_seq increments by exactly 1, all ready marks are
/// wiped, and a round-opening transition additionally bumps round_num and
/// emits `round.started`.
pub async fn advance_phase(
    pool: &PgPool,
    chat_id: i64,
    actor_user_id: Option<i64>,
    force: bool,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    let active = count_active_players(&mut tx, session.id).await?;
    if active == 0 {
        return Ok(CommandOutcome::rejected("no active players"));
    }

    if !force {
        let ready = count_ready(&mut tx, session.id, session.phase_seq).await?;
        if ready < active {
            return Ok(CommandOutcome::rejected(format!(
                "not everyone is ready yet: {ready}/{active}"
            )));
        }
    }

    let Some((new_phase, opens_round)) = next_phase(session.current_phase) else {
        return Ok(CommandOutcome::rejected("the game is already over"));
    };

    let new_phase_str =
        apply_transition(&mut tx, &session, new_phase, opens_round, actor_user_id).await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied(
        format!("phase changed: {new_phase_str}"),
        session.id,
    ))
}

/// Close the current round. Only valid in the `resolve` phase; records the
/// resolution and rolls straight into the next round's `income` phase.
pub async fn resolve_round(
    pool: &PgPool,
    chat_id: i64,
    actor_user_id: Option<i64>,
) -> Result<CommandOutcome> {
    let mut tx = pool.begin().await?;

    let Some(session) = lock_current_session(&mut tx, chat_id).await? else {
        return Ok(CommandOutcome::rejected(NO_ACTIVE_GAME));
    };

    if session.current_phase != Phase::Resolve {
        return Ok(CommandOutcome::rejected(
            "the round can only be resolved in the resolve phase",
        ));
    }

    insert_audit(
        &mut tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id,
            actor_user_id,
            action_type: "round.resolved".to_string(),
            phase_seq: Some(session.phase_seq),
            round_num: Some(session.round_num),
            payload: json!({}),
        },
    )
    .await?;

    polis_db::emit(
        &mut tx,
        session.id,
        &GameEvent::RoundResolved(polis_events::RoundResolved {
            chat_id,
            round_num: session.round_num,
        }),
    )
    .await?;

    // Resolution implies the round rotation continues into income.
    apply_transition(&mut tx, &session, Phase::Income, true, actor_user_id).await?;

    tx.commit().await?;

    Ok(CommandOutcome::applied(
        format!("round {} resolved", session.round_num),
        session.id,
    ))
}

/// Shared tail of every phase transition. Must run with the session row
/// locked; bumps phase_seq by exactly 1 and clears the ready marks in the
/// same transaction.
async fn apply_transition(
    tx: &mut Transaction<'_, Postgres>,
    session: &SessionRow,
    new_phase: Phase,
    opens_round: bool,
    actor_user_id: Option<i64>,
) -> Result<&'static str> {
    let new_seq = session.phase_seq + 1;
    let new_round = if opens_round {
        session.round_num + 1
    } else {
        session.round_num
    };

    set_phase(tx, session.id, new_phase, new_seq).await?;
    if session.current_phase == Phase::Lobby {
        set_status_active(tx, session.id).await?;
    }
    if opens_round {
        set_round(tx, session.id, new_round).await?;
    }
    delete_ready_for_game(tx, session.id).await?;

    insert_audit(
        tx,
        &NewAuditEntry {
            game_id: session.id,
            chat_id: session.chat_id,
            actor_user_id,
            action_type: "phase.changed".to_string(),
            phase_seq: Some(new_seq),
            round_num: Some(new_round),
            payload: json!({
                "old_phase": session.current_phase.as_str(),
                "new_phase": new_phase.as_str(),
                "old_seq": session.phase_seq,
                "new_seq": new_seq,
            }),
        },
    )
    .await?;

    polis_db::emit(
        tx,
        session.id,
        &GameEvent::PhaseChanged(PhaseChanged {
            chat_id: session.chat_id,
            new_phase: new_phase.as_str().to_string(),
            phase_seq: new_seq,
            round_num: new_round,
        }),
    )
    .await?;

    if opens_round {
        insert_audit(
            tx,
            &NewAuditEntry {
                game_id: session.id,
                chat_id: session.chat_id,
                actor_user_id,
                action_type: "round.started".to_string(),
                phase_seq: Some(new_seq),
                round_num: Some(new_round),
                payload: json!({}),
            },
        )
        .await?;

        polis_db::emit(
            tx,
            session.id,
            &GameEvent::RoundStarted(RoundStarted {
                chat_id: session.chat_id,
                round_num: new_round,
                phase_seq: new_seq,
            }),
        )
        .await?;
    }

    Ok(new_phase.as_str())
}
