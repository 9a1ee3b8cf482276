//! Session lifecycle tails (finish, archive, create-over) and snapshots.

mod common;

#[tokio::test]
async fn finish_terminates_session_and_emits_once() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    polis_commands::create_game(&pool, chat_id, Some(10), 300).await?;
    polis_commands::join_game(&pool, chat_id, 1, "FR", "France").await?;

    let out = polis_commands::finish_game(&pool, chat_id, Some(10)).await?;
    assert!(out.ok());
    let game_id = match out {
        polis_commands::CommandOutcome::Applied { game_id, .. } => game_id,
        _ => unreachable!(),
    };

    let session = polis_db::fetch_session(&pool, game_id).await?.unwrap();
    assert_eq!(session.status, polis_db::SessionStatus::Finished);
    assert_eq!(session.current_phase, polis_db::Phase::Finished);

    let key = format!("game.finished:{game_id}");
    assert!(polis_db::outbox_fetch_by_idempotency_key(&pool, &key)
        .await?
        .is_some());

    // The chat no longer has a current session.
    assert!(polis_db::get_current_session(&pool, chat_id).await?.is_none());
    let out = polis_commands::finish_game(&pool, chat_id, Some(10)).await?;
    assert!(!out.ok());

    Ok(())
}

#[tokio::test]
async fn create_over_archives_the_previous_session() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    polis_commands::create_game(&pool, chat_id, Some(10), 300).await?;
    let old = polis_db::get_current_session(&pool, chat_id).await?.unwrap();

    let out = polis_commands::create_game(&pool, chat_id, Some(20), 300).await?;
    assert!(out.ok());
    assert!(out.message().contains("replaced 1"), "got: {}", out.message());

    let old_after = polis_db::fetch_session(&pool, old.id).await?.unwrap();
    assert_eq!(old_after.status, polis_db::SessionStatus::Archived);
    assert!(old_after.archived_at.is_some());

    let key = format!("admin.archive:{}", old.id);
    let row = polis_db::outbox_fetch_by_idempotency_key(&pool, &key)
        .await?
        .expect("archive event for the replaced session");
    assert_eq!(row.event_type, "game.archived");

    let fresh = polis_db::get_current_session(&pool, chat_id).await?.unwrap();
    assert_ne!(fresh.id, old.id);
    assert_eq!(fresh.owner_user_id, Some(20));

    Ok(())
}

#[tokio::test]
async fn snapshot_appends_rows_but_emits_once_per_phase() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    polis_commands::create_game(&pool, chat_id, Some(10), 300).await?;
    polis_commands::join_game(&pool, chat_id, 1, "FR", "France").await?;

    let out = polis_commands::snapshot_game(&pool, chat_id, Some(10)).await?;
    assert!(out.ok());
    // Same phase, same round: snapshot rows append, the event dedupes.
    let out = polis_commands::snapshot_game(&pool, chat_id, Some(10)).await?;
    assert!(out.ok());

    let session = polis_db::get_current_session(&pool, chat_id).await?.unwrap();

    let snap = polis_db::latest_snapshot_by_chat(&pool, chat_id)
        .await?
        .expect("snapshot row must exist");
    assert_eq!(snap.game_id, session.id);
    assert_eq!(snap.phase_seq, 0);
    assert_eq!(snap.snapshot["current_phase"], "lobby");

    let (count,): (i64,) = sqlx::query_as(
        "select count(*)::bigint from game_state_snapshots where game_id = $1",
    )
    .bind(session.id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(count, 2, "snapshots are append-only");

    let rows = polis_db::list_outbox_by_aggregate(&pool, session.id, 50).await?;
    let snapshot_events = rows
        .iter()
        .filter(|r| r.event_type == "snapshot.created")
        .count();
    assert_eq!(snapshot_events, 1, "event deduped on (session, seq, round)");

    Ok(())
}
