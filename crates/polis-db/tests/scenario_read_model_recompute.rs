//! The read-model row is a pure projection: counts derive from players and
//! ready marks, everything else copies from the session row. A vanished
//! session deletes the projection.

mod common;

#[tokio::test]
async fn recompute_projects_counts_and_session_fields() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;
    let alice = common::make_player(&pool, session.id, 1, "FR").await?;
    common::make_player(&pool, session.id, 2, "DE").await?;
    common::make_player(&pool, session.id, 3, "IT").await?;

    // One AFK player and one ready mark.
    let mut tx = pool.begin().await?;
    polis_db::set_player_afk(&mut tx, session.id, 3, true).await?;
    polis_db::mark_ready(&mut tx, session.id, alice.id, 0).await?;
    let outcome = polis_db::recompute_read_model(&mut tx, session.id).await?;
    tx.commit().await?;
    assert_eq!(outcome, polis_db::RecomputeOutcome::Upserted);

    let rm = polis_db::get_read_model_by_chat(&pool, chat_id)
        .await?
        .expect("read model row must exist");
    assert_eq!(rm.game_id, session.id);
    assert_eq!(rm.status, "lobby");
    assert_eq!(rm.current_phase, "lobby");
    assert_eq!(rm.phase_seq, 0);
    assert_eq!(rm.players_total, 3);
    assert_eq!(rm.players_active, 2);
    assert_eq!(rm.ready_count, 1);
    assert_eq!(rm.ready_total, 2);
    assert_eq!(rm.owner_user_id, Some(1000));

    // Recompute is idempotent: running it again changes nothing material.
    let mut tx = pool.begin().await?;
    polis_db::recompute_read_model(&mut tx, session.id).await?;
    tx.commit().await?;
    let rm2 = polis_db::get_read_model_by_chat(&pool, chat_id).await?.unwrap();
    assert_eq!(rm2.players_total, rm.players_total);
    assert_eq!(rm2.ready_count, rm.ready_count);

    Ok(())
}

#[tokio::test]
async fn recompute_tracks_phase_change_and_ready_reset() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;
    let alice = common::make_player(&pool, session.id, 1, "FR").await?;

    let mut tx = pool.begin().await?;
    polis_db::mark_ready(&mut tx, session.id, alice.id, 0).await?;
    polis_db::recompute_read_model(&mut tx, session.id).await?;
    tx.commit().await?;
    let rm = polis_db::get_read_model_by_chat(&pool, chat_id).await?.unwrap();
    assert_eq!(rm.ready_count, 1);

    // Phase transition: seq bumps, marks are wiped, count returns to zero.
    let mut tx = pool.begin().await?;
    polis_db::set_phase(&mut tx, session.id, polis_db::Phase::Income, 1).await?;
    polis_db::delete_ready_for_game(&mut tx, session.id).await?;
    polis_db::recompute_read_model(&mut tx, session.id).await?;
    tx.commit().await?;

    let rm = polis_db::get_read_model_by_chat(&pool, chat_id).await?.unwrap();
    assert_eq!(rm.phase_seq, 1);
    assert_eq!(rm.current_phase, "income");
    assert_eq!(rm.ready_count, 0);

    Ok(())
}

#[tokio::test]
async fn recompute_deletes_row_when_session_is_gone() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;

    let mut tx = pool.begin().await?;
    polis_db::recompute_read_model(&mut tx, session.id).await?;
    tx.commit().await?;
    assert!(polis_db::get_read_model_by_chat(&pool, chat_id).await?.is_some());

    // Hard-delete the aggregate (operator cleanup); cascade removes children,
    // recompute removes the projection.
    sqlx::query("delete from game_sessions where id = $1")
        .bind(session.id)
        .execute(&pool)
        .await?;

    let mut tx = pool.begin().await?;
    let outcome = polis_db::recompute_read_model(&mut tx, session.id).await?;
    tx.commit().await?;
    assert_eq!(outcome, polis_db::RecomputeOutcome::Deleted);
    assert!(polis_db::get_read_model_by_chat(&pool, chat_id).await?.is_none());

    Ok(())
}
