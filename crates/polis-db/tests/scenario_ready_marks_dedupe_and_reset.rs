//! Ready marks: one per (game, player, phase); AFK players don't count; a
//! full delete clears the slate for the next phase.

mod common;

#[tokio::test]
async fn ready_mark_is_once_per_phase_and_counts_live_players_only() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;
    let alice = common::make_player(&pool, session.id, 1, "FR").await?;
    let bob = common::make_player(&pool, session.id, 2, "DE").await?;

    let mut tx = pool.begin().await?;
    assert!(polis_db::mark_ready(&mut tx, session.id, alice.id, 0).await?);
    assert!(
        !polis_db::mark_ready(&mut tx, session.id, alice.id, 0).await?,
        "second mark for the same phase must dedupe"
    );
    assert!(polis_db::mark_ready(&mut tx, session.id, bob.id, 0).await?);
    assert_eq!(polis_db::count_ready(&mut tx, session.id, 0).await?, 2);
    tx.commit().await?;

    // Bob goes AFK: his standing mark stops counting.
    let mut tx = pool.begin().await?;
    assert!(polis_db::set_player_afk(&mut tx, session.id, 2, true).await?);
    assert_eq!(polis_db::count_ready(&mut tx, session.id, 0).await?, 1);
    assert_eq!(polis_db::count_active_players(&mut tx, session.id).await?, 1);
    tx.commit().await?;

    Ok(())
}

#[tokio::test]
async fn delete_clears_all_marks_for_the_session() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;
    let alice = common::make_player(&pool, session.id, 1, "FR").await?;
    let bob = common::make_player(&pool, session.id, 2, "DE").await?;

    let mut tx = pool.begin().await?;
    polis_db::mark_ready(&mut tx, session.id, alice.id, 0).await?;
    polis_db::mark_ready(&mut tx, session.id, bob.id, 0).await?;
    let deleted = polis_db::delete_ready_for_game(&mut tx, session.id).await?;
    assert_eq!(deleted, 2);
    assert_eq!(polis_db::count_ready(&mut tx, session.id, 0).await?, 0);
    tx.commit().await?;

    Ok(())
}
