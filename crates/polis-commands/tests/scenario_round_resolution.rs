//! Round resolution: only in the resolve phase, records the resolution, and
//! rolls into the next round's income phase in the same transaction.

mod common;

use polis_db::Phase;

async fn walk_to_resolve(pool: &sqlx::PgPool, chat_id: i64) -> anyhow::Result<()> {
    // lobby -> income -> event -> world_arena -> negotiations -> orders -> resolve
    for _ in 0..6 {
        common::ready_all_and_advance(pool, chat_id, &[1]).await?;
    }
    Ok(())
}

#[tokio::test]
async fn resolve_closes_the_round_and_opens_the_next() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    polis_commands::create_game(&pool, chat_id, Some(10), 300).await?;
    polis_commands::join_game(&pool, chat_id, 1, "FR", "France").await?;
    walk_to_resolve(&pool, chat_id).await?;

    let session = polis_db::get_current_session(&pool, chat_id).await?.unwrap();
    assert_eq!(session.current_phase, Phase::Resolve);
    assert_eq!(session.round_num, 1);
    let seq_at_resolve = session.phase_seq;

    let out = polis_commands::resolve_round(&pool, chat_id, Some(10)).await?;
    assert!(out.ok(), "{}", out.message());
    assert!(out.message().contains("round 1"));

    let session = polis_db::get_current_session(&pool, chat_id).await?.unwrap();
    assert_eq!(session.current_phase, Phase::Income);
    assert_eq!(session.round_num, 2);
    assert_eq!(session.phase_seq, seq_at_resolve + 1);

    // round.resolved keyed on the closed round, round.started on the new one.
    let key = format!("round.resolved:{}:1", session.id);
    assert!(polis_db::outbox_fetch_by_idempotency_key(&pool, &key)
        .await?
        .is_some());
    let key = format!("round.started:{}:2", session.id);
    assert!(polis_db::outbox_fetch_by_idempotency_key(&pool, &key)
        .await?
        .is_some());

    let audit = polis_db::recent_audit_by_chat(&pool, chat_id, 50).await?;
    assert!(audit.iter().any(|a| a.action_type == "round.resolved"));

    Ok(())
}

#[tokio::test]
async fn resolve_outside_resolve_phase_is_rejected() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    polis_commands::create_game(&pool, chat_id, Some(10), 300).await?;
    polis_commands::join_game(&pool, chat_id, 1, "FR", "France").await?;

    let out = polis_commands::resolve_round(&pool, chat_id, None).await?;
    assert!(!out.ok());
    assert!(out.message().contains("resolve phase"), "got: {}", out.message());

    Ok(())
}
