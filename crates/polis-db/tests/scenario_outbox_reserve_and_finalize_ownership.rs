//! Reserve moves ready rows to `processing` stamped with the reserving
//! relay's identity; finalize succeeds only while that identity still holds
//! the lease. A second relay sees nothing to reserve and cannot finalize.

mod common;

use polis_events::{GameEvent, RoundStarted};

#[tokio::test]
async fn reserve_is_exclusive_and_finalize_checks_owner() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;

    let event = GameEvent::RoundStarted(RoundStarted {
        chat_id,
        round_num: 1,
        phase_seq: 1,
    });
    let mut tx = pool.begin().await?;
    polis_db::emit(&mut tx, session.id, &event).await?;
    tx.commit().await?;

    let key = event.idempotency_key(session.id);
    let row = polis_db::outbox_fetch_by_idempotency_key(&pool, &key)
        .await?
        .expect("outbox row must exist");

    // Relay A reserves; the batch limit is generous because the shared test
    // database may hold unrelated pending rows.
    let batch_a = polis_db::reserve_batch(&pool, 1000, 30, "relay-a:1").await?;
    let leased = batch_a
        .iter()
        .find(|r| r.id == row.id)
        .expect("relay A must lease the new row");
    assert_eq!(leased.status, "processing");
    assert_eq!(leased.lock_owner.as_deref(), Some("relay-a:1"));
    assert!(leased.locked_until.is_some());

    // Relay B finds nothing: the row is no longer status=new.
    let batch_b = polis_db::reserve_batch(&pool, 1000, 30, "relay-b:1").await?;
    assert!(
        !batch_b.iter().any(|r| r.id == row.id),
        "relay B must not lease a row already in processing"
    );

    // Finalize under the wrong identity is a no-op.
    assert!(!polis_db::mark_sent(&pool, row.id, "relay-b:1").await?);

    // The owner finalizes.
    assert!(polis_db::mark_sent(&pool, row.id, "relay-a:1").await?);

    let row = polis_db::fetch_outbox_row(&pool, row.id)
        .await?
        .expect("row must exist");
    assert_eq!(row.status, "sent");
    assert!(row.published_at.is_some());
    assert!(row.lock_owner.is_none());
    assert!(row.locked_until.is_none());
    assert!(row.next_retry_at.is_none());

    // Terminal: a late retry/dead from anyone is a no-op.
    assert!(!polis_db::mark_retry(&pool, row.id, "relay-a:1", "late", 2).await?);
    assert!(!polis_db::mark_dead(&pool, row.id, "relay-a:1", "late").await?);

    Ok(())
}
