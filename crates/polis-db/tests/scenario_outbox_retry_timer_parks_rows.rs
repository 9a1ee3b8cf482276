//! A row pushed back to `new` with a future retry timer is invisible to
//! reserve until the timer elapses.

mod common;

use polis_events::{GameEvent, RoundStarted};

#[tokio::test]
async fn rows_with_future_retry_timer_are_not_reserved() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else {
        return Ok(());
    };

    let chat_id = common::rand_chat_id();
    let session = common::make_session(&pool, chat_id).await?;

    let event = GameEvent::RoundStarted(RoundStarted {
        chat_id,
        round_num: 2,
        phase_seq: 3,
    });
    let mut tx = pool.begin().await?;
    polis_db::emit(&mut tx, session.id, &event).await?;
    tx.commit().await?;

    let key = event.idempotency_key(session.id);
    let row = polis_db::outbox_fetch_by_idempotency_key(&pool, &key)
        .await?
        .expect("row must exist");

    // Lease, then push back to new with a 60s retry timer.
    let batch = polis_db::reserve_batch(&pool, 1000, 30, "relay-a:2").await?;
    assert!(batch.iter().any(|r| r.id == row.id));
    assert!(polis_db::mark_retry(&pool, row.id, "relay-a:2", "KafkaError: timeout", 60).await?);

    let row = polis_db::fetch_outbox_row(&pool, row.id).await?.unwrap();
    assert_eq!(row.status, "new");
    assert_eq!(row.publish_attempts, 1);
    assert_eq!(row.last_error.as_deref(), Some("KafkaError: timeout"));
    assert!(row.next_retry_at.is_some());

    // Not ready again until the timer elapses.
    let batch = polis_db::reserve_batch(&pool, 1000, 30, "relay-a:2").await?;
    assert!(
        !batch.iter().any(|r| r.id == row.id),
        "row must stay parked until next_retry_at"
    );

    Ok(())
}
