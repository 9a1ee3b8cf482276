#![allow(dead_code)]

use sqlx::PgPool;
use uuid::Uuid;

pub async fn test_pool() -> anyhow::Result<Option<PgPool>> {
    if std::env::var(polis_db::ENV_DB_URL).is_err() {
        eprintln!("SKIP: {} not set", polis_db::ENV_DB_URL);
        return Ok(None);
    }
    let pool = polis_db::testkit_db_pool().await?;
    Ok(Some(pool))
}

pub fn rand_chat_id() -> i64 {
    (Uuid::new_v4().as_u128() as i64).abs() % 1_000_000_000_000
}

/// Everyone readies up, then the phase advances. Panics on rejection so test
/// setup failures surface loudly.
pub async fn ready_all_and_advance(
    pool: &PgPool,
    chat_id: i64,
    user_ids: &[i64],
) -> anyhow::Result<()> {
    for &uid in user_ids {
        let out = polis_commands::set_ready(pool, chat_id, uid).await?;
        assert!(out.ok(), "ready failed: {}", out.message());
    }
    let out = polis_commands::advance_phase(pool, chat_id, None, false).await?;
    assert!(out.ok(), "advance failed: {}", out.message());
    Ok(())
}
