//! Shared helpers for DB-backed scenario tests.
//!
//! All tests skip gracefully when `POLIS_DATABASE_URL` is not set, so plain
//! `cargo test` stays green on machines without a Postgres.
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

/// Random chat id so concurrent test runs never collide on the
/// one-active-session-per-chat index.
pub fn rand_chat_id() -> i64 {
    (Uuid::new_v4().as_u128() as i64).abs() % 1_000_000_000_000
}

pub async fn make_session(pool: &PgPool, chat_id: i64) -> anyhow::Result<polis_db::SessionRow> {
    let mut tx = pool.begin().await?;
    let session = polis_db::insert_session(
        &mut tx,
        &polis_db::NewSession {
            chat_id,
            owner_user_id: Some(1000),
            afk_timeout_seconds: 300,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(session)
}

pub async fn make_player(
    pool: &PgPool,
    game_id: Uuid,
    user_id: i64,
    country_code: &str,
) -> anyhow::Result<polis_db::PlayerRow> {
    let mut tx = pool.begin().await?;
    let inserted = polis_db::insert_player(
        &mut tx,
        game_id,
        user_id,
        country_code,
        &format!("Country {country_code}"),
    )
    .await?;
    tx.commit().await?;
    match inserted {
        polis_db::PlayerInsert::Inserted(p) => Ok(p),
        other => anyhow::bail!("expected player insert, got {other:?}"),
    }
}
