use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "POLIS_DATABASE_URL";

pub mod audit;
pub mod consumed;
pub mod outbox;
pub mod players;
pub mod read_model;
pub mod ready;
pub mod sessions;
pub mod snapshots;

pub use audit::{insert_audit, recent_audit_by_chat, AuditRow, NewAuditEntry};
pub use consumed::{
    already_consumed, fetch_consumed, insert_consumed, ConsumedRow, NewConsumedEvent,
};
pub use outbox::{
    emit, emit_raw, fetch_outbox_row, list_dead, list_outbox_by_aggregate, list_unpublished,
    mark_dead, mark_retry, mark_sent, outbox_fetch_by_idempotency_key, pending_count,
    reclaim_expired, reserve_batch, OutboxRow,
};
pub use players::{
    count_active_players, get_player, insert_player, set_player_afk, PlayerInsert, PlayerRow,
};
pub use read_model::{get_read_model_by_chat, recompute_read_model, ReadModelRow, RecomputeOutcome};
pub use ready::{count_ready, delete_ready_for_game, list_ready_current, mark_ready, ReadyEntry};
pub use sessions::{
    archive_current_sessions, archive_session, fetch_session, finish_session, get_current_session,
    insert_session, lock_current_session, set_phase, set_round, set_status_active, NewSession,
    Phase, SessionRow, SessionStatus,
};
pub use snapshots::{insert_snapshot, latest_snapshot_by_chat, SnapshotRow};

/// Connect to Postgres using POLIS_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Test helper used by integration tests:
/// - Connect using POLIS_DATABASE_URL
/// - Ensure migrations are applied
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='game_sessions'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_game_sessions_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_game_sessions_table: bool,
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                || (db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint))
        }
        _ => false,
    }
}
