//! Game-session aggregate rows and their lifecycle transitions.
//!
//! All mutating functions take a transaction: a command is one transaction
//! from row lock to outbox emit, and nothing here commits on its own.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Lobby,
    Active,
    Finished,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Lobby => "lobby",
            SessionStatus::Active => "active",
            SessionStatus::Finished => "finished",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "lobby" => Ok(SessionStatus::Lobby),
            "active" => Ok(SessionStatus::Active),
            "finished" => Ok(SessionStatus::Finished),
            "archived" => Ok(SessionStatus::Archived),
            other => Err(anyhow!("invalid session status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Income,
    Event,
    WorldArena,
    Negotiations,
    Orders,
    Resolve,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Income => "income",
            Phase::Event => "event",
            Phase::WorldArena => "world_arena",
            Phase::Negotiations => "negotiations",
            Phase::Orders => "orders",
            Phase::Resolve => "resolve",
            Phase::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "lobby" => Ok(Phase::Lobby),
            "income" => Ok(Phase::Income),
            "event" => Ok(Phase::Event),
            "world_arena" => Ok(Phase::WorldArena),
            "negotiations" => Ok(Phase::Negotiations),
            "orders" => Ok(Phase::Orders),
            "resolve" => Ok(Phase::Resolve),
            "finished" => Ok(Phase::Finished),
            other => Err(anyhow!("invalid phase: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub chat_id: i64,
    pub status: SessionStatus,
    pub owner_user_id: Option<i64>,
    pub round_num: i32,
    pub current_phase: Phase,
    pub phase_seq: i32,
    pub phase_started_at: DateTime<Utc>,
    pub afk_timeout_seconds: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

const SESSION_COLUMNS: &str = r#"
    id, chat_id, status, owner_user_id, round_num, current_phase, phase_seq,
    phase_started_at, afk_timeout_seconds, created_at, expires_at, archived_at
"#;

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<SessionRow> {
    Ok(SessionRow {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        status: SessionStatus::parse(&row.try_get::<String, _>("status")?)?,
        owner_user_id: row.try_get("owner_user_id")?,
        round_num: row.try_get("round_num")?,
        current_phase: Phase::parse(&row.try_get::<String, _>("current_phase")?)?,
        phase_seq: row.try_get("phase_seq")?,
        phase_started_at: row.try_get("phase_started_at")?,
        afk_timeout_seconds: row.try_get("afk_timeout_seconds")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub chat_id: i64,
    pub owner_user_id: Option<i64>,
    pub afk_timeout_seconds: i32,
}

/// Row-lock the chat's current (lobby/active) session, newest first.
///
/// Every command handler starts here; the lock serializes all mutations of
/// one chat's session for the duration of the command transaction.
pub async fn lock_current_session(
    tx: &mut Transaction<'_, Postgres>,
    chat_id: i64,
) -> Result<Option<SessionRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {SESSION_COLUMNS}
        from game_sessions
        where chat_id = $1
          and status in ('lobby','active')
        order by created_at desc
        limit 1
        for update
        "#
    ))
    .bind(chat_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock_current_session failed")?;

    row.as_ref().map(row_to_session).transpose()
}

/// Current session without a lock (admin / readiness checks).
pub async fn get_current_session(pool: &PgPool, chat_id: i64) -> Result<Option<SessionRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {SESSION_COLUMNS}
        from game_sessions
        where chat_id = $1
          and status in ('lobby','active')
        order by created_at desc
        limit 1
        "#
    ))
    .bind(chat_id)
    .fetch_optional(pool)
    .await
    .context("get_current_session failed")?;

    row.as_ref().map(row_to_session).transpose()
}

pub async fn fetch_session(pool: &PgPool, game_id: Uuid) -> Result<Option<SessionRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {SESSION_COLUMNS}
        from game_sessions
        where id = $1
        "#
    ))
    .bind(game_id)
    .fetch_optional(pool)
    .await
    .context("fetch_session failed")?;

    row.as_ref().map(row_to_session).transpose()
}

/// Insert a fresh lobby session and return the stored row.
///
/// Callers must have archived any prior lobby/active session for the chat in
/// the same transaction, or the one-active-per-chat index rejects the insert.
pub async fn insert_session(
    tx: &mut Transaction<'_, Postgres>,
    new: &NewSession,
) -> Result<SessionRow> {
    let row = sqlx::query(&format!(
        r#"
        insert into game_sessions (chat_id, owner_user_id, afk_timeout_seconds)
        values ($1, $2, $3)
        returning {SESSION_COLUMNS}
        "#
    ))
    .bind(new.chat_id)
    .bind(new.owner_user_id)
    .bind(new.afk_timeout_seconds)
    .fetch_one(&mut **tx)
    .await
    .context("insert_session failed")?;

    row_to_session(&row)
}

/// Archive every lobby/active session of a chat; returns the archived rows so
/// the caller can audit and emit per session.
pub async fn archive_current_sessions(
    tx: &mut Transaction<'_, Postgres>,
    chat_id: i64,
) -> Result<Vec<SessionRow>> {
    let rows = sqlx::query(&format!(
        r#"
        update game_sessions
        set status = 'archived',
            archived_at = now()
        where chat_id = $1
          and status in ('lobby','active')
        returning {SESSION_COLUMNS}
        "#
    ))
    .bind(chat_id)
    .fetch_all(&mut **tx)
    .await
    .context("archive_current_sessions failed")?;

    rows.iter().map(row_to_session).collect()
}

/// Phase transition: new seq + phase, stamps phase_started_at.
///
/// The caller owns the `phase_seq + 1` arithmetic and the ready-mark reset;
/// this only writes the fields.
pub async fn set_phase(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    new_phase: Phase,
    new_seq: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        update game_sessions
        set current_phase = $2,
            phase_seq = $3,
            phase_started_at = now()
        where id = $1
        "#,
    )
    .bind(game_id)
    .bind(new_phase.as_str())
    .bind(new_seq)
    .execute(&mut **tx)
    .await
    .context("set_phase failed")?;

    Ok(())
}

pub async fn set_round(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    round_num: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        update game_sessions
        set round_num = $2
        where id = $1
        "#,
    )
    .bind(game_id)
    .bind(round_num)
    .execute(&mut **tx)
    .await
    .context("set_round failed")?;

    Ok(())
}

/// Mark the session active (first advance out of the lobby).
pub async fn set_status_active(tx: &mut Transaction<'_, Postgres>, game_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update game_sessions
        set status = 'active'
        where id = $1
        "#,
    )
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .context("set_status_active failed")?;

    Ok(())
}

pub async fn finish_session(tx: &mut Transaction<'_, Postgres>, game_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update game_sessions
        set status = 'finished',
            current_phase = 'finished'
        where id = $1
        "#,
    )
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .context("finish_session failed")?;

    Ok(())
}

pub async fn archive_session(tx: &mut Transaction<'_, Postgres>, game_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update game_sessions
        set status = 'archived',
            archived_at = now()
        where id = $1
        "#,
    )
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .context("archive_session failed")?;

    Ok(())
}
