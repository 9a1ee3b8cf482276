//! Player child rows: one per (session, external user), one per (session,
//! country). Both uniqueness rules live in the schema; inserts surface them
//! as typed outcomes instead of raw constraint errors.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::is_unique_constraint_violation;

#[derive(Debug, Clone)]
pub struct PlayerRow {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: i64,
    pub country_code: String,
    pub country_name: String,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_afk: bool,
    pub last_action_at: Option<DateTime<Utc>>,
}

fn row_to_player(row: &sqlx::postgres::PgRow) -> Result<PlayerRow> {
    Ok(PlayerRow {
        id: row.try_get("id")?,
        game_id: row.try_get("game_id")?,
        user_id: row.try_get("user_id")?,
        country_code: row.try_get("country_code")?,
        country_name: row.try_get("country_name")?,
        joined_at: row.try_get("joined_at")?,
        is_active: row.try_get("is_active")?,
        is_afk: row.try_get("is_afk")?,
        last_action_at: row.try_get("last_action_at")?,
    })
}

#[derive(Debug)]
pub enum PlayerInsert {
    Inserted(PlayerRow),
    DuplicateUser,
    DuplicateCountry,
}

/// Insert a player into a session. Uniqueness violations come back as
/// `DuplicateUser` / `DuplicateCountry` so handlers can phrase the rejection.
pub async fn insert_player(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    user_id: i64,
    country_code: &str,
    country_name: &str,
) -> Result<PlayerInsert> {
    let res = sqlx::query(
        r#"
        insert into game_players (game_id, user_id, country_code, country_name)
        values ($1, $2, $3, $4)
        returning id, game_id, user_id, country_code, country_name,
                  joined_at, is_active, is_afk, last_action_at
        "#,
    )
    .bind(game_id)
    .bind(user_id)
    .bind(country_code)
    .bind(country_name)
    .fetch_one(&mut **tx)
    .await;

    match res {
        Ok(row) => Ok(PlayerInsert::Inserted(row_to_player(&row)?)),
        Err(e) => {
            if is_unique_constraint_violation(&e, "uq_game_players_game_user") {
                return Ok(PlayerInsert::DuplicateUser);
            }
            if is_unique_constraint_violation(&e, "uq_game_players_game_country") {
                return Ok(PlayerInsert::DuplicateCountry);
            }
            Err(anyhow::Error::new(e).context("insert_player failed"))
        }
    }
}

pub async fn get_player(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    user_id: i64,
) -> Result<Option<PlayerRow>> {
    let row = sqlx::query(
        r#"
        select id, game_id, user_id, country_code, country_name,
               joined_at, is_active, is_afk, last_action_at
        from game_players
        where game_id = $1
          and user_id = $2
        "#,
    )
    .bind(game_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .context("get_player failed")?;

    row.as_ref().map(row_to_player).transpose()
}

/// Players counted toward ready thresholds: active and not AFK.
pub async fn count_active_players(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from game_players
        where game_id = $1
          and is_active is true
          and is_afk is false
        "#,
    )
    .bind(game_id)
    .fetch_one(&mut **tx)
    .await
    .context("count_active_players failed")?;

    Ok(n)
}

/// Flip the AFK flag; stamps last_action_at when the player comes back.
/// Returns false if the player is not in the session.
pub async fn set_player_afk(
    tx: &mut Transaction<'_, Postgres>,
    game_id: Uuid,
    user_id: i64,
    afk: bool,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update game_players
        set is_afk = $3,
            last_action_at = case when $3 then last_action_at else now() end
        where game_id = $1
          and user_id = $2
        returning id
        "#,
    )
    .bind(game_id)
    .bind(user_id)
    .bind(afk)
    .fetch_optional(&mut **tx)
    .await
    .context("set_player_afk failed")?;

    Ok(row.is_some())
}
