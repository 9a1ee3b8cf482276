//! Closed catalog of domain events.
//!
//! Each variant carries a typed payload; the outbox stores the payload as
//! JSONB and the relay projects it onto the wire envelope unchanged. The
//! idempotency key is a pure function of the domain action so that command
//! retries collapse onto the same outbox row.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameCreated {
    pub chat_id: i64,
    pub owner: Option<i64>,
    pub status: String,
    pub phase: String,
    pub phase_seq: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub player_id: Uuid,
    pub user_id: i64,
    pub country_code: String,
    pub country_name: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseChanged {
    pub chat_id: i64,
    pub new_phase: String,
    pub phase_seq: i32,
    pub round_num: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStarted {
    pub chat_id: i64,
    pub round_num: i32,
    pub phase_seq: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResolved {
    pub chat_id: i64,
    pub round_num: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerReadySet {
    pub chat_id: i64,
    pub player_id: Uuid,
    pub phase_seq: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCreated {
    pub chat_id: i64,
    pub phase_seq: i32,
    pub round_num: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameFinished {
    pub chat_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameArchived {
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub enum GameEvent {
    GameCreated(GameCreated),
    PlayerJoined(PlayerJoined),
    PhaseChanged(PhaseChanged),
    RoundStarted(RoundStarted),
    RoundResolved(RoundResolved),
    PlayerReadySet(PlayerReadySet),
    SnapshotCreated(SnapshotCreated),
    GameFinished(GameFinished),
    GameArchived(GameArchived),
}

impl GameEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::GameCreated(_) => "game.created",
            GameEvent::PlayerJoined(_) => "player.joined",
            GameEvent::PhaseChanged(_) => "phase.changed",
            GameEvent::RoundStarted(_) => "round.started",
            GameEvent::RoundResolved(_) => "round.resolved",
            GameEvent::PlayerReadySet(_) => "player.ready_set",
            GameEvent::SnapshotCreated(_) => "snapshot.created",
            GameEvent::GameFinished(_) => "game.finished",
            GameEvent::GameArchived(_) => "game.archived",
        }
    }

    /// Deduplication key for this event instance, scoped to one session.
    ///
    /// Snapshot and archive keep their historical `admin.`-prefixed keys:
    /// those operations originate from the admin surface and were keyed that
    /// way from the first rollout, so replays of old commands still dedupe.
    pub fn idempotency_key(&self, game_id: Uuid) -> String {
        match self {
            GameEvent::GameCreated(_) => format!("game.created:{game_id}"),
            GameEvent::PlayerJoined(p) => format!("player.joined:{game_id}:{}", p.user_id),
            GameEvent::PhaseChanged(p) => format!("phase.changed:{game_id}:{}", p.phase_seq),
            GameEvent::RoundStarted(r) => format!("round.started:{game_id}:{}", r.round_num),
            GameEvent::RoundResolved(r) => format!("round.resolved:{game_id}:{}", r.round_num),
            GameEvent::PlayerReadySet(r) => {
                format!("player.ready_set:{game_id}:{}:{}", r.player_id, r.phase_seq)
            }
            GameEvent::SnapshotCreated(s) => {
                format!("admin.snapshot:{game_id}:{}:{}", s.phase_seq, s.round_num)
            }
            GameEvent::GameFinished(_) => format!("game.finished:{game_id}"),
            GameEvent::GameArchived(_) => format!("admin.archive:{game_id}"),
        }
    }

    pub fn payload_json(&self) -> serde_json::Value {
        let value = match self {
            GameEvent::GameCreated(p) => serde_json::to_value(p),
            GameEvent::PlayerJoined(p) => serde_json::to_value(p),
            GameEvent::PhaseChanged(p) => serde_json::to_value(p),
            GameEvent::RoundStarted(p) => serde_json::to_value(p),
            GameEvent::RoundResolved(p) => serde_json::to_value(p),
            GameEvent::PlayerReadySet(p) => serde_json::to_value(p),
            GameEvent::SnapshotCreated(p) => serde_json::to_value(p),
            GameEvent::GameFinished(p) => serde_json::to_value(p),
            GameEvent::GameArchived(p) => serde_json::to_value(p),
        };
        value.expect("event payload serialization must not fail")
    }
}

/// Event types that may be re-emitted and therefore must carry a key.
const MUST_HAVE_IDEM_TYPES: &[&str] = &[
    "game.created",
    "player.joined",
    "phase.changed",
    "round.started",
    "round.resolved",
    "snapshot.created",
    "game.finished",
    "game.archived",
];

const MUST_HAVE_IDEM_PREFIXES: &[&str] = &["admin."];

pub fn requires_idempotency_key(event_type: &str) -> bool {
    if MUST_HAVE_IDEM_PREFIXES
        .iter()
        .any(|p| event_type.starts_with(p))
    {
        return true;
    }
    MUST_HAVE_IDEM_TYPES.contains(&event_type)
}

/// Event types the consumer materializes into the read model. Anything else
/// is committed and skipped.
const MATERIALIZE_TYPES: &[&str] = &[
    "game.created",
    "player.joined",
    "phase.changed",
    "round.started",
    "round.resolved",
    "player.ready_set",
    "snapshot.created",
    "game.finished",
    "game.archived",
];

pub fn is_materialized(event_type: &str) -> bool {
    MATERIALIZE_TYPES.contains(&event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_templates() {
        let gid = Uuid::new_v4();

        let ev = GameEvent::PhaseChanged(PhaseChanged {
            chat_id: 42,
            new_phase: "resolve".into(),
            phase_seq: 4,
            round_num: 1,
        });
        assert_eq!(ev.idempotency_key(gid), format!("phase.changed:{gid}:4"));

        let ev = GameEvent::PlayerJoined(PlayerJoined {
            player_id: Uuid::new_v4(),
            user_id: 777,
            country_code: "FR".into(),
            country_name: "France".into(),
            chat_id: 42,
        });
        assert_eq!(ev.idempotency_key(gid), format!("player.joined:{gid}:777"));

        let ev = GameEvent::SnapshotCreated(SnapshotCreated {
            chat_id: 42,
            phase_seq: 7,
            round_num: 2,
        });
        assert_eq!(ev.idempotency_key(gid), format!("admin.snapshot:{gid}:7:2"));

        let ev = GameEvent::GameArchived(GameArchived { chat_id: 42 });
        assert_eq!(ev.idempotency_key(gid), format!("admin.archive:{gid}"));
    }

    #[test]
    fn required_idempotency_set_covers_admin_prefix() {
        assert!(requires_idempotency_key("game.created"));
        assert!(requires_idempotency_key("admin.force_phase"));
        assert!(requires_idempotency_key("admin.archive"));
        assert!(!requires_idempotency_key("player.ready_set"));
        assert!(!requires_idempotency_key("chat.message"));
    }

    #[test]
    fn ready_set_is_materialized_but_not_key_required() {
        assert!(is_materialized("player.ready_set"));
        assert!(!requires_idempotency_key("player.ready_set"));
    }

    #[test]
    fn payload_projects_to_catalog_keys() {
        let ev = GameEvent::RoundStarted(RoundStarted {
            chat_id: 1,
            round_num: 3,
            phase_seq: 9,
        });
        let payload = ev.payload_json();
        assert_eq!(payload["round_num"], 3);
        assert_eq!(payload["phase_seq"], 9);
        assert_eq!(ev.event_type(), "round.started");
    }
}
