//! Command handlers for the game-session aggregate.
//!
//! Every handler is exactly one database transaction:
//! lock the chat's current session → validate preconditions → mutate the
//! aggregate → append an audit row → queue outbox events. Domain rejections
//! come back as `CommandOutcome::Rejected` and roll the transaction back;
//! infrastructure failures propagate as errors and are retried by the caller
//! (retrying is safe: aggregate updates are guarded and outbox emission
//! dedupes on the idempotency key).

use uuid::Uuid;

mod create;
mod join;
mod lifecycle;
mod phase;
mod ready;
mod snapshot;

pub use create::create_game;
pub use join::join_game;
pub use lifecycle::{archive_game, finish_game, mark_afk};
pub use phase::{advance_phase, next_phase, resolve_round};
pub use ready::set_ready;
pub use snapshot::snapshot_game;

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Applied { message: String, game_id: Uuid },
    Rejected { reason: String },
}

impl CommandOutcome {
    pub fn applied(message: impl Into<String>, game_id: Uuid) -> Self {
        CommandOutcome::Applied {
            message: message.into(),
            game_id,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        CommandOutcome::Rejected {
            reason: reason.into(),
        }
    }

    pub fn ok(&self) -> bool {
        matches!(self, CommandOutcome::Applied { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            CommandOutcome::Applied { message, .. } => message,
            CommandOutcome::Rejected { reason } => reason,
        }
    }
}

pub(crate) const NO_ACTIVE_GAME: &str = "no active game in this chat";
