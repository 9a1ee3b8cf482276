//! Event contract shared by the command side, the relay and the consumer:
//! the domain event catalog, the wire envelope, and the idempotency rules
//! that make re-emission safe.

use thiserror::Error;

pub mod catalog;
pub mod envelope;

pub use catalog::{
    is_materialized, requires_idempotency_key, GameArchived, GameCreated, GameEvent, GameFinished,
    PhaseChanged, PlayerJoined, PlayerReadySet, RoundResolved, RoundStarted, SnapshotCreated,
};
pub use envelope::{AggregateRef, ConsumerDlqMessage, DlqInfo, EventEnvelope, SourceRef};

/// Aggregate type string used for every event in this catalog.
pub const AGGREGATE_GAME_SESSION: &str = "game_session";

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EmitError {
    /// The event type is in the required-idempotency set but no key was given.
    /// This is a programming error on the emitting path, not a runtime state.
    #[error("idempotency_key is required for event_type={0}")]
    MissingIdempotencyKey(String),
}
