//! Game Logic Module
//!
//! The turn resolution engine. Pure and deterministic: no I/O, no clocks,
//! and the only randomness is the seeded arena pick.
//!
//! ## Module Structure
//!
//! - `rules`: Rule constants and pacing delays
//! - `action`: Queued actions and the three-action queue
//! - `state`: Actors, match phase, snapshots, boundary operations
//! - `special`: Per-character special shapes
//! - `resolve`: Single-action resolution
//! - `turn`: Queue interleaving, lethality, replay
//! - `timeline`: Ordered frames streamed to clients

pub mod rules;
pub mod action;
pub mod state;
pub mod special;
pub mod resolve;
pub mod turn;
pub mod timeline;

// Re-export key types
pub use rules::RulesConfig;
pub use action::{Action, ActionQueue, QUEUE_LEN};
pub use state::{
    Actor, ActorView, Arena, Character, MatchError, MatchPhase, MatchState,
    Slot, Snapshot, SubmitOutcome, Winner,
};
pub use resolve::{ActionOutcome, InvalidReason};
pub use turn::{replay_turns, resolve_turn, RecordedTurn, TurnOutcome, TurnResult};
pub use timeline::{Effect, Timeline, TimelineFrame};
