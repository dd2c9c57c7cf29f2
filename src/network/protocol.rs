//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHash;
use crate::game::action::Action;
use crate::game::state::{MatchError, Slot, Snapshot, Winner};
use crate::game::timeline::Timeline;
use crate::game::turn::TurnResult;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Pick a character (turn 1 only).
    ChooseCharacter {
        /// Character id, parsed by the match
        character: String,
    },

    /// Submit this turn's three actions.
    LockIn {
        /// Queued actions in execution order
        actions: Vec<Action>,
    },

    /// Reset the match.
    Retry,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back
        timestamp: u64,
    },

    /// Player is leaving the match.
    Leave,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Seat assignment on connect.
    YouAre {
        /// Assigned slot
        slot: Slot,
        /// Match identifier (UUID)
        match_id: String,
    },

    /// State after a non-resolving change.
    State {
        /// Current snapshot
        snapshot: Snapshot,
    },

    /// A turn was resolved.
    TurnResolved {
        /// Post-turn snapshot
        snapshot: Snapshot,
        /// Frames to play back
        timeline: Timeline,
        /// Hex SHA-256 of the post-turn snapshot
        state_hash: String,
    },

    /// Match reached a terminal state.
    MatchEnded {
        /// Result
        winner: Winner,
    },

    /// Match was reset.
    Reset,

    /// Request rejected.
    Error {
        /// Error code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Server wall clock (ms since epoch)
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Why
        reason: String,
    },
}

impl ServerMessage {
    /// Error message with a code.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error { code, message: message.into() }
    }

    /// Broadcast form of a resolved turn.
    pub fn turn_resolved(snapshot: Snapshot, result: &TurnResult) -> Self {
        ServerMessage::TurnResolved {
            snapshot,
            timeline: result.timeline.clone(),
            state_hash: encode_hash(&result.state_hash),
        }
    }
}

/// Hex form of a state hash.
pub fn encode_hash(hash: &StateHash) -> String {
    hex::encode(hash)
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unparseable or unknown message.
    InvalidMessage,
    /// Lock-in with a malformed queue.
    InvalidQueue,
    /// Character id not recognised.
    UnknownCharacter,
    /// Lock-in before picking a character.
    CharacterNotSelected,
    /// Already locked in this turn.
    AlreadyLocked,
    /// Character selection is closed.
    SelectionClosed,
    /// Match is over; only retry is accepted.
    MatchEnded,
    /// Both slots taken.
    MatchFull,
    /// Connection has no match.
    NotInMatch,
    /// Internal error.
    InternalError,
}

impl From<&MatchError> for ErrorCode {
    fn from(err: &MatchError) -> Self {
        match err {
            MatchError::InvalidQueueLength(_) => ErrorCode::InvalidQueue,
            MatchError::CharacterNotSelected => ErrorCode::CharacterNotSelected,
            MatchError::AlreadyLocked => ErrorCode::AlreadyLocked,
            MatchError::SelectionClosed => ErrorCode::SelectionClosed,
            MatchError::MatchEnded => ErrorCode::MatchEnded,
            MatchError::UnknownCharacter(_) => ErrorCode::UnknownCharacter,
            MatchError::Invariant(_) => ErrorCode::InternalError,
        }
    }
}

impl From<&MatchError> for ServerMessage {
    fn from(err: &MatchError) -> Self {
        ServerMessage::error(err.into(), err.to_string())
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Parse an incoming frame, classifying the failure.
    ///
    /// A `lock_in` whose actions do not parse is an `invalid_queue`;
    /// anything else unparseable is an `invalid_message`.
    pub fn parse(text: &str) -> Result<Self, ServerMessage> {
        Self::from_json(text).map_err(|err| {
            let is_lock_in = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "lock_in"))
                .unwrap_or(false);
            let code = if is_lock_in { ErrorCode::InvalidQueue } else { ErrorCode::InvalidMessage };
            ServerMessage::error(code, err.to_string())
        })
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
