//! Player Actions
//!
//! The closed set of things a player can queue, and the fixed-size queue
//! that a lock-in carries.

use serde::{Serialize, Deserialize};

use crate::core::grid::Direction;

/// Number of actions in every lock-in.
pub const QUEUE_LEN: usize = 3;

/// A single queued action.
///
/// Wire form: `{"type":"move","dir":"left"}`, `{"type":"recharge"}`,
/// `{"type":"attack"}`, `{"type":"special"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Step one cell.
    Move {
        /// Step direction
        dir: Direction,
    },
    /// Regain mana.
    Recharge,
    /// Basic attack along the row.
    Attack,
    /// Character special.
    Special,
}

impl Action {
    /// Shorthand for a move.
    pub const fn step(dir: Direction) -> Self {
        Action::Move { dir }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Move { dir: Direction::Up } => "move:up",
            Action::Move { dir: Direction::Down } => "move:down",
            Action::Move { dir: Direction::Left } => "move:left",
            Action::Move { dir: Direction::Right } => "move:right",
            Action::Recharge => "recharge",
            Action::Attack => "attack",
            Action::Special => "special",
        }
    }
}

/// Exactly [`QUEUE_LEN`] actions, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActionQueue([Action; QUEUE_LEN]);

impl ActionQueue {
    /// Action for a step index (0-based).
    #[inline]
    pub fn get(&self, step: usize) -> Option<Action> {
        self.0.get(step).copied()
    }
}

/// Rejected queue shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Expected {QUEUE_LEN} actions, got {0}")]
pub struct QueueLengthError(pub usize);

impl TryFrom<Vec<Action>> for ActionQueue {
    type Error = QueueLengthError;

    fn try_from(actions: Vec<Action>) -> Result<Self, Self::Error> {
        let len = actions.len();
        let array: [Action; QUEUE_LEN] = actions
            .try_into()
            .map_err(|_| QueueLengthError(len))?;
        Ok(Self(array))
    }
}
