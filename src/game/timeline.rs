//! Resolution Timeline
//!
//! An ordered list of frames describing what happened during a turn and
//! when. Each frame carries the authoritative snapshot *after* its step,
//! the visual effects of that step and how long a client should hold it.

use serde::{Serialize, Deserialize};

use crate::core::grid::{Cell, Direction};
use crate::game::state::{MatchState, Slot, Snapshot};

// =============================================================================
// EFFECTS
// =============================================================================

/// A visual cue attached to a frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Mana gained
    Recharge {
        /// Recharging actor
        from: Slot,
        /// Highlighted cells
        cells: Vec<Cell>,
        /// Mana actually gained
        amount: u32,
    },

    /// Basic attack projectile passing through a cell
    Projectile {
        /// Attacker
        from: Slot,
        /// Current projectile cell
        cell: Cell,
        /// Travel direction
        dir: Direction,
    },

    /// Damage landed
    Hit {
        /// Damaged actor
        target: Slot,
        /// Hp removed
        damage: u32,
    },

    /// Basic attack that had nothing to travel toward
    AttackSwing {
        /// Attacker
        from: Slot,
    },

    /// Special charge-up beat
    Special {
        /// Caster
        from: Slot,
        /// Area covered by the caster's shape
        cells: Vec<Cell>,
    },

    /// Rejected action
    Invalid {
        /// Actor whose action failed
        target: Slot,
    },
}

impl Effect {
    /// Damage effect.
    pub fn hit(target: Slot, damage: u32) -> Self {
        Effect::Hit { target, damage }
    }

    /// Rejection effect.
    pub fn invalid(target: Slot) -> Self {
        Effect::Invalid { target }
    }

    /// Damage dealt by this effect, if any.
    pub fn damage(&self) -> Option<(Slot, u32)> {
        match self {
            Effect::Hit { target, damage } => Some((*target, *damage)),
            _ => None,
        }
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// One step of the resolution animation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineFrame {
    /// State after this step
    pub snapshot: Snapshot,
    /// Effects to play
    pub effects: Vec<Effect>,
    /// Hold time before the next frame
    pub delay_ms: u32,
}

/// Ordered frames for one resolved turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    frames: Vec<TimelineFrame>,
}

impl Timeline {
    /// Frames in playback order.
    pub fn frames(&self) -> &[TimelineFrame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// No frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of all delays.
    pub fn total_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.delay_ms as u64).sum()
    }

    /// Start offset of each frame.
    pub fn offsets(&self) -> Vec<u64> {
        let mut at = 0u64;
        self.frames
            .iter()
            .map(|f| {
                let start = at;
                at += f.delay_ms as u64;
                start
            })
            .collect()
    }

    /// Frame on screen at `ms` into playback. Past the end, the last frame.
    pub fn frame_at(&self, ms: u64) -> Option<&TimelineFrame> {
        let idx = self.offsets().into_iter().take_while(|&start| start <= ms).count();
        idx.checked_sub(1).and_then(|i| self.frames.get(i))
    }

    /// Snapshot of the last frame.
    pub fn final_snapshot(&self) -> Option<&Snapshot> {
        self.frames.last().map(|f| &f.snapshot)
    }

    /// Every effect in playback order.
    pub fn effects(&self) -> impl Iterator<Item = &Effect> + '_ {
        self.frames.iter().flat_map(|f| f.effects.iter())
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Appends frames during resolution.
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    frames: Vec<TimelineFrame>,
}

impl TimelineBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the state and append a frame.
    pub fn push(&mut self, state: &MatchState, effects: Vec<Effect>, delay_ms: u32) {
        self.frames.push(TimelineFrame {
            snapshot: state.snapshot(),
            effects,
            delay_ms,
        });
    }

    /// Frame with no effects.
    pub fn push_plain(&mut self, state: &MatchState, delay_ms: u32) {
        self.push(state, Vec::new(), delay_ms);
    }

    /// Seal into a timeline.
    pub fn finish(self) -> Timeline {
        Timeline { frames: self.frames }
    }
}
