//! Match State Definitions
//!
//! Actors, match phase and the boundary operations that mutate a match
//! from the outside: character selection, queue submission and retry.
//! Turn resolution itself lives in [`crate::game::turn`].

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::core::grid::{Board, Cell};
use crate::core::hash::{StateHash, StateHasher};
use crate::core::rng::{derive_match_seed, DeterministicRng};
use crate::game::action::{Action, ActionQueue};
use crate::game::rules::RulesConfig;
use crate::game::turn::{resolve_turn, TurnResult};

// =============================================================================
// SLOT
// =============================================================================

/// One of the two player seats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// First seat, starts on the left
    P1,
    /// Second seat, starts on the right
    P2,
}

impl Slot {
    /// Both slots in seat order.
    pub const BOTH: [Slot; 2] = [Slot::P1, Slot::P2];

    /// The opponent's slot.
    #[inline]
    pub const fn other(self) -> Slot {
        match self {
            Slot::P1 => Slot::P2,
            Slot::P2 => Slot::P1,
        }
    }

    /// Who acts first on a given turn: p1 on odd turns, p2 on even.
    #[inline]
    pub const fn starter_for_turn(turn: u32) -> Slot {
        if turn % 2 == 1 {
            Slot::P1
        } else {
            Slot::P2
        }
    }

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Slot::P1 => "p1",
            Slot::P2 => "p2",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CHARACTER
// =============================================================================

/// Playable character. Determines the special's shape and damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Character {
    /// Row-wide blast
    Fire = 0,
    /// Hits everything but the caster's own cell
    Lightning = 1,
    /// Heavy hit on the four diagonal neighbours
    Wanderer = 2,
}

impl Character {
    /// All characters.
    pub const ALL: [Character; 3] = [Character::Fire, Character::Lightning, Character::Wanderer];

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Character::Fire => "fire",
            Character::Lightning => "lightning",
            Character::Wanderer => "wanderer",
        }
    }
}

impl FromStr for Character {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Character::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MatchError::UnknownCharacter(s.to_string()))
    }
}

// =============================================================================
// ARENA
// =============================================================================

/// Cosmetic arena backdrop. Picked by the match RNG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Arena {
    /// Rope bridge
    Bridge = 0,
    /// Ruined temple
    Temple = 1,
    /// Crystal cavern
    Cavern = 2,
    /// Ash wasteland
    Wasteland = 3,
}

impl Arena {
    /// All arenas.
    pub const ALL: [Arena; 4] = [Arena::Bridge, Arena::Temple, Arena::Cavern, Arena::Wasteland];

    /// Pick one with the match RNG.
    pub fn pick(rng: &mut DeterministicRng) -> Arena {
        rng.pick(&Arena::ALL).unwrap_or(Arena::Bridge)
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// Per-player combat state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Seat
    pub slot: Slot,
    /// Board position
    pub pos: Cell,
    /// Hit points, `0..=max_hp`
    pub hp: u32,
    /// Mana, `0..=max_mana`
    pub mana: u32,
    /// Chosen character
    pub character: Option<Character>,
    /// Queue submitted for the current turn
    pub locked: bool,
    /// Private queue, consumed by resolution
    #[serde(skip)]
    pub queue: Option<ActionQueue>,
}

impl Actor {
    /// Fresh actor at its start square.
    pub fn new(slot: Slot, rules: &RulesConfig) -> Self {
        let pos = match slot {
            Slot::P1 => rules.p1_start,
            Slot::P2 => rules.p2_start,
        };
        Self {
            slot,
            pos,
            hp: rules.max_hp,
            mana: rules.start_mana,
            character: None,
            locked: false,
            queue: None,
        }
    }

    /// Out of hit points.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.hp == 0
    }

    /// Reduce hp, flooring at zero.
    pub fn take_damage(&mut self, amount: u32) {
        self.hp = self.hp.saturating_sub(amount);
    }

    /// Public view for snapshots.
    pub fn view(&self) -> ActorView {
        ActorView {
            slot: self.slot,
            x: self.pos.x,
            y: self.pos.y,
            hp: self.hp,
            mana: self.mana,
            character: self.character,
            locked: self.locked,
        }
    }
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Match result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// p1 won
    P1,
    /// p2 won
    P2,
    /// Both fell on the same sub-action
    Draw,
}


/// Current phase of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MatchPhase {
    /// At least one player still has to pick a character
    #[default]
    AwaitingSelection,
    /// Waiting for both lock-ins
    AwaitingQueues,
    /// Turn being resolved
    Resolving,
    /// Terminal until retry
    Ended {
        /// Result
        winner: Winner,
    },
}

impl MatchPhase {
    fn hash_code(self) -> u8 {
        match self {
            MatchPhase::AwaitingSelection => 0,
            MatchPhase::AwaitingQueues => 1,
            MatchPhase::Resolving => 2,
            MatchPhase::Ended { winner: Winner::P1 } => 3,
            MatchPhase::Ended { winner: Winner::P2 } => 4,
            MatchPhase::Ended { winner: Winner::Draw } => 5,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Public per-actor view. Queues are never exposed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorView {
    /// Seat
    pub slot: Slot,
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
    /// Hit points
    pub hp: u32,
    /// Mana
    pub mana: u32,
    /// Chosen character
    pub character: Option<Character>,
    /// Locked in for this turn
    pub locked: bool,
}

impl ActorView {
    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.slot as u8);
        hasher.update_cell(Cell::new(self.x, self.y));
        hasher.update_u32(self.hp);
        hasher.update_u32(self.mana);
        hasher.update_opt_u8(self.character.map(|c| c as u8));
        hasher.update_bool(self.locked);
    }
}

/// Full public state at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Board dimensions
    pub board: Board,
    /// p1 view
    pub p1: ActorView,
    /// p2 view
    pub p2: ActorView,
    /// Arena backdrop
    pub arena: Arena,
    /// Turn counter (1-based)
    pub turn: u32,
    /// Who acts first this turn
    pub starter: Slot,
    /// Match phase
    pub phase: MatchPhase,
}

impl Snapshot {
    /// SHA-256 fingerprint over every public field.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_snapshot();
        hasher.update_i32(self.board.width);
        hasher.update_i32(self.board.height);
        self.p1.hash_into(&mut hasher);
        self.p2.hash_into(&mut hasher);
        hasher.update_u8(self.arena as u8);
        hasher.update_u32(self.turn);
        hasher.update_u8(self.starter as u8);
        hasher.update_u8(self.phase.hash_code());
        hasher.finalize()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Rejected boundary operation. State is untouched whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Lock-in did not carry exactly three actions
    #[error("Queue must hold exactly 3 actions, got {0}")]
    InvalidQueueLength(usize),

    /// Lock-in before choosing a character
    #[error("Character not selected")]
    CharacterNotSelected,

    /// Second lock-in for the same turn, or selection after locking
    #[error("Already locked in for this turn")]
    AlreadyLocked,

    /// Character selection after turn 1
    #[error("Character selection is closed")]
    SelectionClosed,

    /// Operation on an ended match
    #[error("Match has ended")]
    MatchEnded,

    /// Unrecognised character id
    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    /// Internal state inconsistency
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Result of a lock-in.
#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    /// Stored; waiting for the opponent
    Pending,
    /// Second lock-in; the turn was resolved
    Resolved(TurnResult),
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one match.
#[derive(Clone, Debug)]
pub struct MatchState {
    /// Match identifier
    pub match_id: [u8; 16],

    /// Arena pick RNG
    pub rng: DeterministicRng,

    /// Rule constants
    pub rules: RulesConfig,

    /// Turn counter (1-based)
    pub turn: u32,

    /// Who acts first this turn
    pub starter: Slot,

    /// Current phase
    pub phase: MatchPhase,

    /// Cosmetic arena
    pub arena: Arena,

    /// First seat
    pub p1: Actor,

    /// Second seat
    pub p2: Actor,
}

impl MatchState {
    /// Create a match with the default rules, seeded from its id.
    pub fn new(match_id: [u8; 16]) -> Self {
        Self::with_rules(match_id, derive_match_seed(&match_id), RulesConfig::default())
    }

    /// Create a match with explicit seed and rules.
    pub fn with_rules(match_id: [u8; 16], rng_seed: u64, rules: RulesConfig) -> Self {
        let mut rng = DeterministicRng::new(rng_seed);
        let arena = Arena::pick(&mut rng);
        Self {
            match_id,
            rng,
            rules,
            turn: 1,
            starter: Slot::starter_for_turn(1),
            phase: MatchPhase::AwaitingSelection,
            arena,
            p1: Actor::new(Slot::P1, &rules),
            p2: Actor::new(Slot::P2, &rules),
        }
    }

    /// Board dimensions.
    #[inline]
    pub fn board(&self) -> Board {
        self.rules.board
    }

    /// Actor in a slot.
    pub fn actor(&self, slot: Slot) -> &Actor {
        match slot {
            Slot::P1 => &self.p1,
            Slot::P2 => &self.p2,
        }
    }

    /// Mutable actor in a slot.
    pub fn actor_mut(&mut self, slot: Slot) -> &mut Actor {
        match slot {
            Slot::P1 => &mut self.p1,
            Slot::P2 => &mut self.p2,
        }
    }

    /// Match is over.
    pub fn is_ended(&self) -> bool {
        matches!(self.phase, MatchPhase::Ended { .. })
    }

    /// Result if either actor is down.
    pub fn winner_now(&self) -> Option<Winner> {
        match (self.p1.is_dead(), self.p2.is_dead()) {
            (true, true) => Some(Winner::Draw),
            (true, false) => Some(Winner::P2),
            (false, true) => Some(Winner::P1),
            (false, false) => None,
        }
    }

    /// Public snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            board: self.rules.board,
            p1: self.p1.view(),
            p2: self.p2.view(),
            arena: self.arena,
            turn: self.turn,
            starter: self.starter,
            phase: self.phase,
        }
    }

    /// Hash of the public state.
    pub fn compute_hash(&self) -> StateHash {
        self.snapshot().compute_hash()
    }

    /// Choose (or re-choose) a character.
    ///
    /// Only on turn 1, before this slot locks in.
    pub fn select_character(&mut self, slot: Slot, character: Character) -> Result<(), MatchError> {
        if self.is_ended() {
            return Err(MatchError::MatchEnded);
        }
        if self.turn != 1 {
            return Err(MatchError::SelectionClosed);
        }
        if self.actor(slot).locked {
            return Err(MatchError::AlreadyLocked);
        }

        self.actor_mut(slot).character = Some(character);

        if self.phase == MatchPhase::AwaitingSelection
            && self.p1.character.is_some()
            && self.p2.character.is_some()
        {
            self.phase = MatchPhase::AwaitingQueues;
        }
        Ok(())
    }

    /// Lock in a queue. The second lock-in resolves the turn.
    pub fn submit_queue(&mut self, slot: Slot, actions: Vec<Action>) -> Result<SubmitOutcome, MatchError> {
        if self.is_ended() {
            return Err(MatchError::MatchEnded);
        }
        let queue = ActionQueue::try_from(actions)
            .map_err(|e| MatchError::InvalidQueueLength(e.0))?;

        let actor = self.actor_mut(slot);
        if actor.character.is_none() {
            return Err(MatchError::CharacterNotSelected);
        }
        if actor.locked {
            return Err(MatchError::AlreadyLocked);
        }
        actor.queue = Some(queue);
        actor.locked = true;

        if self.p1.locked && self.p2.locked {
            resolve_turn(self).map(SubmitOutcome::Resolved)
        } else {
            Ok(SubmitOutcome::Pending)
        }
    }

    /// Reset everything except identity and RNG stream. A new arena is drawn.
    pub fn retry(&mut self) {
        self.arena = Arena::pick(&mut self.rng);
        self.turn = 1;
        self.starter = Slot::starter_for_turn(1);
        self.phase = MatchPhase::AwaitingSelection;
        self.p1 = Actor::new(Slot::P1, &self.rules);
        self.p2 = Actor::new(Slot::P2, &self.rules);
    }

    /// A slot's connection went away.
    ///
    /// Before play starts only that actor is reset. Once a turn has been
    /// resolved (or the match ended) the whole match is retried, since a
    /// fresh player could no longer pick a character. Returns `true` when
    /// a full retry happened.
    pub fn reset_slot(&mut self, slot: Slot) -> bool {
        if self.turn > 1 || self.is_ended() {
            self.retry();
            return true;
        }
        *self.actor_mut(slot) = Actor::new(slot, &self.rules);
        if self.phase == MatchPhase::AwaitingQueues {
            self.phase = MatchPhase::AwaitingSelection;
        }
        false
    }
}

// =============================================================================
// TESTS
// =============================================================================
