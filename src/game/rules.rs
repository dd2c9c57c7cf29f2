//! Rule Constants
//!
//! Every tunable number of the game in one place. `Default` holds the
//! shipped ruleset.

use serde::{Serialize, Deserialize};

use crate::core::grid::{Board, Cell};

/// Per-character special damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDamage {
    /// Fire: whole row
    pub fire: u32,
    /// Lightning: everything but the caster's cell
    pub lightning: u32,
    /// Wanderer: diagonal neighbours
    pub wanderer: u32,
}

impl Default for SpecialDamage {
    fn default() -> Self {
        Self {
            fire: 4,
            lightning: 2,
            wanderer: 8,
        }
    }
}

/// Configuration for match rules and timeline pacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Board dimensions
    pub board: Board,
    /// Start cell of p1
    pub p1_start: Cell,
    /// Start cell of p2
    pub p2_start: Cell,

    /// Starting and maximum hp
    pub max_hp: u32,
    /// Starting mana
    pub start_mana: u32,
    /// Mana cap
    pub max_mana: u32,
    /// Mana gained per recharge (before capping)
    pub recharge_amount: u32,

    /// Basic attack cost
    pub basic_cost: u32,
    /// Basic attack damage
    pub basic_damage: u32,

    /// Special cost
    pub special_cost: u32,
    /// Special damage per character
    pub special_damage: SpecialDamage,
    /// Number of charge-up beats before a special resolves
    pub special_repeat: u32,

    /// Delay after a successful move (ms)
    pub move_delay_ms: u32,
    /// Delay for short feedback frames (ms)
    pub small_delay_ms: u32,
    /// Delay per projectile cell (ms)
    pub projectile_step_ms: u32,
    /// Delay per special charge beat (ms)
    pub special_beat_ms: u32,
    /// Delay of the opening and settling frames (ms)
    pub pacing_delay_ms: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            board: Board::default(),
            p1_start: Cell::new(0, 1),
            p2_start: Cell::new(4, 1),

            max_hp: 10,
            start_mana: 2,
            max_mana: 10,
            recharge_amount: 2,

            basic_cost: 1,
            basic_damage: 1,

            special_cost: 5,
            special_damage: SpecialDamage::default(),
            special_repeat: 3,

            move_delay_ms: 2000,
            small_delay_ms: 600,
            projectile_step_ms: 560,
            special_beat_ms: 900,
            pacing_delay_ms: 10,
        }
    }
}
