//! Special Shapes
//!
//! Each character's special covers a fixed shape relative to the caster.
//! Coverage is a pure predicate; the highlighted area is that predicate
//! evaluated over the board, so the two can never disagree.

use crate::core::grid::{Board, Cell};
use crate::game::rules::RulesConfig;
use crate::game::state::Character;

/// Whether `character`'s special cast from `caster` reaches `target`.
pub fn covers(character: Character, caster: Cell, target: Cell) -> bool {
    match character {
        Character::Fire => caster.same_row(target),
        Character::Lightning => caster != target,
        Character::Wanderer => caster.is_diagonal_neighbor(target),
    }
}

/// Covered cells clipped to the board, row-major.
pub fn area(character: Character, caster: Cell, board: &Board) -> Vec<Cell> {
    board.cells().filter(|&cell| covers(character, caster, cell)).collect()
}

/// Damage on a hit.
pub fn damage(character: Character, rules: &RulesConfig) -> u32 {
    match character {
        Character::Fire => rules.special_damage.fire,
        Character::Lightning => rules.special_damage.lightning,
        Character::Wanderer => rules.special_damage.wanderer,
    }
}
