//! Action Resolution
//!
//! Applies one queued action for one actor against its opponent and
//! appends the resulting frames. Rule failures are outcomes, not errors:
//! they leave the state as it was and emit a single `invalid` frame.

use crate::core::grid::{Cell, Direction};
use crate::game::action::Action;
use crate::game::special;
use crate::game::state::{MatchState, Slot};
use crate::game::timeline::{Effect, TimelineBuilder};

/// Why an action was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    /// Move would leave the board
    OutOfBounds,
    /// Recharge at the mana cap
    ManaFull,
    /// Not enough mana for the cost
    InsufficientMana {
        /// Cost of the action
        need: u32,
        /// Mana available
        have: u32,
    },
    /// Special without a character
    NoCharacter,
}

/// What a single action did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Position changed
    Moved {
        /// New cell
        to: Cell,
    },
    /// Mana gained
    Recharged {
        /// Actual gain after capping
        gained: u32,
    },
    /// Basic attack landed
    Hit {
        /// Damage dealt
        damage: u32,
    },
    /// Basic attack spent but not aligned
    Missed,
    /// Special resolved; damage if the shape covered the opponent
    SpecialCast {
        /// Damage dealt, if hit
        damage: Option<u32>,
    },
    /// Rejected, nothing changed
    Invalid(InvalidReason),
}

impl ActionOutcome {
    /// Action was rejected.
    pub fn is_invalid(&self) -> bool {
        matches!(self, ActionOutcome::Invalid(_))
    }
}

/// Apply `action` for `slot`, appending its frames to `timeline`.
pub fn apply_action(
    state: &mut MatchState,
    slot: Slot,
    action: Action,
    timeline: &mut TimelineBuilder,
) -> ActionOutcome {
    let outcome = match action {
        Action::Move { dir } => apply_move(state, slot, dir, timeline),
        Action::Recharge => apply_recharge(state, slot, timeline),
        Action::Attack => apply_basic_attack(state, slot, timeline),
        Action::Special => apply_special(state, slot, timeline),
    };

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(
        turn = state.turn,
        slot = %slot,
        action = action.label(),
        outcome = ?outcome,
        "action applied"
    );

    outcome
}

fn reject(
    state: &MatchState,
    slot: Slot,
    reason: InvalidReason,
    timeline: &mut TimelineBuilder,
) -> ActionOutcome {
    timeline.push(state, vec![Effect::invalid(slot)], state.rules.small_delay_ms);
    ActionOutcome::Invalid(reason)
}

/// Spend `cost` mana or report the shortfall.
fn spend_mana(state: &mut MatchState, slot: Slot, cost: u32) -> Result<(), InvalidReason> {
    let actor = state.actor_mut(slot);
    if actor.mana < cost {
        return Err(InvalidReason::InsufficientMana { need: cost, have: actor.mana });
    }
    actor.mana -= cost;
    Ok(())
}

fn apply_move(
    state: &mut MatchState,
    slot: Slot,
    dir: Direction,
    timeline: &mut TimelineBuilder,
) -> ActionOutcome {
    let from = state.actor(slot).pos;
    let Some(to) = state.board().step(from, dir) else {
        return reject(state, slot, InvalidReason::OutOfBounds, timeline);
    };

    state.actor_mut(slot).pos = to;
    timeline.push_plain(state, state.rules.move_delay_ms);
    ActionOutcome::Moved { to }
}

fn apply_recharge(state: &mut MatchState, slot: Slot, timeline: &mut TimelineBuilder) -> ActionOutcome {
    let rules = state.rules;
    if state.actor(slot).mana >= rules.max_mana {
        return reject(state, slot, InvalidReason::ManaFull, timeline);
    }

    let actor = state.actor_mut(slot);
    let before = actor.mana;
    actor.mana = (actor.mana + rules.recharge_amount).min(rules.max_mana);
    let gained = actor.mana - before;
    let cell = actor.pos;

    timeline.push(
        state,
        vec![Effect::Recharge { from: slot, cells: vec![cell], amount: gained }],
        rules.small_delay_ms,
    );
    ActionOutcome::Recharged { gained }
}

fn apply_basic_attack(state: &mut MatchState, slot: Slot, timeline: &mut TimelineBuilder) -> ActionOutcome {
    let rules = state.rules;
    if let Err(reason) = spend_mana(state, slot, rules.basic_cost) {
        return reject(state, slot, reason, timeline);
    }

    let from = state.actor(slot).pos;
    let target = state.actor(slot.other()).pos;

    if !from.same_row(target) {
        timeline.push(state, vec![Effect::AttackSwing { from: slot }], rules.small_delay_ms);
        return ActionOutcome::Missed;
    }

    let dir = Direction::toward_column(from, target);
    let path = state.board().walk(from, dir);
    let projectile = |cell| Effect::Projectile { from: slot, cell, dir };

    // Every cell but the last is pure travel
    let (last, travel) = match path.split_last() {
        Some((last, travel)) => (Some(*last), travel),
        None => (None, &[][..]),
    };
    for &cell in travel {
        timeline.push(state, vec![projectile(cell)], rules.projectile_step_ms);
    }

    let damage = rules.basic_damage;
    state.actor_mut(slot.other()).take_damage(damage);
    let hit = Effect::hit(slot.other(), damage);
    match last {
        Some(cell) => timeline.push(state, vec![projectile(cell), hit], rules.projectile_step_ms),
        None => timeline.push(state, vec![hit], rules.small_delay_ms),
    }
    ActionOutcome::Hit { damage }
}

fn apply_special(state: &mut MatchState, slot: Slot, timeline: &mut TimelineBuilder) -> ActionOutcome {
    let rules = state.rules;
    let Some(character) = state.actor(slot).character else {
        return reject(state, slot, InvalidReason::NoCharacter, timeline);
    };
    if let Err(reason) = spend_mana(state, slot, rules.special_cost) {
        return reject(state, slot, reason, timeline);
    }

    let caster = state.actor(slot).pos;
    let cells = special::area(character, caster, &state.board());
    for _ in 0..rules.special_repeat {
        timeline.push(
            state,
            vec![Effect::Special { from: slot, cells: cells.clone() }],
            rules.special_beat_ms,
        );
    }

    let target = state.actor(slot.other()).pos;
    if !special::covers(character, caster, target) {
        timeline.push_plain(state, rules.small_delay_ms);
        return ActionOutcome::SpecialCast { damage: None };
    }

    let damage = special::damage(character, &rules);
    state.actor_mut(slot.other()).take_damage(damage);
    timeline.push(state, vec![Effect::hit(slot.other(), damage)], rules.small_delay_ms);
    ActionOutcome::SpecialCast { damage: Some(damage) }
}
