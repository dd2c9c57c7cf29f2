//! Turn Resolution
//!
//! Interleaves both locked queues into one deterministic sequence:
//! `starter[0], other[0], starter[1], other[1], starter[2], other[2]`.
//! A lethality check runs after every sub-action and halts the turn as
//! soon as anyone is down.
//!
//! Resolution is a plain synchronous function over `&mut MatchState`. The
//! same queues from the same state always yield the same timeline and the
//! same final hash.

use serde::{Serialize, Deserialize};
use tracing::{debug, error};

use crate::core::hash::StateHash;
use crate::game::action::{Action, ActionQueue, QUEUE_LEN};
use crate::game::resolve::{apply_action, ActionOutcome};
use crate::game::state::{MatchError, MatchPhase, MatchState, Slot, SubmitOutcome, Winner};
use crate::game::timeline::{Timeline, TimelineBuilder};

/// How a resolved turn left the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Play continues on `turn`
    Continued {
        /// The new turn number
        turn: u32,
    },
    /// Someone fell
    Ended {
        /// Result
        winner: Winner,
    },
}

/// One executed sub-action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRecord {
    /// Queue index (0-based)
    pub step: usize,
    /// Acting slot
    pub slot: Slot,
    /// Action taken
    pub action: Action,
    /// What it did
    pub outcome: ActionOutcome,
}

/// Result of resolving one turn.
#[derive(Clone, Debug)]
pub struct TurnResult {
    /// Turn number that was resolved
    pub turn: u32,
    /// Frames to stream to clients
    pub timeline: Timeline,
    /// Where the match stands afterwards
    pub outcome: TurnOutcome,
    /// Sub-actions actually executed, in order
    pub steps: Vec<StepRecord>,
    /// Hash of the post-turn state
    pub state_hash: StateHash,
}

impl TurnResult {
    /// Match ended this turn.
    pub fn match_ended(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Ended { .. })
    }
}

/// Both players' queues for one turn, as recorded for replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedTurn {
    /// p1's lock-in
    pub p1: Vec<Action>,
    /// p2's lock-in
    pub p2: Vec<Action>,
}

impl RecordedTurn {
    /// Record from two fixed queues.
    pub fn new(p1: [Action; QUEUE_LEN], p2: [Action; QUEUE_LEN]) -> Self {
        Self { p1: p1.to_vec(), p2: p2.to_vec() }
    }
}

/// Resolve the current turn. Both actors must hold a queue.
///
/// On an invariant failure the state is left untouched.
pub fn resolve_turn(state: &mut MatchState) -> Result<TurnResult, MatchError> {
    if state.is_ended() {
        error!(turn = state.turn, "resolve called on ended match");
        return Err(MatchError::Invariant("match already ended".into()));
    }
    let queues: [(Slot, ActionQueue); 2] = match (state.p1.queue, state.p2.queue) {
        (Some(p1), Some(p2)) => {
            let starter = state.starter;
            let pick = |slot: Slot| if slot == Slot::P1 { p1 } else { p2 };
            [(starter, pick(starter)), (starter.other(), pick(starter.other()))]
        }
        _ => {
            error!(
                turn = state.turn,
                p1_locked = state.p1.queue.is_some(),
                p2_locked = state.p2.queue.is_some(),
                "resolve called without both queues"
            );
            return Err(MatchError::Invariant("resolve without both queues".into()));
        }
    };

    let turn = state.turn;
    state.phase = MatchPhase::Resolving;

    let mut timeline = TimelineBuilder::new();
    let mut steps = Vec::with_capacity(QUEUE_LEN * 2);
    timeline.push_plain(state, state.rules.pacing_delay_ms);

    let mut winner = None;
    'steps: for step in 0..QUEUE_LEN {
        for (slot, queue) in &queues {
            let Some(action) = queue.get(step) else { continue };
            let outcome = apply_action(state, *slot, action, &mut timeline);
            steps.push(StepRecord { step, slot: *slot, action, outcome });

            if let Some(w) = state.winner_now() {
                winner = Some(w);
                break 'steps;
            }
        }
    }

    for slot in Slot::BOTH {
        let actor = state.actor_mut(slot);
        actor.locked = false;
        actor.queue = None;
    }

    let outcome = match winner {
        Some(winner) => {
            state.phase = MatchPhase::Ended { winner };
            TurnOutcome::Ended { winner }
        }
        None => {
            state.turn += 1;
            state.starter = Slot::starter_for_turn(state.turn);
            state.phase = MatchPhase::AwaitingQueues;
            TurnOutcome::Continued { turn: state.turn }
        }
    };

    // Settle frame carries the full post-turn state
    timeline.push_plain(state, state.rules.pacing_delay_ms);
    let timeline = timeline.finish();
    let state_hash = state.compute_hash();

    debug!(
        turn,
        steps = steps.len(),
        frames = timeline.len(),
        duration_ms = timeline.total_duration_ms(),
        outcome = ?outcome,
        hash = %hex::encode(&state_hash[..8]),
        "turn resolved"
    );

    Ok(TurnResult { turn, timeline, outcome, steps, state_hash })
}

/// Re-run recorded turns from an initial state.
///
/// Both actors must already have characters. Stops early if the match
/// ends. Returns the final state and every turn result.
pub fn replay_turns(
    initial: MatchState,
    turns: &[RecordedTurn],
) -> Result<(MatchState, Vec<TurnResult>), MatchError> {
    let mut state = initial;
    let mut results = Vec::with_capacity(turns.len());

    for recorded in turns {
        if state.is_ended() {
            break;
        }
        state.submit_queue(Slot::P1, recorded.p1.clone())?;
        match state.submit_queue(Slot::P2, recorded.p2.clone())? {
            SubmitOutcome::Resolved(result) => results.push(result),
            SubmitOutcome::Pending => {
                return Err(MatchError::Invariant("replayed turn did not resolve".into()));
            }
        }
    }

    Ok((state, results))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::{Cell, Direction};
    use crate::game::resolve::InvalidReason;
    use crate::game::state::Character;
    use crate::game::timeline::Effect;
    use proptest::prelude::*;

    fn ready(p1: Character, p2: Character) -> MatchState {
        let mut state = MatchState::new([5; 16]);
        state.select_character(Slot::P1, p1).unwrap();
        state.select_character(Slot::P2, p2).unwrap();
        state
    }

    fn lock_both(state: &mut MatchState, p1: Vec<Action>, p2: Vec<Action>) -> TurnResult {
        assert!(matches!(state.submit_queue(Slot::P1, p1).unwrap(), SubmitOutcome::Pending));
        match state.submit_queue(Slot::P2, p2).unwrap() {
            SubmitOutcome::Resolved(result) => result,
            SubmitOutcome::Pending => panic!("second lock should resolve"),
        }
    }

    #[test]
    fn test_interleaved_order() {
        let mut state = ready(Character::Fire, Character::Fire);
        let result = lock_both(
            &mut state,
            vec![Action::Recharge, Action::step(Direction::Right), Action::Recharge],
            vec![Action::step(Direction::Up), Action::Recharge, Action::step(Direction::Down)],
        );

        let order: Vec<(usize, Slot)> = result.steps.iter().map(|s| (s.step, s.slot)).collect();
        assert_eq!(
            order,
            vec![
                (0, Slot::P1), (0, Slot::P2),
                (1, Slot::P1), (1, Slot::P2),
                (2, Slot::P1), (2, Slot::P2),
            ]
        );
    }

    #[test]
    fn test_starter_first_on_even_turn() {
        let mut state = ready(Character::Fire, Character::Fire);
        lock_both(&mut state, vec![Action::Recharge; 3], vec![Action::Recharge; 3]);
        assert_eq!(state.starter, Slot::P2);

        let result = lock_both(&mut state, vec![Action::step(Direction::Up); 3], vec![Action::step(Direction::Up); 3]);
        assert_eq!(result.steps[0].slot, Slot::P2);
        assert_eq!(result.steps[1].slot, Slot::P1);
    }

    #[test]
    fn test_turn_advances_and_clears_locks() {
        let mut state = ready(Character::Fire, Character::Fire);
        let result = lock_both(&mut state, vec![Action::Recharge; 3], vec![Action::Recharge; 3]);

        assert_eq!(result.turn, 1);
        assert_eq!(result.outcome, TurnOutcome::Continued { turn: 2 });
        assert_eq!(state.turn, 2);
        assert_eq!(state.phase, MatchPhase::AwaitingQueues);
        assert!(!state.p1.locked && !state.p2.locked);
        assert!(state.p1.queue.is_none() && state.p2.queue.is_none());
        // 2 -> 4 -> 6 -> 8
        assert_eq!(state.p1.mana, 8);
    }

    #[test]
    fn test_timeline_framing() {
        let mut state = ready(Character::Fire, Character::Fire);
        let result = lock_both(&mut state, vec![Action::Recharge; 3], vec![Action::Recharge; 3]);
        let frames = result.timeline.frames();

        // pacing + 6 recharges + settle
        assert_eq!(frames.len(), 8);
        assert_eq!(frames[0].delay_ms, 10);
        assert!(frames[0].effects.is_empty());
        assert_eq!(frames[0].snapshot.phase, MatchPhase::Resolving);

        let settle = &frames[7];
        assert_eq!(settle.delay_ms, 10);
        assert!(settle.effects.is_empty());
        assert_eq!(settle.snapshot, state.snapshot());
        assert_eq!(settle.snapshot.turn, 2);
        assert!(!settle.snapshot.p1.locked);
        assert_eq!(result.state_hash, state.compute_hash());
    }

    #[test]
    fn test_resolve_without_queues_is_invariant_error() {
        let mut state = ready(Character::Fire, Character::Fire);
        state.p1.queue = ActionQueue::try_from(vec![Action::Recharge; 3]).ok();
        let before = state.compute_hash();

        let err = resolve_turn(&mut state).unwrap_err();

        assert!(matches!(err, MatchError::Invariant(_)));
        assert_eq!(state.compute_hash(), before);
        assert_eq!(state.phase, MatchPhase::AwaitingQueues);
    }

    /// p1 moves right then attacks twice; p2 attacks three times.
    #[test]
    fn test_scenario_move_then_trade_attacks() {
        let mut state = ready(Character::Fire, Character::Lightning);
        let result = lock_both(
            &mut state,
            vec![Action::step(Direction::Right), Action::Attack, Action::Attack],
            vec![Action::Attack, Action::Attack, Action::Attack],
        );

        assert_eq!(state.p1.pos, Cell::new(1, 1));
        // p1: 2 mana, two attacks land
        assert_eq!(state.p1.mana, 0);
        assert_eq!(state.p2.hp, 8);
        // p2: 2 mana, third attack rejected
        assert_eq!(state.p2.mana, 0);
        assert_eq!(state.p1.hp, 8);
        assert_eq!(
            result.steps[5].outcome,
            ActionOutcome::Invalid(InvalidReason::InsufficientMana { need: 1, have: 0 })
        );

        let hits = result.timeline.effects().filter(|e| matches!(e, Effect::Hit { .. })).count();
        assert_eq!(hits, 4);
        let invalid = result.timeline.effects().filter(|e| matches!(e, Effect::Invalid { .. })).count();
        assert_eq!(invalid, 1);
        assert_eq!(result.timeline.final_snapshot(), Some(&state.snapshot()));
    }

    #[test]
    fn test_scenario_retry_mid_match() {
        let mut state = ready(Character::Wanderer, Character::Fire);
        lock_both(&mut state, vec![Action::Attack; 3], vec![Action::Recharge; 3]);
        assert_eq!(state.turn, 2);
        assert!(state.p2.hp < 10);

        state.retry();

        assert_eq!(state.turn, 1);
        assert_eq!(state.starter, Slot::P1);
        assert_eq!(state.phase, MatchPhase::AwaitingSelection);
        assert_eq!(state.p1.pos, Cell::new(0, 1));
        assert_eq!(state.p2.hp, 10);
        assert_eq!(state.p1.mana, 2);
        assert!(state.p1.character.is_none());
        assert_eq!(
            state.submit_queue(Slot::P1, vec![Action::Recharge; 3]).unwrap_err(),
            MatchError::CharacterNotSelected
        );
    }

    #[test]
    fn test_lethal_halts_resolution() {
        let mut state = ready(Character::Wanderer, Character::Fire);
        state.p1.pos = Cell::new(1, 0);
        state.p2.pos = Cell::new(2, 1);
        state.p1.mana = 10;
        state.p2.hp = 8;

        let result = lock_both(
            &mut state,
            vec![Action::Special, Action::Recharge, Action::Recharge],
            vec![Action::Recharge, Action::Recharge, Action::Recharge],
        );

        assert_eq!(result.outcome, TurnOutcome::Ended { winner: Winner::P1 });
        assert_eq!(state.phase, MatchPhase::Ended { winner: Winner::P1 });
        // Only p1's special ran
        assert_eq!(result.steps.len(), 1);
        assert_eq!(state.p2.mana, 2);
        assert_eq!(state.turn, 1);
        assert_eq!(result.timeline.final_snapshot(), Some(&state.snapshot()));

        let err = state.submit_queue(Slot::P1, vec![Action::Recharge; 3]).unwrap_err();
        assert_eq!(err, MatchError::MatchEnded);
    }

    #[test]
    fn test_second_mover_lethal_is_win_not_draw() {
        let mut state = ready(Character::Fire, Character::Fire);
        state.p1.hp = 1;
        state.p2.hp = 1;
        let result = lock_both(
            &mut state,
            vec![Action::Recharge, Action::Recharge, Action::Recharge],
            vec![Action::Attack, Action::Attack, Action::Attack],
        );
        assert_eq!(result.outcome, TurnOutcome::Ended { winner: Winner::P2 });
        assert_eq!(result.steps.len(), 2);
    }

    #[test]
    fn test_first_lethal_hit_decides() {
        let mut state = ready(Character::Lightning, Character::Lightning);
        state.p1.mana = 5;
        state.p1.hp = 1;
        state.p2.hp = 2;
        let result = lock_both(
            &mut state,
            vec![Action::Special, Action::Recharge, Action::Recharge],
            vec![Action::Attack, Action::Recharge, Action::Recharge],
        );
        // p2's attack would have been lethal but never runs
        assert_eq!(result.outcome, TurnOutcome::Ended { winner: Winner::P1 });
        assert_eq!(state.p1.hp, 1);
        assert_eq!(state.p2.mana, 2);
    }

    #[test]
    fn test_starter_alternates_over_turns() {
        let mut state = ready(Character::Fire, Character::Fire);
        for n in 1..=8u32 {
            assert_eq!(state.turn, n);
            let expected = if n % 2 == 1 { Slot::P1 } else { Slot::P2 };
            assert_eq!(state.starter, expected);
            let result = lock_both(
                &mut state,
                vec![Action::step(Direction::Up); 3],
                vec![Action::step(Direction::Down); 3],
            );
            assert_eq!(result.steps[0].slot, expected);
        }
    }

    #[test]
    fn test_replay_determinism() {
        let turns = vec![
            RecordedTurn::new(
                [Action::step(Direction::Right), Action::Recharge, Action::Attack],
                [Action::Recharge, Action::step(Direction::Up), Action::Attack],
            ),
            RecordedTurn::new(
                [Action::Recharge, Action::Special, Action::step(Direction::Down)],
                [Action::step(Direction::Down), Action::Attack, Action::Recharge],
            ),
            RecordedTurn::new(
                [Action::Attack, Action::Attack, Action::Special],
                [Action::Special, Action::Recharge, Action::Attack],
            ),
        ];

        let (final1, results1) =
            replay_turns(ready(Character::Fire, Character::Wanderer), &turns).unwrap();
        let (final2, results2) =
            replay_turns(ready(Character::Fire, Character::Wanderer), &turns).unwrap();

        assert_eq!(final1.compute_hash(), final2.compute_hash());
        assert_eq!(results1.len(), results2.len());
        for (a, b) in results1.iter().zip(&results2) {
            assert_eq!(a.timeline, b.timeline);
            assert_eq!(a.state_hash, b.state_hash);
            assert_eq!(a.steps, b.steps);
        }
    }

    #[test]
    fn test_replay_stops_after_end() {
        let mut initial = ready(Character::Fire, Character::Fire);
        initial.p2.hp = 1;
        let turns = vec![
            RecordedTurn::new([Action::Attack; 3], [Action::Recharge; 3]),
            RecordedTurn::new([Action::Recharge; 3], [Action::Recharge; 3]),
        ];
        let (state, results) = replay_turns(initial, &turns).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].match_ended());
        assert_eq!(state.phase, MatchPhase::Ended { winner: Winner::P1 });
    }

    #[test]
    fn test_turn_outcome_wire_format() {
        let json = serde_json::to_string(&TurnOutcome::Ended { winner: Winner::Draw }).unwrap();
        assert_eq!(json, r#"{"result":"ended","winner":"draw"}"#);
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            prop::sample::select(Direction::ALL.to_vec()).prop_map(Action::step),
            Just(Action::Recharge),
            Just(Action::Attack),
            Just(Action::Special),
        ]
    }

    fn queue_strategy() -> impl Strategy<Value = Vec<Action>> {
        prop::collection::vec(action_strategy(), QUEUE_LEN)
    }

    proptest! {
        #[test]
        fn prop_final_frame_matches_state(
            p1 in queue_strategy(),
            p2 in queue_strategy(),
            c1 in prop::sample::select(Character::ALL.to_vec()),
            c2 in prop::sample::select(Character::ALL.to_vec()),
        ) {
            let mut state = ready(c1, c2);
            let result = lock_both(&mut state, p1, p2);

            prop_assert!(!result.timeline.is_empty());
            prop_assert_eq!(result.timeline.final_snapshot(), Some(&state.snapshot()));
            prop_assert!(state.p1.hp <= 10 && state.p2.hp <= 10);
            prop_assert!(state.p1.mana <= 10 && state.p2.mana <= 10);
            prop_assert!(state.board().contains(state.p1.pos));
            prop_assert!(state.board().contains(state.p2.pos));
        }

        #[test]
        fn prop_same_inputs_same_hash(turns in prop::collection::vec((queue_strategy(), queue_strategy()), 1..6)) {
            let recorded: Vec<RecordedTurn> = turns
                .into_iter()
                .map(|(p1, p2)| RecordedTurn { p1, p2 })
                .collect();
            let (a, ra) = replay_turns(ready(Character::Lightning, Character::Wanderer), &recorded).unwrap();
            let (b, rb) = replay_turns(ready(Character::Lightning, Character::Wanderer), &recorded).unwrap();
            prop_assert_eq!(a.compute_hash(), b.compute_hash());
            prop_assert_eq!(ra.len(), rb.len());
            for (x, y) in ra.iter().zip(&rb) {
                prop_assert_eq!(&x.timeline, &y.timeline);
            }
        }
    }
}
