//! # Arena Duel Server
//!
//! Authoritative turn resolution for Arena Duel: two players each lock in
//! three actions, then the server resolves them alternately on a 5x3 board
//! and streams back a timeline of frames.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ARENA DUEL SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── grid.rs     - Board, cells, directions                  │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - Snapshot hashing                          │
//! │                                                              │
//! │  game/           - Turn engine (deterministic)               │
//! │  ├── rules.rs    - Costs, damage, pacing delays              │
//! │  ├── action.rs   - Actions and the 3-action queue            │
//! │  ├── state.rs    - Actors, phase, boundary operations        │
//! │  ├── special.rs  - Per-character special shapes              │
//! │  ├── resolve.rs  - Single-action resolution                  │
//! │  ├── turn.rs     - Interleaving, lethality, replay           │
//! │  └── timeline.rs - Frames streamed to clients                │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server and config               │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - Match session management                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/` and `game/` never read clocks or perform I/O, iterate only
//! ordered collections, and draw randomness solely from the match seed.
//! Replaying the same queues from the same seed yields the same timelines
//! and state hashes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::grid::{Board, Cell, Direction};
pub use core::rng::DeterministicRng;
pub use game::action::{Action, ActionQueue};
pub use game::state::{Character, MatchError, MatchState, Slot, Snapshot, Winner};
pub use game::turn::{resolve_turn, TurnResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
