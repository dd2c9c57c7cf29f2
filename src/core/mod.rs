//! Core deterministic primitives.
//!
//! Board geometry, the seeded PRNG and the state hasher. Nothing here
//! knows about game rules.

pub mod grid;
pub mod rng;
pub mod hash;

// Re-export core types
pub use grid::{Board, Cell, Direction};
pub use rng::DeterministicRng;
pub use hash::{StateHash, StateHasher};
