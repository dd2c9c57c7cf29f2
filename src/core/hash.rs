//! Snapshot Hashing
//!
//! SHA-256 over a fixed field order. Clients and replays compare these
//! digests to confirm they hold the same authoritative state.

use sha2::{Digest, Sha256};

use super::grid::Cell;

/// 32-byte SHA-256 digest.
pub type StateHash = [u8; 32];

/// Domain tag prefixed to every snapshot digest.
const SNAPSHOT_DOMAIN: &[u8] = b"ARENA_DUEL_SNAPSHOT_V1";

/// Sentinel for an absent optional byte.
const NONE_BYTE: u8 = 0xFF;

/// Incremental snapshot hasher. Call order is part of the format.
pub struct StateHasher {
    inner: Sha256,
}

impl StateHasher {
    /// Hasher under an arbitrary domain tag.
    pub fn new(domain: &[u8]) -> Self {
        Self { inner: Sha256::new_with_prefix(domain) }
    }

    /// Hasher for match snapshots.
    pub fn for_snapshot() -> Self {
        Self::new(SNAPSHOT_DOMAIN)
    }

    /// Single byte.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.inner.update([value]);
    }

    /// Little-endian u32.
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.inner.update(value.to_le_bytes());
    }

    /// Little-endian i32.
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.inner.update(value.to_le_bytes());
    }

    /// Boolean as 0 or 1.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(u8::from(value));
    }

    /// Optional byte; `None` hashes as `0xFF`.
    pub fn update_opt_u8(&mut self, value: Option<u8>) {
        self.update_u8(value.unwrap_or(NONE_BYTE));
    }

    /// Board cell as `x` then `y`.
    pub fn update_cell(&mut self, cell: Cell) {
        self.update_i32(cell.x);
        self.update_i32(cell.y);
    }

    /// Consume and return the digest.
    pub fn finalize(self) -> StateHash {
        self.inner.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(build: impl FnOnce(&mut StateHasher)) -> StateHash {
        let mut hasher = StateHasher::for_snapshot();
        build(&mut hasher);
        hasher.finalize()
    }

    #[test]
    fn test_hash_is_stable() {
        let build = |h: &mut StateHasher| {
            h.update_cell(Cell::new(4, 1));
            h.update_u32(10);
            h.update_opt_u8(Some(2));
            h.update_bool(true);
        };
        assert_eq!(digest(build), digest(build));
    }

    #[test]
    fn test_field_order_matters() {
        let a = digest(|h| h.update_cell(Cell::new(1, 2)));
        let b = digest(|h| h.update_cell(Cell::new(2, 1)));
        assert_ne!(a, b);
    }

    #[test]
    fn test_none_distinct_from_zero() {
        let none = digest(|h| h.update_opt_u8(None));
        let zero = digest(|h| h.update_opt_u8(Some(0)));
        assert_ne!(none, zero);
    }

    #[test]
    fn test_domain_separates() {
        let mut other = StateHasher::new(b"OTHER");
        other.update_u32(1);
        assert_ne!(other.finalize(), digest(|h| h.update_u32(1)));
    }
}
