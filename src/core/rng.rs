//! Match RNG
//!
//! Xorshift128+ seeded through SplitMix64. The arena pick is the only
//! consumer; combat never draws from it, so two matches with the same
//! queues resolve identically regardless of seed.

use sha2::{Digest, Sha256};

/// Seeded PRNG owned by a match.
///
/// ```
/// use arena_duel::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(7);
/// let mut b = DeterministicRng::new(7);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterministicRng {
    s0: u64,
    s1: u64,
}

impl DeterministicRng {
    /// Expand a 64-bit seed into generator state.
    pub fn new(seed: u64) -> Self {
        let mut cursor = seed;
        let s0 = splitmix64(&mut cursor);
        let s1 = splitmix64(&mut cursor);

        // Zero state is a fixed point
        if (s0 | s1) == 0 {
            return Self { s0: 1, s1: 1 };
        }
        Self { s0, s1 }
    }

    /// Next raw output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let (a, mut b) = (self.s0, self.s1);
        let out = a.wrapping_add(b);

        b ^= a;
        self.s0 = a.rotate_left(24) ^ b ^ (b << 16);
        self.s1 = b.rotate_left(37);

        out
    }

    /// Uniform-ish index below `len`, or `None` for an empty range.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| (self.next_u64() % len as u64) as usize)
    }

    /// Copy out one element of `items`.
    pub fn pick<T: Copy>(&mut self, items: &[T]) -> Option<T> {
        self.index(items.len()).map(|i| items[i])
    }
}

#[inline]
fn splitmix64(cursor: &mut u64) -> u64 {
    *cursor = cursor.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *cursor;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for a match, taken from the first 8 bytes of
/// `SHA-256("ARENA_DUEL_SEED_V1" || match_id)`.
pub fn derive_match_seed(match_id: &[u8; 16]) -> u64 {
    let digest = Sha256::new()
        .chain_update(b"ARENA_DUEL_SEED_V1")
        .chain_update(match_id)
        .finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}
