//! Dual hashing.
//!
//! Every key needs two statistically independent 64-bit hashes: they
//! select the element's primary and secondary buckets, and each bucket
//! stores a byte of the *other* hash as its lookup fingerprint. The
//! quality of the pair directly bounds the load factor the table can
//! reach.

use std::hash::{BuildHasher, Hash};

/// Produces the two independent hashes that pick a key's candidate
/// buckets.
pub trait HashPair<K: ?Sized> {
    fn hash_pair(&self, key: &K) -> (u64, u64);
}

/// Default [`HashPair`]: the key hashed once by each of two
/// independently seeded builders.
#[derive(Clone)]
pub struct PairState<S1 = ahash::RandomState, S2 = ahash::RandomState> {
    first: S1,
    second: S2,
}

impl PairState {
    pub fn new() -> Self {
        Self {
            first: ahash::RandomState::new(),
            second: ahash::RandomState::new(),
        }
    }
}

impl Default for PairState {
    fn default() -> Self {
        Self::new()
    }
}

impl<S1, S2> PairState<S1, S2> {
    /// Builds the pair from explicit hasher builders, e.g. for
    /// reproducible seeding.
    pub fn with_hashers(first: S1, second: S2) -> Self {
        Self { first, second }
    }
}

impl<K, S1, S2> HashPair<K> for PairState<S1, S2>
where
    K: Hash + ?Sized,
    S1: BuildHasher,
    S2: BuildHasher,
{
    #[inline]
    fn hash_pair(&self, key: &K) -> (u64, u64) {
        (self.first.hash_one(key), self.second.hash_one(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_deterministic() {
        let state = PairState::new();
        assert_eq!(state.hash_pair(&42u64), state.hash_pair(&42u64));
        assert_ne!(state.hash_pair(&42u64), state.hash_pair(&43u64));
    }

    #[test]
    fn test_halves_are_independent() {
        let state = PairState::new();
        let (h0, h1) = state.hash_pair(&"some key");
        assert_ne!(h0, h1);
    }

    #[test]
    fn test_borrowed_form_hashes_alike() {
        let state = PairState::new();
        let owned = String::from("key");
        assert_eq!(state.hash_pair(&owned), state.hash_pair(owned.as_str()));
    }

    #[test]
    fn test_seeded_builders() {
        let seeds = ahash::RandomState::with_seeds(1, 2, 3, 4);
        let other = ahash::RandomState::with_seeds(5, 6, 7, 8);
        let a = PairState::with_hashers(seeds.clone(), other.clone());
        let b = PairState::with_hashers(seeds, other);
        assert_eq!(a.hash_pair(&7u32), b.hash_pair(&7u32));
    }
}
