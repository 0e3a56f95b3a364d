//! Map interface over the raw table.

use std::borrow::Borrow;
use std::ops::Index;

use crate::entry::{Entry, OccupiedEntry, VacantEntry};
use crate::hash::{HashPair, PairState};
use crate::layout::{AobLayout, AosLayout, DataLayout, SoaLayout};
use crate::raw::RawTable;

/// A hash map with cuckoo-style dual-hash placement, hopscotch
/// displacement and bucket reversal.
///
/// `B` is the bucket width: every element lives within `B` bins of one of
/// its two anchors, so lookups probe at most `2 * B` bins. Width 2 is the
/// fastest at light loads, width 4 wastes the least memory past 95%
/// load, the default of 3 sits in between.
///
/// The layout parameter picks one of the three bin storages; see the
/// crate docs for the trade-offs.
pub struct CbgMap<K, V, L = SoaLayout<K, V>, H = PairState, const B: usize = 3> {
    raw: RawTable<L, B>,
    hasher: H,
    _marker: std::marker::PhantomData<(K, V)>,
}

/// [`CbgMap`] in struct-of-arrays storage (the default).
pub type SoaMap<K, V, H = PairState, const B: usize = 3> = CbgMap<K, V, SoaLayout<K, V>, H, B>;

/// [`CbgMap`] in array-of-structs storage.
pub type AosMap<K, V, H = PairState, const B: usize = 3> = CbgMap<K, V, AosLayout<K, V>, H, B>;

/// [`CbgMap`] in array-of-blocks storage.
pub type AobMap<K, V, H = PairState, const B: usize = 3> = CbgMap<K, V, AobLayout<K, V>, H, B>;

impl<K, V, L, const B: usize> CbgMap<K, V, L, PairState, B>
where
    L: DataLayout<Key = K, Value = V>,
{
    /// Creates an empty map. No storage is allocated until the first
    /// insert.
    pub fn new() -> Self {
        Self::with_hasher(PairState::new())
    }

    /// Creates a map with room for `capacity` bins up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, PairState::new())
    }
}

impl<K, V, L, const B: usize> Default for CbgMap<K, V, L, PairState, B>
where
    L: DataLayout<Key = K, Value = V>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, L, H, const B: usize> CbgMap<K, V, L, H, B>
where
    L: DataLayout<Key = K, Value = V>,
{
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            raw: RawTable::with_bins(0),
            hasher,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Self {
        Self {
            raw: RawTable::with_bins(capacity),
            hasher,
            _marker: std::marker::PhantomData,
        }
    }

    /// Number of stored elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Number of bins. Every bin holds at most one element.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.bins()
    }

    /// Returns a reference to the hasher pair.
    #[inline]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Fraction of bins in use, in `[0, 1]`.
    pub fn load_factor(&self) -> f32 {
        if self.raw.bins() == 0 {
            0.0
        } else {
            self.raw.len() as f32 / self.raw.bins() as f32
        }
    }

    /// Load threshold that triggers growth on insert.
    pub fn max_load_factor(&self) -> f32 {
        self.raw.max_load_factor()
    }

    pub fn set_max_load_factor(&mut self, value: f32) {
        self.raw.set_max_load_factor(value);
    }

    /// Multiplier applied to the bin count when the table grows.
    pub fn grow_factor(&self) -> f32 {
        self.raw.grow_factor()
    }

    pub fn set_grow_factor(&mut self, value: f32) {
        self.raw.set_grow_factor(value);
    }

    /// Removes every element. Capacity is retained.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Releases all storage, leaving an empty zero-capacity map.
    pub fn shrink(&mut self) {
        self.raw = RawTable::with_bins(0);
    }
}

impl<K, V, L, H, const B: usize> CbgMap<K, V, L, H, B>
where
    K: Eq,
    L: DataLayout<Key = K, Value = V>,
{
    pub(crate) fn find_pos<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        let (h0, h1) = self.hasher.hash_pair(key);
        self.raw.find(h0, h1, |stored| stored.borrow() == key)
    }

    /// Returns a reference to the value associated with the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        let pos = self.find_pos(key)?;
        // Safety: find_pos only returns occupied bins
        Some(unsafe { self.raw.store.value(pos) })
    }

    /// Returns a mutable reference to the value associated with the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        let pos = self.find_pos(key)?;
        // Safety: find_pos only returns occupied bins
        Some(unsafe { self.raw.store.value_mut(pos) })
    }

    /// Returns the stored key and value for the given key.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        let pos = self.find_pos(key)?;
        // Safety: find_pos only returns occupied bins
        unsafe { Some((self.raw.store.key(pos), self.raw.store.value(pos))) }
    }

    /// Returns `true` if the map contains the key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        self.find_pos(key).is_some()
    }

    /// Inserts a key-value pair.
    ///
    /// If the key was already present its value is replaced and the old
    /// value returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V>
    where
        H: HashPair<K>,
    {
        if let Some(pos) = self.find_pos(&key) {
            // Safety: find_pos only returns occupied bins
            let old = std::mem::replace(unsafe { self.raw.store.value_mut(pos) }, value);
            return Some(old);
        }

        if (self.raw.len() as f32) >= self.raw.bins() as f32 * self.raw.max_load_factor() {
            self.grow();
        }

        let mut elem = (key, value);
        loop {
            let hasher = &self.hasher;
            match self.raw.try_insert(elem, &|k| hasher.hash_pair(k)) {
                Ok(_) => return None,
                Err(displaced) => {
                    elem = displaced;
                    self.grow();
                }
            }
        }
    }

    /// Removes a key, returning its value if present. The freed bin is
    /// immediately reusable; no tombstones are left behind.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes a key, returning the stored key and value if present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: HashPair<Q>,
    {
        let pos = self.find_pos(key)?;
        Some(self.raw.erase(pos))
    }

    /// Grows the table to at least `bins` bins.
    pub fn reserve(&mut self, bins: usize)
    where
        H: HashPair<K>,
    {
        let hasher = &self.hasher;
        self.raw.rehash(bins, &|k| hasher.hash_pair(k));
    }

    /// Gets the key's entry for in-place manipulation.
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, L, H, B>
    where
        K: Clone,
        H: HashPair<K>,
    {
        if self.find_pos(&key).is_some() {
            Entry::Occupied(OccupiedEntry::new(self, key))
        } else {
            Entry::Vacant(VacantEntry::new(self, key))
        }
    }

    fn grow(&mut self)
    where
        H: HashPair<K>,
    {
        let target = self.raw.grow_size();
        assert!(target > self.raw.bins(), "cbg: table capacity overflow");
        let hasher = &self.hasher;
        self.raw.rehash(target, &|k| hasher.hash_pair(k));
    }
}

impl<K, V, Q, L, H, const B: usize> Index<&Q> for CbgMap<K, V, L, H, B>
where
    K: Eq + Borrow<Q>,
    Q: Eq + ?Sized,
    L: DataLayout<Key = K, Value = V>,
    H: HashPair<Q>,
{
    type Output = V;

    /// Panics if the key is absent.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}
