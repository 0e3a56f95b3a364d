//! Entry API for `CbgMap`

use crate::hash::HashPair;
use crate::layout::DataLayout;
use crate::map::CbgMap;

/// A view into a single entry in a `CbgMap`, which may either be vacant or occupied
pub enum Entry<'a, K, V, L, H, const B: usize> {
    Occupied(OccupiedEntry<'a, K, V, L, H, B>),
    Vacant(VacantEntry<'a, K, V, L, H, B>),
}

/// A view into an occupied entry in a `CbgMap`
pub struct OccupiedEntry<'a, K, V, L, H, const B: usize> {
    map: &'a mut CbgMap<K, V, L, H, B>,
    key: K,
}

/// A view into a vacant entry in a `CbgMap`
pub struct VacantEntry<'a, K, V, L, H, const B: usize> {
    map: &'a mut CbgMap<K, V, L, H, B>,
    key: K,
}

impl<'a, K, V, L, H, const B: usize> Entry<'a, K, V, L, H, B>
where
    K: Eq + Clone,
    L: DataLayout<Key = K, Value = V>,
    H: HashPair<K>,
{
    /// Returns a reference to this entry's key
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => &entry.key,
            Entry::Vacant(entry) => &entry.key,
        }
    }

    /// Ensures a value is in the entry by inserting the default if empty,
    /// and returns a mutable reference to the value in the entry.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Ensures a value is in the entry by inserting the result of the
    /// default function if empty, and returns a mutable reference to
    /// the value in the entry
    pub fn or_insert_with<F: FnOnce() -> V>(self, default: F) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Ensures a value is in the entry by inserting the result of the
    /// default function if empty
    /// The key is passed to the function
    pub fn or_insert_with_key<F: FnOnce(&K) -> V>(self, default: F) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let value = default(entry.key());
                entry.insert(value)
            }
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts into the map
    pub fn and_modify<F: FnOnce(&mut V)>(mut self, f: F) -> Self {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }
}

impl<'a, K, V, L, H, const B: usize> Entry<'a, K, V, L, H, B>
where
    K: Eq + Clone,
    V: Default,
    L: DataLayout<Key = K, Value = V>,
    H: HashPair<K>,
{
    /// Ensures a value is in the entry by inserting the default value if empty,
    /// and returns a mutable reference to the value in the entry.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(V::default)
    }
}

impl<'a, K, V, L, H, const B: usize> OccupiedEntry<'a, K, V, L, H, B>
where
    K: Eq,
    L: DataLayout<Key = K, Value = V>,
    H: HashPair<K>,
{
    pub(crate) fn new(map: &'a mut CbgMap<K, V, L, H, B>, key: K) -> Self {
        Self { map, key }
    }

    /// Gets a reference to the key in the entry
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Gets a reference to the value in the entry
    pub fn get(&self) -> &V {
        self.map.get(&self.key).expect("OccupiedEntry: key not found")
    }

    /// Gets a mutable reference to the value in the entry
    pub fn get_mut(&mut self) -> &mut V {
        self.map
            .get_mut(&self.key)
            .expect("OccupiedEntry: key not found")
    }

    /// Converts the entry into a mutable reference to its value
    pub fn into_mut(self) -> &'a mut V {
        self.map
            .get_mut(&self.key)
            .expect("OccupiedEntry: key not found")
    }

    /// Sets the value of the entry, and returns the entry's old value
    pub fn insert(&mut self, value: V) -> V {
        std::mem::replace(self.get_mut(), value)
    }

    /// Takes the value out of the entry, and returns it
    pub fn remove(self) -> V {
        self.map
            .remove(&self.key)
            .expect("OccupiedEntry: key not found")
    }
}

impl<'a, K, V, L, H, const B: usize> VacantEntry<'a, K, V, L, H, B>
where
    K: Eq + Clone,
    L: DataLayout<Key = K, Value = V>,
    H: HashPair<K>,
{
    pub(crate) fn new(map: &'a mut CbgMap<K, V, L, H, B>, key: K) -> Self {
        Self { map, key }
    }

    /// Gets a reference to the key that would be used when inserting
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key
    pub fn into_key(self) -> K {
        self.key
    }

    /// Sets the value of the entry, and returns a mutable reference to it
    pub fn insert(self, value: V) -> &'a mut V {
        let key = self.key.clone();
        self.map.insert(self.key, value);

        // the insert may have rehashed, look the slot up again
        self.map
            .get_mut(&key)
            .expect("VacantEntry::insert: failed to find inserted entry")
    }
}
