//! Bin storage behind a uniform slot-addressed interface.
//!
//! The placement engine never touches memory directly; it goes through
//! [`DataLayout`], which couples the packed metadata word of every bin
//! with the key/value slot it describes. Three layouts are provided:
//!
//! - [`SoaLayout`]: metadata, keys and values in three parallel arrays.
//!   The only layout with 16-bit metadata, so the only one carrying the
//!   hash fingerprint. Fastest for negative lookups.
//! - [`AosLayout`]: one array of per-slot structs. Fastest for positive
//!   lookups.
//! - [`AobLayout`]: slots grouped into fixed-size blocks, a compromise
//!   between the two.
//!
//! Element slots are `MaybeUninit`; a slot is initialized exactly when
//! its metadata label is nonzero. That makes the metadata the single
//! source of truth for occupancy, and it is why the element accessors
//! are `unsafe` with an occupied-slot contract.

use std::mem::MaybeUninit;

use crate::meta;

/// Slots per block in [`AobLayout`].
pub const BLOCK_LEN: usize = 8;

/// Storage interface consumed by the table core.
///
/// `meta`/`set_meta` are the only primitive metadata accessors; every
/// semantic operation is derived from them, so a layout only decides how
/// words and elements are laid out in memory. Layouts with 8-bit words
/// widen on read (high byte zero) and truncate on write, which removes
/// the fingerprint without any branching in the core.
pub trait DataLayout {
    type Key;
    type Value;

    /// Whether the metadata word stores a hash fingerprint.
    const HAS_FINGERPRINT: bool;

    fn with_bins(bins: usize) -> Self;

    /// Number of addressable bins.
    fn bins(&self) -> usize;

    /// Grows storage to `bins`, preserving existing contents. Metadata of
    /// the new tail is zeroed.
    fn grow(&mut self, bins: usize);

    fn meta(&self, pos: usize) -> u16;

    fn set_meta(&mut self, pos: usize, word: u16);

    /// The pre-filter word compared against stored fingerprints during
    /// lookup. Zero for layouts without a fingerprint, which turns the
    /// filter into a no-op.
    #[inline]
    fn tag(hash: u64) -> u16 {
        if Self::HAS_FINGERPRINT {
            (hash as u16) & meta::FINGERPRINT_BITS
        } else {
            0
        }
    }

    #[inline]
    fn label(&self, pos: usize) -> u8 {
        meta::label(self.meta(pos))
    }

    #[inline]
    fn is_empty_bin(&self, pos: usize) -> bool {
        meta::is_empty(self.meta(pos))
    }

    #[inline]
    fn distance(&self, pos: usize) -> usize {
        meta::distance(self.meta(pos))
    }

    #[inline]
    fn in_reversed(&self, pos: usize) -> bool {
        meta::in_reversed(self.meta(pos))
    }

    #[inline]
    fn is_reversed(&self, pos: usize) -> bool {
        meta::is_reversed(self.meta(pos))
    }

    #[inline]
    fn is_unlucky(&self, pos: usize) -> bool {
        meta::is_unlucky(self.meta(pos))
    }

    /// Stored fingerprint in filter position; zero without one.
    #[inline]
    fn fingerprint(&self, pos: usize) -> u16 {
        meta::fingerprint(self.meta(pos))
    }

    /// Logically removes the element at `pos`, keeping the bucket flags.
    #[inline]
    fn set_empty(&mut self, pos: usize) {
        let word = self.meta(pos);
        self.set_meta(pos, meta::cleared(word));
    }

    #[inline]
    fn set_reversed(&mut self, pos: usize) {
        let word = self.meta(pos);
        self.set_meta(pos, word | meta::REVERSED_BIT);
    }

    #[inline]
    fn set_unlucky(&mut self, pos: usize) {
        let word = self.meta(pos);
        self.set_meta(pos, word | meta::UNLUCKY_BIT);
    }

    /// Writes the metadata of a freshly placed element, preserving the
    /// bucket flags already present at `pos`.
    #[inline]
    fn update_bin(&mut self, pos: usize, distance: usize, in_reversed: bool, label: u8, fp: u16) {
        let word = self.meta(pos);
        self.set_meta(pos, meta::compose(word, distance, in_reversed, label, fp));
    }

    fn clear_meta(&mut self, start: usize, len: usize) {
        for pos in start..start + len {
            self.set_meta(pos, 0);
        }
    }

    /// Writes an element into `pos`. The slot must not hold a live
    /// element (empty, or just moved out).
    fn write_elem(&mut self, pos: usize, key: Self::Key, value: Self::Value);

    /// # Safety
    /// The bin at `pos` must be occupied.
    unsafe fn key(&self, pos: usize) -> &Self::Key;

    /// # Safety
    /// The bin at `pos` must be occupied.
    unsafe fn value(&self, pos: usize) -> &Self::Value;

    /// # Safety
    /// The bin at `pos` must be occupied.
    unsafe fn value_mut(&mut self, pos: usize) -> &mut Self::Value;

    /// Moves the element out of `pos`. The caller must update the
    /// metadata before the slot is read again.
    ///
    /// # Safety
    /// The bin at `pos` must be occupied.
    unsafe fn read_elem(&mut self, pos: usize) -> (Self::Key, Self::Value);

    /// Relocates the element from `src` into `dst`.
    ///
    /// # Safety
    /// `src` must be occupied and `dst` must not hold a live element.
    unsafe fn move_elem(&mut self, dst: usize, src: usize) {
        let (key, value) = self.read_elem(src);
        self.write_elem(dst, key, value);
    }
}

/// Struct-of-arrays layout: 16-bit metadata with fingerprint, keys and
/// values in separate arrays.
pub struct SoaLayout<K, V> {
    meta: Vec<u16>,
    keys: Vec<MaybeUninit<K>>,
    values: Vec<MaybeUninit<V>>,
}

impl<K, V> DataLayout for SoaLayout<K, V> {
    type Key = K;
    type Value = V;

    const HAS_FINGERPRINT: bool = true;

    fn with_bins(bins: usize) -> Self {
        let mut layout = Self {
            meta: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
        };
        layout.grow(bins);
        layout
    }

    #[inline]
    fn bins(&self) -> usize {
        self.meta.len()
    }

    fn grow(&mut self, bins: usize) {
        self.meta.resize(bins, 0);
        self.keys.resize_with(bins, MaybeUninit::uninit);
        self.values.resize_with(bins, MaybeUninit::uninit);
    }

    #[inline]
    fn meta(&self, pos: usize) -> u16 {
        self.meta[pos]
    }

    #[inline]
    fn set_meta(&mut self, pos: usize, word: u16) {
        self.meta[pos] = word;
    }

    fn clear_meta(&mut self, start: usize, len: usize) {
        self.meta[start..start + len].fill(0);
    }

    #[inline]
    fn write_elem(&mut self, pos: usize, key: K, value: V) {
        self.keys[pos].write(key);
        self.values[pos].write(value);
    }

    #[inline]
    unsafe fn key(&self, pos: usize) -> &K {
        debug_assert!(!self.is_empty_bin(pos));
        self.keys[pos].assume_init_ref()
    }

    #[inline]
    unsafe fn value(&self, pos: usize) -> &V {
        debug_assert!(!self.is_empty_bin(pos));
        self.values[pos].assume_init_ref()
    }

    #[inline]
    unsafe fn value_mut(&mut self, pos: usize) -> &mut V {
        debug_assert!(!self.is_empty_bin(pos));
        self.values[pos].assume_init_mut()
    }

    #[inline]
    unsafe fn read_elem(&mut self, pos: usize) -> (K, V) {
        (
            self.keys[pos].assume_init_read(),
            self.values[pos].assume_init_read(),
        )
    }
}

impl<K, V> Drop for SoaLayout<K, V> {
    fn drop(&mut self) {
        for pos in 0..self.meta.len() {
            if !meta::is_empty(self.meta[pos]) {
                // Safety: nonzero label means the slot is initialized
                unsafe {
                    self.keys[pos].assume_init_drop();
                    self.values[pos].assume_init_drop();
                }
            }
        }
    }
}

struct AosSlot<K, V> {
    meta: u8,
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
}

impl<K, V> AosSlot<K, V> {
    fn empty() -> Self {
        Self {
            meta: 0,
            key: MaybeUninit::uninit(),
            value: MaybeUninit::uninit(),
        }
    }
}

/// Array-of-structs layout: 8-bit metadata interleaved with each
/// key/value pair, no fingerprint.
pub struct AosLayout<K, V> {
    slots: Vec<AosSlot<K, V>>,
}

impl<K, V> DataLayout for AosLayout<K, V> {
    type Key = K;
    type Value = V;

    const HAS_FINGERPRINT: bool = false;

    fn with_bins(bins: usize) -> Self {
        let mut layout = Self { slots: Vec::new() };
        layout.grow(bins);
        layout
    }

    #[inline]
    fn bins(&self) -> usize {
        self.slots.len()
    }

    fn grow(&mut self, bins: usize) {
        self.slots.resize_with(bins, AosSlot::empty);
    }

    #[inline]
    fn meta(&self, pos: usize) -> u16 {
        self.slots[pos].meta as u16
    }

    #[inline]
    fn set_meta(&mut self, pos: usize, word: u16) {
        self.slots[pos].meta = word as u8;
    }

    #[inline]
    fn write_elem(&mut self, pos: usize, key: K, value: V) {
        self.slots[pos].key.write(key);
        self.slots[pos].value.write(value);
    }

    #[inline]
    unsafe fn key(&self, pos: usize) -> &K {
        debug_assert!(!self.is_empty_bin(pos));
        self.slots[pos].key.assume_init_ref()
    }

    #[inline]
    unsafe fn value(&self, pos: usize) -> &V {
        debug_assert!(!self.is_empty_bin(pos));
        self.slots[pos].value.assume_init_ref()
    }

    #[inline]
    unsafe fn value_mut(&mut self, pos: usize) -> &mut V {
        debug_assert!(!self.is_empty_bin(pos));
        self.slots[pos].value.assume_init_mut()
    }

    #[inline]
    unsafe fn read_elem(&mut self, pos: usize) -> (K, V) {
        let slot = &mut self.slots[pos];
        (slot.key.assume_init_read(), slot.value.assume_init_read())
    }
}

impl<K, V> Drop for AosLayout<K, V> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if !meta::is_empty(slot.meta as u16) {
                // Safety: nonzero label means the slot is initialized
                unsafe {
                    slot.key.assume_init_drop();
                    slot.value.assume_init_drop();
                }
            }
        }
    }
}

struct Block<K, V> {
    meta: [u8; BLOCK_LEN],
    keys: [MaybeUninit<K>; BLOCK_LEN],
    values: [MaybeUninit<V>; BLOCK_LEN],
}

impl<K, V> Block<K, V> {
    fn empty() -> Self {
        Self {
            meta: [0; BLOCK_LEN],
            // Safety: MaybeUninit does not require initialization
            keys: unsafe { MaybeUninit::uninit().assume_init() },
            values: unsafe { MaybeUninit::uninit().assume_init() },
        }
    }
}

/// Array-of-blocks layout: 8-bit metadata, slots grouped into
/// [`BLOCK_LEN`]-wide blocks so metadata and elements of nearby bins
/// share cache lines without unaligned access.
pub struct AobLayout<K, V> {
    blocks: Vec<Block<K, V>>,
    bins: usize,
}

impl<K, V> DataLayout for AobLayout<K, V> {
    type Key = K;
    type Value = V;

    const HAS_FINGERPRINT: bool = false;

    fn with_bins(bins: usize) -> Self {
        let mut layout = Self {
            blocks: Vec::new(),
            bins: 0,
        };
        layout.grow(bins);
        layout
    }

    #[inline]
    fn bins(&self) -> usize {
        self.bins
    }

    fn grow(&mut self, bins: usize) {
        self.blocks
            .resize_with(bins.div_ceil(BLOCK_LEN), Block::empty);
        self.bins = bins;
    }

    #[inline]
    fn meta(&self, pos: usize) -> u16 {
        self.blocks[pos / BLOCK_LEN].meta[pos % BLOCK_LEN] as u16
    }

    #[inline]
    fn set_meta(&mut self, pos: usize, word: u16) {
        self.blocks[pos / BLOCK_LEN].meta[pos % BLOCK_LEN] = word as u8;
    }

    #[inline]
    fn write_elem(&mut self, pos: usize, key: K, value: V) {
        let block = &mut self.blocks[pos / BLOCK_LEN];
        block.keys[pos % BLOCK_LEN].write(key);
        block.values[pos % BLOCK_LEN].write(value);
    }

    #[inline]
    unsafe fn key(&self, pos: usize) -> &K {
        debug_assert!(!self.is_empty_bin(pos));
        self.blocks[pos / BLOCK_LEN].keys[pos % BLOCK_LEN].assume_init_ref()
    }

    #[inline]
    unsafe fn value(&self, pos: usize) -> &V {
        debug_assert!(!self.is_empty_bin(pos));
        self.blocks[pos / BLOCK_LEN].values[pos % BLOCK_LEN].assume_init_ref()
    }

    #[inline]
    unsafe fn value_mut(&mut self, pos: usize) -> &mut V {
        debug_assert!(!self.is_empty_bin(pos));
        self.blocks[pos / BLOCK_LEN].values[pos % BLOCK_LEN].assume_init_mut()
    }

    #[inline]
    unsafe fn read_elem(&mut self, pos: usize) -> (K, V) {
        let block = &mut self.blocks[pos / BLOCK_LEN];
        (
            block.keys[pos % BLOCK_LEN].assume_init_read(),
            block.values[pos % BLOCK_LEN].assume_init_read(),
        )
    }
}

impl<K, V> Drop for AobLayout<K, V> {
    fn drop(&mut self) {
        for pos in 0..self.bins {
            let block = &mut self.blocks[pos / BLOCK_LEN];
            if !meta::is_empty(block.meta[pos % BLOCK_LEN] as u16) {
                // Safety: nonzero label means the slot is initialized
                unsafe {
                    block.keys[pos % BLOCK_LEN].assume_init_drop();
                    block.values[pos % BLOCK_LEN].assume_init_drop();
                }
            }
        }
    }
}
