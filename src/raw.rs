//! Placement, lookup and growth engine.
//!
//! [`RawTable`] is the layout-agnostic core. Every element has two
//! candidate buckets derived from its two hashes; a bucket is a window of
//! `B` consecutive bins starting at its anchor, extending downward when
//! the anchor's reversed flag is set. Insertion tries, in order: a free
//! bin in the primary window, displacement within the primary bucket
//! (bucket reversal, then neighbour reversal, then linear hopscotch), a
//! free bin in the secondary window, displacement in the secondary when
//! the table is nearly full, and finally cuckoo eviction of the
//! cheapest-labelled victim. Labels grow monotonically along an eviction
//! chain, so a chain either places every displaced element or runs into
//! two saturated windows and hands the last victim back for a rehash.
//!
//! The raw table does not hash or compare keys itself: callers pass the
//! hash pair and an equality predicate, and the public map re-hashes
//! displaced elements through the closure it threads into `try_insert`
//! and `rehash`.

use crate::layout::DataLayout;
use crate::meta;
use crate::meta::MAX_LABEL;

/// Maps a 64-bit word uniformly into `[0, n)` without division, keeping
/// the high bits of the product.
#[inline]
pub(crate) fn fastrange(word: u64, n: usize) -> usize {
    (((word as u128) * (n as u128)) >> 64) as usize
}

pub(crate) struct RawTable<L, const B: usize> {
    pub(crate) store: L,
    bins: usize,
    len: usize,
    max_load_factor: f32,
    grow_factor: f32,
}

impl<L: DataLayout, const B: usize> RawTable<L, B> {
    /// Smallest non-empty table. The trailing reversed buckets must not
    /// overlap the leading ones.
    pub(crate) const MIN_BINS: usize = 2 * B - 2;

    const BUCKET_WIDTH_OK: () =
        assert!(B >= 2 && B <= 4, "bucket width must fit the 2-bit distance field");

    pub(crate) fn with_bins(bins: usize) -> Self {
        let _ = Self::BUCKET_WIDTH_OK;
        let bins = if bins == 0 { 0 } else { bins.max(Self::MIN_BINS) };
        let mut table = Self {
            store: L::with_bins(bins),
            bins,
            len: 0,
            max_load_factor: 0.9001,
            grow_factor: 1.1,
        };
        table.reset_tail_flags();
        table
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub(crate) fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    pub(crate) fn set_max_load_factor(&mut self, value: f32) {
        self.max_load_factor = value;
    }

    #[inline]
    pub(crate) fn grow_factor(&self) -> f32 {
        self.grow_factor
    }

    pub(crate) fn set_grow_factor(&mut self, value: f32) {
        self.grow_factor = value;
    }

    /// Reverses the windows of the last `B - 1` bins so they stay inside
    /// the table.
    fn reset_tail_flags(&mut self) {
        if self.bins == 0 {
            return;
        }
        for i in 0..B - 1 {
            self.store.set_reversed(self.bins - 1 - i);
        }
    }

    /// First bin of the window anchored at `anchor`.
    #[inline]
    fn window_base(&self, anchor: usize) -> usize {
        if self.store.is_reversed(anchor) {
            anchor + 1 - B
        } else {
            anchor
        }
    }

    /// Lowest label in the window starting at `base`, ties to the lowest
    /// bin.
    fn min_label(&self, base: usize) -> (u8, usize) {
        let mut min = self.store.label(base);
        let mut pos = base;
        for i in 1..B {
            if min == 0 {
                break;
            }
            let label = self.store.label(base + i);
            if label < min {
                min = label;
                pos = base + i;
            }
        }
        (min, pos)
    }

    /// Anchor of the bucket owning the element at `pos`, `None` for an
    /// empty bin.
    fn owner_anchor(&self, pos: usize) -> Option<usize> {
        let word = self.store.meta(pos);
        if meta::is_empty(word) {
            return None;
        }
        let up = if meta::in_reversed(word) { B - 1 } else { 0 };
        Some(pos + up - meta::distance(word))
    }

    fn count_empty(&self, base: usize) -> usize {
        (0..B).filter(|&i| self.store.is_empty_bin(base + i)).count()
    }

    /// Occupied bins of the non-reversed window that belong to the bucket
    /// at `anchor`.
    fn resident_elems(&self, anchor: usize) -> usize {
        (0..B)
            .filter(|&i| self.owner_anchor(anchor + i) == Some(anchor))
            .count()
    }

    /// Reverses the bucket at `anchor` if its downward window has room
    /// for every resident. With `need_spare` the reversal must also leave
    /// at least one bin free.
    fn try_reverse(&mut self, anchor: usize, need_spare: bool) -> bool {
        debug_assert!(!self.store.is_reversed(anchor));

        let empties = self.count_empty(anchor + 1 - B);
        if empties == 0 {
            return false;
        }
        // The anchor's own element vacates a bin that stays inside the
        // reversed window.
        let budget = if self.owner_anchor(anchor) == Some(anchor) {
            empties + 1
        } else {
            empties
        };
        let residents = self.resident_elems(anchor);
        let enough = if need_spare {
            budget > residents
        } else {
            budget >= residents
        };
        if !enough {
            return false;
        }
        self.reverse_bucket(anchor);
        true
    }

    /// Flips the bucket at `anchor` and relocates its residents into the
    /// reversed window, lowest free bin first. Callers checked there is
    /// room.
    fn reverse_bucket(&mut self, anchor: usize) {
        self.store.set_reversed(anchor);

        let mut j = B - 1;
        for i in 0..B {
            let src = anchor + i;
            if self.owner_anchor(src) != Some(anchor) {
                continue;
            }
            while !self.store.is_empty_bin(anchor - j) {
                j -= 1;
            }
            let dst = anchor - j;
            let label = self.store.label(src);
            let fp = self.store.fingerprint(src);
            self.store.update_bin(dst, B - 1 - j, true, label, fp);
            // Safety: src is occupied, dst was empty
            unsafe { self.store.move_elem(dst, src) };
            self.store.set_empty(src);
        }
    }

    /// Frees a bin of the window `[base, base + B)` of the bucket at
    /// `anchor`, by reversing the bucket, reversing a neighbour bucket
    /// that owns an element of the window, or bubbling the nearest empty
    /// bin backward. Returns the freed bin.
    fn hopscotch_empty(&mut self, anchor: usize, base: usize) -> Option<usize> {
        if !self.store.is_reversed(anchor) && anchor >= B && self.try_reverse(anchor, true) {
            let (min, pos) = self.min_label(anchor + 1 - B);
            if min == 0 {
                return Some(pos);
            }
        }

        if base >= 2 * B {
            for i in 0..B {
                let pos_elem = base + i;
                if self.store.in_reversed(pos_elem) {
                    continue;
                }
                let neighbour = pos_elem - self.store.distance(pos_elem);
                if neighbour == anchor {
                    continue;
                }
                if self.try_reverse(neighbour, false) {
                    // the reversal pulled its residents out of our window
                    let (min, pos) = self.min_label(base);
                    if min == 0 {
                        return Some(pos);
                    }
                }
            }
        }

        // Forward-scan for an empty bin. The horizon extends past B - 1
        // whenever a scanned element could itself move further forward.
        let mut reach = B - 1;
        let mut i = 0;
        while i <= reach && base + i < self.bins {
            let pos = base + i;
            if self.store.is_empty_bin(pos) {
                let mut blank = pos;
                while blank - base >= B {
                    // leftmost element that can legally reach the blank
                    let mut swap = blank + 1 - B;
                    while blank - swap > B - 1 - self.store.distance(swap) {
                        swap += 1;
                    }
                    let distance = self.store.distance(swap) + (blank - swap);
                    let in_reversed = self.store.in_reversed(swap);
                    let label = self.store.label(swap);
                    let fp = self.store.fingerprint(swap);
                    self.store.update_bin(blank, distance, in_reversed, label, fp);
                    // Safety: swap is occupied, blank holds no element
                    unsafe { self.store.move_elem(blank, swap) };
                    blank = swap;
                }
                return Some(blank);
            }
            let r = i + B - 1 - self.store.distance(pos);
            if r > reach {
                reach = r;
            }
            i += 1;
        }

        None
    }

    /// Places `elem`, displacing residents as needed. On success returns
    /// the bin. When both candidate windows are saturated at the maximum
    /// label, returns the element left over at the end of the eviction
    /// chain; the caller grows the table and retries with it.
    pub(crate) fn try_insert<F>(
        &mut self,
        mut elem: (L::Key, L::Value),
        hash_pair: &F,
    ) -> Result<usize, (L::Key, L::Value)>
    where
        F: Fn(&L::Key) -> (u64, u64),
    {
        debug_assert!(self.bins >= Self::MIN_BINS);

        loop {
            let (h0, h1) = hash_pair(&elem.0);
            let anchor1 = fastrange(h0, self.bins);
            let anchor2 = fastrange(h1, self.bins);
            let reversed1 = self.store.is_reversed(anchor1);
            let reversed2 = self.store.is_reversed(anchor2);
            let base1 = if reversed1 { anchor1 + 1 - B } else { anchor1 };
            let base2 = if reversed2 { anchor2 + 1 - B } else { anchor2 };

            let mut min1 = self.store.label(base1);
            let mut min2 = self.store.label(base2);
            let mut pos1 = base1;
            let mut pos2 = base2;
            for i in 1..B {
                let label1 = self.store.label(base1 + i);
                let label2 = self.store.label(base2 + i);
                if label1 < min1 {
                    min1 = label1;
                    pos1 = base1 + i;
                }
                if label2 < min2 {
                    min2 = label2;
                    pos2 = base2 + i;
                }
            }

            // free bin in the primary window
            if min1 == 0 {
                let label = (min2 + 1).min(MAX_LABEL);
                self.store.update_bin(pos1, pos1 - base1, reversed1, label, L::tag(h1));
                self.store.write_elem(pos1, elem.0, elem.1);
                self.len += 1;
                return Ok(pos1);
            }

            // displace inside the primary bucket
            if let Some(empty) = self.hopscotch_empty(anchor1, base1) {
                // reversal may have moved the window
                let reversed1 = self.store.is_reversed(anchor1);
                let base1 = if reversed1 { anchor1 + 1 - B } else { anchor1 };
                let label = (min2 + 1).min(MAX_LABEL);
                self.store.update_bin(empty, empty - base1, reversed1, label, L::tag(h1));
                self.store.write_elem(empty, elem.0, elem.1);
                self.len += 1;
                return Ok(empty);
            }

            // free bin in the secondary window
            if min2 == 0 {
                self.store.set_unlucky(anchor1);
                let label = (min1 + 1).min(MAX_LABEL);
                self.store.update_bin(pos2, pos2 - base2, reversed2, label, L::tag(h0));
                self.store.write_elem(pos2, elem.0, elem.1);
                self.len += 1;
                return Ok(pos2);
            }

            // displacing the secondary bucket pays off only near full
            if self.len * 10 > 9 * self.bins {
                if let Some(empty) = self.hopscotch_empty(anchor2, base2) {
                    self.store.set_unlucky(anchor1);
                    let reversed2 = self.store.is_reversed(anchor2);
                    let base2 = if reversed2 { anchor2 + 1 - B } else { anchor2 };
                    let label = (min1 + 1).min(MAX_LABEL);
                    self.store.update_bin(empty, empty - base2, reversed2, label, L::tag(h0));
                    self.store.write_elem(empty, elem.0, elem.1);
                    self.len += 1;
                    return Ok(empty);
                }
            }

            if min1.min(min2) >= MAX_LABEL {
                return Err(elem);
            }

            // evict the cheapest victim and retry with it
            elem = if min1 <= min2 {
                let label = (min2 + 1).min(MAX_LABEL);
                self.store.update_bin(pos1, pos1 - base1, reversed1, label, L::tag(h1));
                // Safety: min1 > 0, the bin is occupied
                let victim = unsafe { self.store.read_elem(pos1) };
                self.store.write_elem(pos1, elem.0, elem.1);
                victim
            } else {
                self.store.set_unlucky(anchor1);
                let label = (min1 + 1).min(MAX_LABEL);
                self.store.update_bin(pos2, pos2 - base2, reversed2, label, L::tag(h0));
                // Safety: min2 > 0, the bin is occupied
                let victim = unsafe { self.store.read_elem(pos2) };
                self.store.write_elem(pos2, elem.0, elem.1);
                victim
            };
        }
    }

    /// Finds the bin holding the key with hashes `(h0, h1)` that
    /// satisfies `eq`. Probes the primary window and, only when the
    /// primary anchor is marked unlucky, the secondary one.
    pub(crate) fn find<F>(&self, h0: u64, h1: u64, eq: F) -> Option<usize>
    where
        F: Fn(&L::Key) -> bool,
    {
        if self.bins == 0 {
            return None;
        }

        let anchor1 = fastrange(h0, self.bins);
        let first = self.store.meta(anchor1);
        if let Some(pos) = self.probe_window(anchor1, first, L::tag(h1), &eq) {
            return Some(pos);
        }

        if meta::is_unlucky(first) {
            let anchor2 = fastrange(h1, self.bins);
            let word = self.store.meta(anchor2);
            if let Some(pos) = self.probe_window(anchor2, word, L::tag(h0), &eq) {
                return Some(pos);
            }
        }

        None
    }

    fn probe_window<F>(&self, anchor: usize, anchor_word: u16, tag: u16, eq: &F) -> Option<usize>
    where
        F: Fn(&L::Key) -> bool,
    {
        let back = meta::is_reversed(anchor_word);
        let mut pos = anchor;
        let mut word = anchor_word;
        for i in 0..B {
            if i > 0 {
                pos = if back { pos - 1 } else { pos + 1 };
                word = self.store.meta(pos);
            }
            // the label check must come before touching the key slot
            if (word ^ tag) & meta::FINGERPRINT_BITS == 0
                && !meta::is_empty(word)
                && eq(unsafe { self.store.key(pos) })
            {
                return Some(pos);
            }
        }
        None
    }

    /// Removes the element at `pos`: the slot is logically freed, the
    /// bucket flags stay.
    pub(crate) fn erase(&mut self, pos: usize) -> (L::Key, L::Value) {
        debug_assert!(!self.store.is_empty_bin(pos));
        // Safety: occupied per the caller's find
        let elem = unsafe { self.store.read_elem(pos) };
        self.store.set_empty(pos);
        self.len -= 1;
        elem
    }

    pub(crate) fn clear(&mut self) {
        for pos in 0..self.bins {
            if !self.store.is_empty_bin(pos) {
                // Safety: occupied per the metadata
                drop(unsafe { self.store.read_elem(pos) });
            }
        }
        self.store.clear_meta(0, self.bins);
        self.len = 0;
        self.reset_tail_flags();
    }

    /// Next table size: at least `MIN_BINS` more bins, or the grow factor
    /// applied, whichever is larger. Saturates instead of wrapping.
    pub(crate) fn grow_size(&self) -> usize {
        let scaled = (self.bins as f32 * self.grow_factor) as usize;
        self.bins
            .checked_add(Self::MIN_BINS)
            .unwrap_or(usize::MAX)
            .max(scaled)
    }

    /// Rebuilds the table with at least `new_bins` bins. Elements whose
    /// new primary window lies wholly above their current bin move
    /// directly; the rest re-insert through the placement engine. If a
    /// re-insert fails the whole pass restarts about 0.8% larger.
    pub(crate) fn rehash<F>(&mut self, new_bins: usize, hash_pair: &F)
    where
        F: Fn(&L::Key) -> (u64, u64),
    {
        let mut target = new_bins.max(Self::MIN_BINS);
        if target <= self.bins {
            return;
        }

        let mut pending: Vec<(L::Key, L::Value)> = Vec::with_capacity((self.len / 8).max(1));

        loop {
            let old_bins = self.bins;
            self.bins = target;
            self.store.grow(target);
            self.len = 0;
            self.reset_tail_flags();

            // High-to-low walk: a bin whose new primary window sits
            // strictly above it can only collide with bins already
            // rebuilt, so it may move immediately.
            for pos in (1..old_bins).rev() {
                if !self.store.is_empty_bin(pos) {
                    // Safety: occupied per the metadata
                    let (h0, h1) = hash_pair(unsafe { self.store.key(pos) });
                    let anchor = fastrange(h0, self.bins);
                    let base = self.window_base(anchor);
                    let mut moved = false;
                    if base > pos {
                        let (min, dst) = self.min_label(base);
                        if min == 0 {
                            let in_reversed = self.store.is_reversed(anchor);
                            self.store.update_bin(dst, dst - base, in_reversed, 1, L::tag(h1));
                            // Safety: pos is occupied, dst is empty
                            unsafe { self.store.move_elem(dst, pos) };
                            self.len += 1;
                            moved = true;
                        }
                    }
                    if !moved {
                        // Safety: occupied per the metadata
                        pending.push(unsafe { self.store.read_elem(pos) });
                    }
                }
                self.store.clear_meta(pos, 1);
                if pos + B > self.bins {
                    // visited bins inside the new tail keep their
                    // reversed window
                    self.store.set_reversed(pos);
                }
            }
            if old_bins > 0 {
                if !self.store.is_empty_bin(0) {
                    // Safety: occupied per the metadata
                    pending.push(unsafe { self.store.read_elem(0) });
                }
                self.store.clear_meta(0, 1);
            }

            let mut failed = false;
            while let Some(elem) = pending.pop() {
                if let Err(back) = self.try_insert(elem, hash_pair) {
                    pending.push(back);
                    failed = true;
                    break;
                }
            }
            if !failed {
                return;
            }

            let next = target
                .checked_add((target / 128).max(1))
                .unwrap_or(usize::MAX);
            assert!(next > target, "cbg: table capacity overflow during rehash");
            target = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{AobLayout, AosLayout, SoaLayout};

    type SoaTable<const B: usize> = RawTable<SoaLayout<u64, u64>, B>;

    /// Smallest hash word that `fastrange` maps to `bucket` out of
    /// `bins`.
    fn hash_to(bucket: usize, bins: usize) -> u64 {
        let h = ((bucket as u128) << 64).div_ceil(bins as u128) as u64;
        assert_eq!(fastrange(h, bins), bucket);
        h
    }

    /// Keys encode their bucket pair as `primary * 10 + secondary`
    /// (plus an arbitrary multiple of 100 to distinguish keys).
    fn digit_hash(bins: usize) -> impl Fn(&u64) -> (u64, u64) {
        move |key| {
            let primary = (key / 10 % 10) as usize;
            let secondary = (key % 10) as usize;
            (hash_to(primary, bins), hash_to(secondary, bins))
        }
    }

    /// Full consistency audit: every occupied bin belongs to one of its
    /// key's two buckets and lies inside that window, secondary
    /// placements mark their primary anchor unlucky, keys are unique and
    /// findable, the element count matches, and the trailing buckets
    /// stay reversed.
    fn check_invariants<L, const B: usize>(table: &RawTable<L, B>, hash: &impl Fn(&u64) -> (u64, u64))
    where
        L: DataLayout<Key = u64>,
    {
        let bins = table.bins();
        let mut occupied = 0;
        let mut keys = Vec::new();
        for pos in 0..bins {
            if table.store.is_empty_bin(pos) {
                continue;
            }
            occupied += 1;
            let key = *unsafe { table.store.key(pos) };
            keys.push(key);
            let (h0, h1) = hash(&key);
            let primary = fastrange(h0, bins);
            let secondary = fastrange(h1, bins);
            let anchor = table.owner_anchor(pos).unwrap();

            assert!(
                anchor == primary || anchor == secondary,
                "bin {pos}: anchor {anchor} is neither {primary} nor {secondary}"
            );
            if anchor != primary {
                assert!(
                    table.store.is_unlucky(primary),
                    "bin {pos}: secondary placement but primary {primary} not unlucky"
                );
            }
            let base = table.window_base(anchor);
            assert!(
                (base..base + B).contains(&pos),
                "bin {pos} outside the window of anchor {anchor}"
            );
            assert_eq!(
                table.find(h0, h1, |k| *k == key),
                Some(pos),
                "key {key} not found at bin {pos}"
            );
        }

        assert_eq!(table.len(), occupied, "len out of sync with occupancy");
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), occupied, "duplicate keys stored");
        for i in 0..B - 1 {
            assert!(
                table.store.is_reversed(bins - 1 - i),
                "tail bin {} lost its reversed flag",
                bins - 1 - i
            );
        }
    }

    fn insert_all<L, const B: usize>(
        table: &mut RawTable<L, B>,
        keys: &[u64],
        hash: &impl Fn(&u64) -> (u64, u64),
    ) where
        L: DataLayout<Key = u64, Value = u64>,
    {
        for &key in keys {
            let placed = table.try_insert((key, key * 100), hash);
            assert!(placed.is_ok(), "key {key} did not place");
            check_invariants(table, hash);
        }
    }

    #[test]
    fn test_fastrange() {
        assert_eq!(fastrange(0, 100), 0);
        assert_eq!(fastrange(u64::MAX, 100), 99);
        assert_eq!(fastrange(u64::MAX / 2, 100), 49);
        for bucket in 0..7 {
            assert_eq!(fastrange(hash_to(bucket, 7), 7), bucket);
        }
    }

    #[test]
    fn test_min_bins_and_tail_flags() {
        let table: RawTable<SoaLayout<u64, u64>, 3> = RawTable::with_bins(1);
        assert_eq!(table.bins(), 4);
        assert!(table.store.is_reversed(3));
        assert!(table.store.is_reversed(2));
        assert!(!table.store.is_reversed(1));

        let empty: RawTable<SoaLayout<u64, u64>, 3> = RawTable::with_bins(0);
        assert_eq!(empty.bins(), 0);
    }

    #[test]
    fn test_empty_table_find() {
        let table: SoaTable<2> = RawTable::with_bins(0);
        assert_eq!(table.find(42, 7, |_| true), None);

        let table: SoaTable<2> = RawTable::with_bins(6);
        let hash = digit_hash(6);
        let (h0, h1) = hash(&42);
        assert_eq!(table.find(h0, h1, |k| *k == 42), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_single_insert() {
        let mut table: SoaTable<2> = RawTable::with_bins(6);
        let hash = digit_hash(6);

        // key 24: primary bucket 2, secondary bucket 4
        let pos = table.try_insert((24, 2400), &hash).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(pos, 2);
        assert!(table.store.label(pos) >= 1);
        assert_eq!(table.owner_anchor(pos), Some(2));

        let (h0, h1) = hash(&24);
        assert_eq!(table.find(h0, h1, |k| *k == 24), Some(2));
        assert_eq!(unsafe { *table.store.value(2) }, 2400);
        check_invariants(&table, &hash);
    }

    #[test]
    fn test_secondary_placement_sets_unlucky() {
        let mut table: SoaTable<2> = RawTable::with_bins(6);
        let hash = digit_hash(6);

        // fill the window of bucket 2, then overflow into a secondary
        insert_all(&mut table, &[24, 125, 224], &hash);

        assert_eq!(table.len(), 3);
        assert!(table.store.is_unlucky(2));
        // 224 had to take its secondary bucket 4
        assert_eq!(table.owner_anchor(4), Some(4));
        let (h0, h1) = hash(&224);
        assert_eq!(table.find(h0, h1, |k| *k == 224), Some(4));
    }

    #[test]
    fn test_cuckoo_chain() {
        let mut table: SoaTable<2> = RawTable::with_bins(8);
        let hash = digit_hash(8);

        // keys 1-3 fill bins 0, 1, 2; key 4 then evicts through both
        // buckets of the chain: 401 kicks 1 to bin 1, 1 kicks 201 to
        // bin 2, 201 kicks 312 into its secondary bucket.
        insert_all(&mut table, &[1, 201, 312, 401], &hash);
        assert_eq!(table.len(), 4);

        // two easy keys on top, table ends at six elements
        insert_all(&mut table, &[545, 654], &hash);
        assert_eq!(table.len(), 6);

        // the chain left the first two buckets unlucky
        assert!(table.store.is_unlucky(0));
        assert!(table.store.is_unlucky(1));
    }

    #[test]
    fn test_displacement_budget_exhausted() {
        let mut table: SoaTable<2> = RawTable::with_bins(6);
        let hash = digit_hash(6);

        // buckets 0 and 1 only reach bins 0..3: three slots
        let keys = [1, 101, 201];
        insert_all(&mut table, &keys, &hash);

        let leftover = table.try_insert((301, 0), &hash);
        let (lost, _) = leftover.unwrap_err();
        assert_eq!(table.len(), 3);

        // the displaced element is one of the four contenders and the
        // other three are still stored
        let mut stored: Vec<u64> = (0..table.bins())
            .filter(|&p| !table.store.is_empty_bin(p))
            .map(|p| *unsafe { table.store.key(p) })
            .collect();
        stored.push(lost);
        stored.sort_unstable();
        assert_eq!(stored, vec![1, 101, 201, 301]);
        check_invariants(&table, &hash);
    }

    #[test]
    fn test_bucket_reversal() {
        let mut table: SoaTable<3> = RawTable::with_bins(8);
        let hash = digit_hash(8);

        // 36 and 136 anchor at bucket 3, 47 sits in the middle of its
        // window; the fourth key forces the bucket to reverse
        insert_all(&mut table, &[36, 47, 136], &hash);
        assert_eq!(table.owner_anchor(3), Some(3));
        assert_eq!(table.owner_anchor(4), Some(4));
        assert_eq!(table.owner_anchor(5), Some(3));
        assert!(!table.store.is_reversed(3));

        insert_all(&mut table, &[236], &hash);
        assert!(table.store.is_reversed(3));
        // residents moved below the anchor, the newcomer took the freed
        // anchor bin
        assert_eq!(table.owner_anchor(1), Some(3));
        assert_eq!(table.owner_anchor(2), Some(3));
        assert_eq!(table.owner_anchor(3), Some(3));
        assert_eq!(table.owner_anchor(4), Some(4));
        assert!(table.store.is_empty_bin(5));

        // the reversed window is now full: one more key for bucket 3
        // spills into its secondary and marks the anchor unlucky
        insert_all(&mut table, &[330], &hash);
        assert_eq!(table.len(), 5);
        assert!(table.store.is_unlucky(3));
        assert_eq!(table.owner_anchor(0), Some(0));
    }

    #[test]
    fn test_linear_hopscotch_bubbles_backward() {
        let mut table: SoaTable<2> = RawTable::with_bins(8);
        let hash = digit_hash(8);

        // bins 3, 4, 5 occupied; bucket reversal of 4 is blocked by the
        // full bin 3, so the third key for bucket 4 walks forward to the
        // empty bin 6 and bubbles it back
        insert_all(&mut table, &[30, 41, 52], &hash);
        let pos = table.try_insert((142, 0), &hash).unwrap();
        assert_eq!(pos, 5);
        check_invariants(&table, &hash);

        // 52 moved forward one bin and kept its owner
        assert_eq!(table.owner_anchor(6), Some(5));
        assert_eq!(table.store.distance(6), 1);
        let (h0, h1) = hash(&52);
        assert_eq!(table.find(h0, h1, |k| *k == 52), Some(6));
    }

    #[test]
    fn test_erase_and_reuse_at_full_load() {
        let mut table: SoaTable<2> = RawTable::with_bins(8);
        let hash = digit_hash(8);

        // eight keys, primaries 0..8, filling every bin
        let keys = [4, 15, 26, 37, 40, 51, 62, 73];
        insert_all(&mut table, &keys, &hash);
        assert_eq!(table.len(), 8);

        for &key in &[15, 37, 51, 73] {
            let (h0, h1) = hash(&key);
            let pos = table.find(h0, h1, |k| *k == key).unwrap();
            let (erased, _) = table.erase(pos);
            assert_eq!(erased, key);
        }
        assert_eq!(table.len(), 4);
        check_invariants(&table, &hash);

        let fresh = [115, 137, 151, 173];
        insert_all(&mut table, &fresh, &hash);
        assert_eq!(table.len(), 8);
        assert_eq!(table.bins(), 8);

        for &key in &[4, 26, 40, 62, 115, 137, 151, 173] {
            let (h0, h1) = hash(&key);
            assert!(table.find(h0, h1, |k| *k == key).is_some(), "lost key {key}");
        }
        for &key in &[15, 37, 51, 73] {
            let (h0, h1) = hash(&key);
            assert_eq!(table.find(h0, h1, |k| *k == key), None);
        }
    }

    #[test]
    fn test_erase_preserves_bucket_flags() {
        let mut table: SoaTable<2> = RawTable::with_bins(6);
        let hash = digit_hash(6);

        insert_all(&mut table, &[24, 125, 224], &hash);
        assert!(table.store.is_unlucky(2));

        let (h0, h1) = hash(&24);
        let pos = table.find(h0, h1, |k| *k == 24).unwrap();
        table.erase(pos);

        // the flag describes the bucket, not the erased element
        assert!(table.store.is_unlucky(2));
        let (h0, h1) = hash(&224);
        assert!(table.find(h0, h1, |k| *k == 224).is_some());
    }

    fn spread_hash(key: &u64) -> (u64, u64) {
        (
            key.wrapping_mul(0x9E37_79B9_7F4A_7C15),
            key.wrapping_mul(0xC2B2_AE3D_27D4_EB4F) ^ 0x94D0_49BB_1331_11EB,
        )
    }

    #[test]
    fn test_rehash_preserves_key_set() {
        let mut table: SoaTable<3> = RawTable::with_bins(16);
        let keys: Vec<u64> = (1..=10).collect();
        insert_all(&mut table, &keys, &spread_hash);

        table.rehash(33, &spread_hash);
        assert_eq!(table.bins(), 33);
        assert_eq!(table.len(), 10);
        check_invariants(&table, &spread_hash);

        for key in 1..=10u64 {
            let (h0, h1) = spread_hash(&key);
            let pos = table.find(h0, h1, |k| *k == key).unwrap();
            assert_eq!(unsafe { *table.store.value(pos) }, key * 100);
        }
    }

    #[test]
    fn test_rehash_by_one_bin_keeps_tail_reversed() {
        // growth smaller than B - 1 overlaps the old bins with the new
        // reversed tail
        let mut table: SoaTable<4> = RawTable::with_bins(12);
        let keys: Vec<u64> = (1..=8).collect();
        insert_all(&mut table, &keys, &spread_hash);

        table.rehash(13, &spread_hash);
        assert_eq!(table.bins(), 13);
        check_invariants(&table, &spread_hash);
    }

    #[test]
    fn test_rehash_smaller_is_noop() {
        let mut table: SoaTable<2> = RawTable::with_bins(8);
        let hash = digit_hash(8);
        insert_all(&mut table, &[4, 15], &hash);

        table.rehash(4, &hash);
        assert_eq!(table.bins(), 8);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_grow_size() {
        let table: SoaTable<2> = RawTable::with_bins(6);
        // max(6 + 2, 6 * 1.1) = 8
        assert_eq!(table.grow_size(), 8);

        let big: SoaTable<2> = RawTable::with_bins(1000);
        // the grow factor dominates past MIN_BINS
        assert_eq!(big.grow_size(), 1100);

        let empty: SoaTable<3> = RawTable::with_bins(0);
        assert_eq!(empty.grow_size(), 4);
    }

    #[test]
    fn test_clear_resets_flags() {
        let mut table: SoaTable<2> = RawTable::with_bins(6);
        let hash = digit_hash(6);
        insert_all(&mut table, &[24, 125, 224], &hash);
        assert!(table.store.is_unlucky(2));

        table.clear();
        assert_eq!(table.len(), 0);
        assert!(!table.store.is_unlucky(2));
        assert!(table.store.is_reversed(5));
        let (h0, h1) = hash(&24);
        assert_eq!(table.find(h0, h1, |k| *k == 24), None);
        check_invariants(&table, &hash);
    }

    #[test]
    fn test_high_load_all_layouts() {
        fn run<L: DataLayout<Key = u64, Value = u64>>() {
            let mut table: RawTable<L, 3> = RawTable::with_bins(64);
            let mut stored = Vec::new();
            for key in 1..=52u64 {
                // fill to 81% without triggering growth
                match table.try_insert((key, key), &spread_hash) {
                    Ok(_) => stored.push(key),
                    Err((lost, _)) => panic!("key {lost} failed below max load"),
                }
            }
            assert_eq!(table.len(), 52);
            check_invariants(&table, &spread_hash);
            for key in stored {
                let (h0, h1) = spread_hash(&key);
                assert!(table.find(h0, h1, |k| *k == key).is_some());
            }
        }

        run::<SoaLayout<u64, u64>>();
        run::<AosLayout<u64, u64>>();
        run::<AobLayout<u64, u64>>();
    }
}
