//! Cuckoo breeding ground hash table.
//!
//! An open-addressed map and set reaching very high load factors while
//! keeping lookups bounded to a handful of probed slots. Three ideas
//! combine:
//!
//! - **Dual-hash placement**: every element has a primary and a
//!   secondary bucket, derived from two independent hashes. A lookup
//!   probes the primary bucket and touches the secondary only when the
//!   primary anchor says some of its elements overflowed there.
//! - **Hopscotch displacement with bucket reversal**: a bucket is a
//!   window of `B` consecutive bins. When a window is full, the table
//!   relocates elements locally: it can flip the window to extend toward
//!   lower bins, flip a neighbouring bucket out of the way, or bubble
//!   the nearest empty bin backward.
//! - **Labelled cuckoo eviction**: as a last resort the cheapest
//!   resident is evicted and re-inserted at its other bucket. A small
//!   per-bin label makes eviction cost monotone along the chain, so
//!   chains are short and termination is explicit.
//!
//! Per-bin bookkeeping lives in one packed status word next to the
//! element, and three storage layouts trade lookup profiles off against
//! memory: [`SoaLayout`] (parallel arrays, hash fingerprint, fastest
//! misses), [`AosLayout`] (interleaved, fastest hits) and [`AobLayout`]
//! (blocked, balanced).
//!
//! ```
//! use cbg::CbgMap;
//!
//! let mut population: CbgMap<&str, u64> = CbgMap::new();
//! population.insert("amsterdam", 921_402u64);
//! population.insert("utrecht", 361_924);
//!
//! assert_eq!(population.get("utrecht"), Some(&361_924));
//! assert!(population.remove("amsterdam").is_some());
//! assert_eq!(population.len(), 1);
//! ```

mod entry;
mod hash;
mod layout;
mod map;
mod meta;
mod raw;
mod set;

pub use entry::{Entry, OccupiedEntry, VacantEntry};
pub use hash::{HashPair, PairState};
pub use layout::{AobLayout, AosLayout, DataLayout, SoaLayout, BLOCK_LEN};
pub use map::{AobMap, AosMap, CbgMap, SoaMap};
pub use set::{AobSet, AosSet, CbgSet, SoaSet};
