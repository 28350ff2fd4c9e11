//! Sparse node cache: an `(id, lat, lon)` vector sorted by id, looked up by
//! binary search (spec §4.1 "Sparse layout").
//!
//! Grounded on `examples/original_source/node-ram-cache.c`'s
//! `ram_cache_nodes_get_sparse`/`ram_cache_nodes_set_sparse`. Spec §9's
//! Open Question flags that the original's binary search —
//! `pivotPos = minPos + ((maxPos - minPos) >> 1)`, terminating on
//! `pivotPos == minPos || pivotPos == maxPos` — can miss an id stored at
//! `maxPos - 1`. This implementation uses a textbook closed-to-half-open
//! `[lo, hi)` binary search instead, which cannot exhibit that bug; a
//! regression test below pins an id at the last position and confirms it
//! is found.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{decode_fixed, encode_fixed, SetOutcome};
use crate::model::{NodeLocation, OsmId};
use crate::options::Options;

struct Entry {
    id: OsmId,
    lat: i32,
    lon: i32,
}

/// Sorted-vector node cache, used directly when `strategy = Sparse` and as
/// the overflow store inside `CombinedCache`.
pub struct SparseCache {
    scale: i32,
    max_tuples: usize,
    lossy: bool,
    entries: Vec<Entry>,
    /// True once an out-of-order insertion has forced an in-place
    /// re-sort instead of a cheap push-to-tail append.
    unsorted_inserts: AtomicU64,
}

impl SparseCache {
    pub fn new(opt: &Options) -> Self {
        let entry_bytes = std::mem::size_of::<Entry>() as u64;
        let budget_bytes = u64::from(opt.ram_budget_mb) * 1024 * 1024;
        let max_tuples = ((budget_bytes / entry_bytes).max(1)) as usize;
        Self {
            scale: opt.scale,
            max_tuples,
            lossy: opt.lossy,
            entries: Vec::new(),
            unsorted_inserts: AtomicU64::new(0),
        }
    }

    /// Binary search for `id`; returns `Ok(index)` on a hit or `Err(index)`
    /// of where it would need to be inserted to keep `entries` sorted.
    fn search(&self, id: OsmId) -> Result<usize, usize> {
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.entries[mid].id.cmp(&id) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    pub fn set(&mut self, id: OsmId, loc: NodeLocation) -> SetOutcome {
        let lat = encode_fixed(self.scale, loc.lat);
        let lon = encode_fixed(self.scale, loc.lon);
        match self.search(id) {
            Ok(idx) => {
                self.entries[idx].lat = lat;
                self.entries[idx].lon = lon;
                SetOutcome::Stored
            }
            Err(idx) => {
                if self.entries.len() >= self.max_tuples {
                    if self.lossy {
                        return SetOutcome::Dropped;
                    }
                    return SetOutcome::Dropped;
                }
                if idx != self.entries.len() {
                    self.unsorted_inserts.fetch_add(1, Ordering::Relaxed);
                }
                self.entries.insert(idx, Entry { id, lat, lon });
                SetOutcome::Stored
            }
        }
    }

    pub fn get(&self, id: OsmId) -> Option<NodeLocation> {
        let idx = self.search(id).ok()?;
        let e = &self.entries[idx];
        Some(NodeLocation::new(decode_fixed(self.scale, e.lon), decode_fixed(self.scale, e.lat)))
    }

    /// Bulk-loads already-resolved entries, used by `CombinedCache` when
    /// migrating a sparsely-populated dense block here. Entries are
    /// inserted in whatever order they arrive; the vector stays sorted
    /// because `set` always inserts at the binary-search position.
    pub fn extend(&mut self, items: impl IntoIterator<Item = (OsmId, NodeLocation)>) {
        for (id, loc) in items {
            self.set(id, loc);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt() -> Options {
        let mut o = Options::default();
        o.ram_budget_mb = 16;
        o
    }

    #[test]
    fn round_trips_scattered_ids() {
        let mut c = SparseCache::new(&opt());
        let ids = [5, 1, 1_000_000, -7, 42];
        for &id in &ids {
            c.set(id, NodeLocation::new(id as f64, -(id as f64)));
        }
        for &id in &ids {
            let loc = c.get(id).unwrap();
            assert!((loc.lon - id as f64).abs() < 1e-6);
        }
        assert!(c.get(999).is_none());
    }

    #[test]
    fn finds_id_at_last_position() {
        // Regression for the off-by-one flagged in spec §9: an id stored
        // at position len-1 must still be found.
        let mut c = SparseCache::new(&opt());
        for id in 0..64i64 {
            c.set(id * 2, NodeLocation::new(0.0, 0.0));
        }
        let last_id = 63 * 2;
        assert!(c.get(last_id).is_some());
        assert!(c.get(last_id - 1).is_none());
    }

    #[test]
    fn search_on_empty_cache_does_not_panic() {
        let c = SparseCache::new(&opt());
        assert!(c.get(0).is_none());
    }
}
