//! Combined dense+sparse node cache (spec §4.1 "DenseAndSparse").
//!
//! Grounded on `examples/original_source/node-ram-cache.c`'s mixed mode,
//! which keeps the currently-filling region dense and migrates blocks that
//! turn out to be sparsely populated into the sorted overflow once the
//! writer moves past them. `DenseCache::fill_occupancy`/`recycle_fill_block`
//! exist specifically to let this module observe and act on that
//! transition without reaching into `DenseCache`'s internals.

use super::dense::DENSITY_BREAK_EVEN;
use super::{DenseCache, SetOutcome, SparseCache};
use crate::model::{NodeLocation, OsmId};
use crate::options::Options;

/// `id >> BLOCK_SHIFT`, duplicated here rather than exposed by `DenseCache`
/// since only the block-transition boundary (not the shift amount) matters
/// to this module.
fn block_of(id: OsmId) -> i64 {
    id >> 10
}

pub struct CombinedCache {
    dense: DenseCache,
    sparse: SparseCache,
    current_block: Option<i64>,
}

impl CombinedCache {
    pub fn new(opt: &Options) -> Self {
        Self {
            dense: DenseCache::new(opt),
            sparse: SparseCache::new(opt),
            current_block: None,
        }
    }

    /// When the incoming id belongs to a new block, checks whether the
    /// block being left behind was sparse enough to demote, and if so
    /// drains it out of the dense cache into the sorted overflow.
    fn maybe_migrate(&mut self, incoming_key: i64) {
        if self.current_block == Some(incoming_key) {
            return;
        }
        if let Some(occupancy) = self.dense.fill_occupancy() {
            if occupancy < DENSITY_BREAK_EVEN {
                let entries = self.dense.recycle_fill_block();
                self.sparse.extend(entries);
            }
        }
        self.current_block = Some(incoming_key);
    }

    pub fn set(&mut self, id: OsmId, loc: NodeLocation) -> SetOutcome {
        self.maybe_migrate(block_of(id));
        self.dense.set(id, loc)
    }

    pub fn get(&self, id: OsmId) -> Option<NodeLocation> {
        self.dense.get(id).or_else(|| self.sparse.get(id))
    }

    pub fn out_of_order_warnings(&self) -> u64 {
        self.dense.out_of_order_warnings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt() -> Options {
        let mut o = Options::default();
        o.ram_budget_mb = 8;
        o
    }

    #[test]
    fn dense_block_stays_resolvable_through_sparse_fallback() {
        let mut c = CombinedCache::new(&opt());
        // Fill one block densely, then touch a single id far away to force
        // a block transition; the first block should still resolve either
        // way.
        for off in 0..1024i64 {
            c.set(off, NodeLocation::new(off as f64, 0.0));
        }
        c.set(10_000_000, NodeLocation::new(1.0, 1.0));
        for off in 0..1024i64 {
            let loc = c.get(off).expect("still resolvable after block transition");
            assert!((loc.lon - off as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn sparsely_filled_block_migrates_to_sparse_store() {
        let mut c = CombinedCache::new(&opt());
        // A single node in a 1024-slot block is well below the 0.5
        // break-even, so moving to the next block should demote it.
        c.set(0, NodeLocation::new(5.0, 6.0));
        c.set(2048, NodeLocation::new(7.0, 8.0));
        assert_eq!(c.sparse.len(), 1);
        let loc = c.get(0).expect("migrated node still resolvable via sparse");
        assert!((loc.lon - 5.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_order_warnings_delegate_to_dense() {
        let c = CombinedCache::new(&opt());
        assert_eq!(c.out_of_order_warnings(), 0);
    }
}
