//! The way/relation store (spec §4.2), the second half of C1.
//!
//! Two concrete backends share one trait: [`RamMiddle`](ram::RamMiddle) keeps
//! everything in process memory (grounded on
//! `examples/original_source/middle-ram.c`); [`SlimMiddle`](slim::SlimMiddle)
//! persists to three database tables so a later change file can revisit
//! objects (grounded on `examples/original_source/middle-pgsql.c`). Per the
//! re-architecture guidance in spec §9, both replace the original's global
//! static arrays / connection-wide prepared statements with an owned struct.

pub mod ram;
pub mod slim;

pub use ram::RamMiddle;
pub use slim::SlimMiddle;

use crate::error::Result;
use crate::model::{NodeLocation, ObjectState, OsmId, RelationMember, Tags};

/// The way/relation store contract (spec §4.2). A node's *location* is
/// served by [`crate::cache::NodeCache`] (spec §4.1); a node's *tags* are
/// accepted here for schema symmetry with the original's `nodes` table but,
/// since nodes are never replayed (only ways and relations carry a pending
/// state), neither backend needs them after the node's own row has been
/// emitted — see `DESIGN.md`.
pub trait Middle {
    fn nodes_set(&mut self, id: OsmId, location: NodeLocation, tags: &Tags) -> Result<()>;
    /// Takes `&mut self`: the slim backend issues a query over its one
    /// connection, which the `postgres` crate models as a mutable
    /// borrow (matching the original's connection-wide prepared-statement
    /// cursors, which were never reentrant either).
    fn nodes_get_list(&mut self, ids: &[OsmId]) -> Vec<NodeLocation>;
    fn nodes_delete(&mut self, id: OsmId) -> Result<()>;
    /// Marks every way and relation containing `id` as pending (spec §3
    /// PendingSet, §4.2 GIN-indexed containment lookup in slim mode).
    fn node_changed(&mut self, id: OsmId) -> Result<()>;

    fn ways_set(&mut self, id: OsmId, node_ids: Vec<OsmId>, tags: Tags, state: ObjectState) -> Result<()>;
    fn ways_get(&mut self, id: OsmId) -> Option<(Tags, Vec<NodeLocation>)>;
    /// Clears the pending flag without removing the way (it may still be
    /// looked up by id later in the same run).
    fn ways_done(&mut self, id: OsmId) -> Result<()>;
    fn ways_delete(&mut self, id: OsmId) -> Result<()>;
    fn way_changed(&mut self, id: OsmId) -> Result<()>;

    fn relations_set(&mut self, id: OsmId, members: Vec<RelationMember>, tags: Tags) -> Result<()>;
    fn relations_get(&mut self, id: OsmId) -> Option<(Vec<RelationMember>, Tags)>;
    fn relations_done(&mut self, id: OsmId) -> Result<()>;
    fn relations_delete(&mut self, id: OsmId) -> Result<()>;
    fn relation_changed(&mut self, id: OsmId) -> Result<()>;

    /// Replays every way still marked pending exactly once, in descending id
    /// order (the planet's way ids are assigned monotonically, so this
    /// frees memory from the tail of the id space first — spec §4.2).
    fn iterate_ways(&mut self, callback: &mut dyn FnMut(OsmId, &Tags, &[NodeLocation])) -> Result<()>;
    fn iterate_relations(&mut self, callback: &mut dyn FnMut(OsmId, &Tags, &[RelationMember])) -> Result<()>;
}
