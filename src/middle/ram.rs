//! RAM-only middle (spec §4.2 "RAM-only middle").
//!
//! Grounded on `examples/original_source/middle-ram.c`: ways and relations
//! there live in a two-level `block`/`offset` array of raw pointers, freed
//! block-by-block as `iterate_ways`/`iterate_relations` walk the id space in
//! descending order. A `BTreeMap` gives the same "ids are assigned roughly
//! monotonically, so reverse iteration frees memory from the tail first"
//! property with none of the manual block bookkeeping — the original's
//! `NUM_BLOCKS`/`PER_BLOCK` split exists only to avoid one allocation per
//! object, a concern a `BTreeMap` node allocator already handles.

use std::collections::BTreeMap;

use crate::cache::NodeCache;
use crate::error::Result;
use crate::model::{NodeLocation, ObjectState, OsmId, RelationMember, Tags};
use crate::options::Options;

use super::Middle;

struct WayRecord {
    node_ids: Vec<OsmId>,
    tags: Tags,
    state: ObjectState,
}

struct RelationRecord {
    members: Vec<RelationMember>,
    tags: Tags,
    state: ObjectState,
}

/// RAM-only `Middle`: everything lives in process memory for the duration
/// of one run. There is no cross-run persistence, so `node_changed`/
/// `way_changed` have nothing useful to index — they exist only to satisfy
/// the trait and are no-ops here (a change file against a RAM middle would
/// have no prior state to mark pending anyway; that combination is the
/// slim middle's job).
pub struct RamMiddle {
    nodes: NodeCache,
    ways: BTreeMap<OsmId, WayRecord>,
    relations: BTreeMap<OsmId, RelationRecord>,
}

impl RamMiddle {
    pub fn new(opt: &Options) -> Result<Self> {
        Ok(Self {
            nodes: NodeCache::new(opt)?,
            ways: BTreeMap::new(),
            relations: BTreeMap::new(),
        })
    }
}

impl Middle for RamMiddle {
    fn nodes_set(&mut self, id: OsmId, location: NodeLocation, _tags: &Tags) -> Result<()> {
        self.nodes.set(id, location)?;
        Ok(())
    }

    fn nodes_get_list(&mut self, ids: &[OsmId]) -> Vec<NodeLocation> {
        self.nodes.get_list(ids)
    }

    fn nodes_delete(&mut self, _id: OsmId) -> Result<()> {
        // The node cache has no per-id tombstone; a deleted node is simply
        // never looked up again once its parent ways/relations are
        // reprocessed. Matches the original, which never implements
        // `nodes_delete` for the RAM middle either.
        Ok(())
    }

    fn node_changed(&mut self, _id: OsmId) -> Result<()> {
        Ok(())
    }

    fn ways_set(&mut self, id: OsmId, node_ids: Vec<OsmId>, tags: Tags, state: ObjectState) -> Result<()> {
        self.ways.insert(id, WayRecord { node_ids, tags, state });
        Ok(())
    }

    fn ways_get(&mut self, id: OsmId) -> Option<(Tags, Vec<NodeLocation>)> {
        let way = self.ways.get(&id)?;
        let coords = self.nodes.get_list(&way.node_ids);
        Some((way.tags.clone(), coords))
    }

    fn ways_done(&mut self, id: OsmId) -> Result<()> {
        if let Some(way) = self.ways.get_mut(&id) {
            way.state = ObjectState::Done;
        }
        Ok(())
    }

    fn ways_delete(&mut self, id: OsmId) -> Result<()> {
        self.ways.remove(&id);
        Ok(())
    }

    fn way_changed(&mut self, _id: OsmId) -> Result<()> {
        Ok(())
    }

    fn relations_set(&mut self, id: OsmId, members: Vec<RelationMember>, tags: Tags) -> Result<()> {
        self.relations.insert(
            id,
            RelationRecord {
                members,
                tags,
                state: ObjectState::ReprocessForRelation,
            },
        );
        Ok(())
    }

    fn relations_get(&mut self, id: OsmId) -> Option<(Vec<RelationMember>, Tags)> {
        self.relations.get(&id).map(|r| (r.members.clone(), r.tags.clone()))
    }

    fn relations_done(&mut self, id: OsmId) -> Result<()> {
        if let Some(rel) = self.relations.get_mut(&id) {
            rel.state = ObjectState::Done;
        }
        Ok(())
    }

    fn relations_delete(&mut self, id: OsmId) -> Result<()> {
        self.relations.remove(&id);
        Ok(())
    }

    fn relation_changed(&mut self, _id: OsmId) -> Result<()> {
        Ok(())
    }

    fn iterate_ways(&mut self, callback: &mut dyn FnMut(OsmId, &Tags, &[NodeLocation])) -> Result<()> {
        let ids: Vec<OsmId> = self.ways.keys().rev().copied().collect();
        for id in ids {
            let way = self.ways.remove(&id).expect("id came from this map's own keys");
            if way.state.is_pending() {
                let coords = self.nodes.get_list(&way.node_ids);
                callback(id, &way.tags, &coords);
            }
        }
        Ok(())
    }

    fn iterate_relations(&mut self, callback: &mut dyn FnMut(OsmId, &Tags, &[RelationMember])) -> Result<()> {
        let ids: Vec<OsmId> = self.relations.keys().rev().copied().collect();
        for id in ids {
            let rel = self.relations.remove(&id).expect("id came from this map's own keys");
            if rel.state.is_pending() {
                callback(id, &rel.tags, &rel.members);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemberType;

    fn opt() -> Options {
        Options::default()
    }

    #[test]
    fn way_round_trips_through_node_cache() {
        let mut mid = RamMiddle::new(&opt()).unwrap();
        mid.nodes_set(1, NodeLocation::new(1.0, 1.0), &Tags::new()).unwrap();
        mid.nodes_set(2, NodeLocation::new(2.0, 2.0), &Tags::new()).unwrap();
        mid.ways_set(10, vec![1, 2], Tags::new(), ObjectState::Fresh).unwrap();

        let (_, coords) = mid.ways_get(10).unwrap();
        assert_eq!(coords.len(), 2);
    }

    #[test]
    fn iterate_ways_replays_only_pending_and_drains_the_store() {
        let mut mid = RamMiddle::new(&opt()).unwrap();
        mid.nodes_set(1, NodeLocation::new(0.0, 0.0), &Tags::new()).unwrap();
        mid.ways_set(10, vec![1], Tags::new(), ObjectState::ReprocessForRelation).unwrap();
        mid.ways_set(11, vec![1], Tags::new(), ObjectState::Fresh).unwrap();

        let mut replayed = Vec::new();
        mid.iterate_ways(&mut |id, _tags, _coords| replayed.push(id)).unwrap();

        assert_eq!(replayed, vec![10]);
        assert!(mid.ways_get(10).is_none());
        assert!(mid.ways_get(11).is_none());
    }

    #[test]
    fn relation_members_preserve_order() {
        let mut mid = RamMiddle::new(&opt()).unwrap();
        let members = vec![
            RelationMember { member_type: MemberType::Way, member_ref: 10, role: "outer".into() },
            RelationMember { member_type: MemberType::Way, member_ref: 11, role: "inner".into() },
        ];
        mid.relations_set(1, members, Tags::new()).unwrap();
        let (got, _) = mid.relations_get(1).unwrap();
        assert_eq!(got[0].role, "outer");
        assert_eq!(got[1].role, "inner");
    }
}
