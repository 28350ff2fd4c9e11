//! Core data model (spec §3): the OSM primitives and the bookkeeping types
//! shared by the middle, the assembler and the COPY pipeline.
//!
//! Grounded on `middle.h`/`osmtypes.h` in `examples/original_source/`: the
//! original keeps `keyval` as a pointer-linked doubly-circular list; per the
//! re-architecture guidance in spec §9 we replace it with an
//! insertion-order-preserving map (`Tags`).

use std::collections::BTreeMap;

/// A 64-bit signed OSM object id. Negative ids (user-created, unsaved
/// objects) are valid and must never be rejected by an index.
pub type OsmId = i64;

/// Ordered, duplicate-free key → value tag map. Keys are compared as bytes;
/// re-inserting a key returns the previous value, mirroring a map `insert`
/// rather than the original's linked-list duplicate detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    order: Vec<String>,
    values: BTreeMap<String, String>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key/value pair, returning the previous value if the key
    /// was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Iterates tags in insertion order (not sorted order), so callers
    /// that reproduce output byte-for-byte see a stable, author-controlled
    /// sequence.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), self.values[k].as_str()))
    }
}

impl FromIterator<(String, String)> for Tags {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut tags = Tags::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// `(lon, lat)` in degrees. Stored as `f64`; the fixed-point encoding used
/// by the caches lives in `crate::cache`, not here, since only the caches
/// need the scaled-integer representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeLocation {
    pub lon: f64,
    pub lat: f64,
}

impl NodeLocation {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// A single OSM node: id, location, and whatever tags survived the (external)
/// tag filter. A node with no kept tags is still retained for its location
/// but is not itself emitted as a row (spec §3, "untagged node").
#[derive(Debug, Clone)]
pub struct Node {
    pub id: OsmId,
    pub location: NodeLocation,
    pub tags: Tags,
}

/// An OSM way: ordered node id list plus tags. `pending` is true iff a
/// later relation claimed this way and it must be replayed once the input
/// is exhausted.
#[derive(Debug, Clone)]
pub struct Way {
    pub id: OsmId,
    pub node_ids: Vec<OsmId>,
    pub tags: Tags,
    pub state: ObjectState,
}

/// The OSM member type referenced by a relation member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

/// A single relation member. Roles are preserved for export but, per spec
/// §4.2, are only *hints* for topology; the ring assembler determines
/// outer/inner by containment.
#[derive(Debug, Clone)]
pub struct RelationMember {
    pub member_type: MemberType,
    pub member_ref: OsmId,
    pub role: String,
}

/// An OSM relation. Relations referencing other relations are not
/// recursively expanded (spec §3).
#[derive(Debug, Clone)]
pub struct Relation {
    pub id: OsmId,
    pub members: Vec<RelationMember>,
    pub tags: Tags,
    pub state: ObjectState,
}

/// Replaces the original's boolean `pending` flag (spec §9 Design Notes)
/// with an explicit three-state enum: an object is either untouched,
/// marked for replay because a relation claimed it, or has already been
/// replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectState {
    #[default]
    Fresh,
    ReprocessForRelation,
    Done,
}

impl ObjectState {
    pub fn is_pending(self) -> bool {
        matches!(self, ObjectState::ReprocessForRelation)
    }
}

/// The kind of OSM primitive an id refers to, used by `PendingSet` entries
/// and by the reader event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Node,
    Way,
    Relation,
}

/// `(type, id)` identifying an object whose geometry must be rebuilt
/// because a referenced child changed (spec §3). Mutation of a node marks
/// every way containing it, and every relation containing that node or
/// way; mutation of a way marks every relation containing it.
pub type PendingKey = (ObjectKind, OsmId);

/// How a change-file action should be applied to the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Modify,
    Delete,
}
