//! The event contract between an (out-of-scope) OSM file reader and the
//! middle layer (spec §6, §9 Design Notes).
//!
//! The original C code has three separate parsers — `parse-xml2.c`,
//! `parse-pbf.c`, `parse-o5m.c` — each writing into the same global tag
//! list. Per the re-architecture guidance we replace all three with one
//! `Reader` trait that yields a single `Event` stream; whatever decodes
//! XML/PBF/O5M on disk only needs to implement `Iterator<Item = Event>` (or
//! push events through a callback) to plug into `Middle`.

use crate::model::{Action, MemberType, NodeLocation, OsmId, Tags};

/// One OSM primitive (or part of one) observed in stream order.
///
/// Ways and relations are split into a `Start*` event carrying the id and
/// tags, followed by zero or more reference events, so a reader can stream
/// an arbitrarily long member list without buffering it — the `Middle`
/// implementation is the one that decides whether to buffer or consume
/// incrementally.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A complete node: readers with random access to info (PBF dense and
    /// non-dense nodes) can always emit nodes as a single event.
    Node {
        id: OsmId,
        location: NodeLocation,
        tags: Tags,
        action: Action,
    },
    /// Begin a way; node ids for it follow as `WayRef` events until the
    /// matching `EndObject`.
    StartWay { id: OsmId, tags: Tags, action: Action },
    WayRef(OsmId),
    /// Begin a relation; its members follow as `RelMember` events until the
    /// matching `EndObject`.
    StartRelation { id: OsmId, tags: Tags, action: Action },
    RelMember {
        member_type: MemberType,
        member_ref: OsmId,
        role: String,
    },
    /// Closes the way or relation most recently opened by `StartWay` /
    /// `StartRelation`.
    EndObject,
    /// A standalone deletion with no replacement payload (change files
    /// only; `action` on the other variants already covers delete-with-new-state
    /// is not applicable here since a delete carries no body).
    Delete { kind: crate::model::ObjectKind, id: OsmId },
}

/// Anything that can feed an ordered `Event` stream into the middle.
///
/// Implementors decode XML, PBF or O5M (all out of scope for this crate);
/// `Middle::consume` is the only thing that needs to know about `Reader`.
pub trait Reader {
    type Err: std::error::Error;

    /// Pull the next event, or `Ok(None)` at end of input.
    fn next_event(&mut self) -> Result<Option<Event>, Self::Err>;
}

/// Adapts any `Iterator<Item = Event>` into a `Reader` with an infallible
/// error type, convenient for tests and for readers that have already
/// buffered their events.
pub struct IterReader<I> {
    inner: I,
}

impl<I> IterReader<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Iterator<Item = Event>> Reader for IterReader<I> {
    type Err = std::convert::Infallible;

    fn next_event(&mut self) -> Result<Option<Event>, Self::Err> {
        Ok(self.inner.next())
    }
}
