//! The geometry assembler (spec §4.4, component C2): turns resolved node
//! lists and relation memberships into simple-feature geometries.
//!
//! Grounded on `examples/original_source/`'s GEOS-backed `build_geometry`
//! (various `src/geom-*.cpp`), whose `catch(...)` around GEOS exceptions is
//! replaced per spec §9's re-architecture guidance with the explicit
//! `GeometryResult` below — a ring that fails to close or self-intersects
//! yields `Invalid`, never a panic or a silently-wrong geometry.

pub mod assembler;
pub mod line_merge;
pub mod pole;
pub mod project;
pub mod ring;
pub mod segmentize;
pub mod simplify;

pub use project::Projection;

use geo::Geometry;

/// The outcome of a geometry-building operation (spec §9: "replace
/// exceptions used for control flow ... with an explicit
/// `GeometryResult = Ok(g) | Invalid(reason)` return").
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryResult {
    Ok(Geometry<f64>),
    /// No geometry could be built; `reason` is a short, loggable
    /// classification (e.g. "unclosed ring", "too few points"), not a
    /// full diagnostic message.
    Invalid(&'static str),
}

impl GeometryResult {
    pub fn ok(self) -> Option<Geometry<f64>> {
        match self {
            GeometryResult::Ok(g) => Some(g),
            GeometryResult::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, GeometryResult::Ok(_))
    }
}
