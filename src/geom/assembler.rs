//! `create_point`/`create_linestring`/`create_polygon`/`create_multipolygon`
//! (spec §4.4).
//!
//! Grounded on `examples/original_source/`'s way-to-geometry and
//! relation-to-multipolygon builders: a way degenerates to `Null` below the
//! node-count thresholds spec §3/§4.4 spell out, and ring assembly for
//! polygons/multipolygons is delegated to `super::ring`.

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};

use crate::model::{NodeLocation, RelationMember};

use super::ring::{self, RingRole};
use super::GeometryResult;

fn to_coord(loc: NodeLocation) -> Coord<f64> {
    Coord { x: loc.lon, y: loc.lat }
}

/// `create_point(node)` (spec §4.4): a node always has a valid location by
/// the time it reaches the assembler (spec §3's cache invariant), so this
/// never fails — it exists as a named operation for symmetry with the
/// other `create_*` functions and as the seam a caller can use uniformly.
pub fn create_point(location: NodeLocation) -> Geometry<f64> {
    Geometry::Point(Point(to_coord(location)))
}

/// `create_linestring(way)` (spec §4.4): resolves each node id to a
/// location (the caller has already done this via `Middle::ways_get`),
/// collapses consecutive duplicates, and requires ≥ 2 distinct points.
pub fn create_linestring(resolved_nodes: &[NodeLocation]) -> GeometryResult {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(resolved_nodes.len());
    for &loc in resolved_nodes {
        let c = to_coord(loc);
        if coords.last() != Some(&c) {
            coords.push(c);
        }
    }
    if coords.len() < 2 {
        return GeometryResult::Invalid("too few distinct points for a linestring");
    }
    GeometryResult::Ok(Geometry::LineString(LineString::new(coords)))
}

/// `create_polygon(way)` (spec §4.4): requires ≥ 4 positions with
/// first==last, then runs the single-ring path through the same assembler
/// used for multipolygon rings.
pub fn create_polygon(resolved_nodes: &[NodeLocation]) -> GeometryResult {
    if resolved_nodes.len() < 4 {
        return GeometryResult::Invalid("fewer than 4 positions");
    }
    let first = to_coord(resolved_nodes[0]);
    let last = to_coord(*resolved_nodes.last().unwrap());
    if first != last {
        return GeometryResult::Invalid("first and last position differ");
    }

    let coords: Vec<Coord<f64>> = resolved_nodes.iter().map(|&n| to_coord(n)).collect();
    match ring::close_rings(&[coords]) {
        Ok(rings) if rings.len() == 1 && rings[0].role == RingRole::Outer => {
            GeometryResult::Ok(Geometry::Polygon(Polygon::new(LineString::new(rings[0].points.clone()), vec![])))
        }
        Ok(_) => GeometryResult::Invalid("single way did not close into one outer ring"),
        Err(reason) => GeometryResult::Invalid(reason),
    }
}

/// One member way's resolved node list plus its (hint-only) role.
pub struct MultipolygonMember<'a> {
    pub member: &'a RelationMember,
    pub resolved_nodes: Vec<NodeLocation>,
}

/// `create_multipolygon(relation)` (spec §4.4): extracts segments from
/// every member, closes rings, classifies outer/inner by containment (not
/// by the member's role, which is only a hint), attaches inners to their
/// minimal enclosing outer, and emits `Polygon` when there is exactly one
/// outer or `MultiPolygon` otherwise.
pub fn create_multipolygon(members: &[MultipolygonMember]) -> GeometryResult {
    let segments: Vec<Vec<Coord<f64>>> =
        members.iter().map(|m| m.resolved_nodes.iter().map(|&n| to_coord(n)).collect()).collect();

    let rings = match ring::close_rings(&segments) {
        Ok(r) => r,
        Err(reason) => return GeometryResult::Invalid(reason),
    };

    let assembled = match ring::classify_and_attach(rings) {
        Ok(a) => a,
        Err(reason) => return GeometryResult::Invalid(reason),
    };

    if assembled.is_empty() {
        return GeometryResult::Invalid("no outer rings survived assembly");
    }

    let polygons: Vec<Polygon<f64>> = assembled
        .into_iter()
        .map(|outer| Polygon::new(LineString::new(outer.exterior), outer.interiors.into_iter().map(LineString::new).collect()))
        .collect();

    if polygons.len() == 1 {
        let p = polygons.into_iter().next().unwrap();
        GeometryResult::Ok(Geometry::Polygon(p))
    } else {
        GeometryResult::Ok(Geometry::MultiPolygon(MultiPolygon(polygons)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lon: f64, lat: f64) -> NodeLocation {
        NodeLocation::new(lon, lat)
    }

    #[test]
    fn point_always_succeeds() {
        let g = create_point(loc(1.0, 2.0));
        assert_eq!(g, Geometry::Point(Point::new(1.0, 2.0)));
    }

    #[test]
    fn linestring_collapses_duplicates() {
        let nodes = vec![loc(0.0, 0.0), loc(0.0, 0.0), loc(1.0, 1.0)];
        let result = create_linestring(&nodes);
        assert!(result.is_valid());
    }

    #[test]
    fn linestring_with_one_distinct_point_is_invalid() {
        let nodes = vec![loc(0.0, 0.0), loc(0.0, 0.0)];
        assert!(!create_linestring(&nodes).is_valid());
    }

    #[test]
    fn single_way_polygon_e1() {
        // Scenario E1 from spec §8.
        let nodes = vec![loc(1.0, 1.0), loc(2.0, 1.0), loc(2.0, 2.0), loc(1.0, 2.0), loc(1.0, 1.0)];
        let result = create_polygon(&nodes);
        match result {
            GeometryResult::Ok(Geometry::Polygon(p)) => {
                assert_eq!(p.exterior().0.len(), 5);
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_way_is_not_a_polygon() {
        let nodes = vec![loc(1.0, 1.0), loc(2.0, 1.0), loc(2.0, 2.0), loc(1.0, 2.0)];
        assert!(!create_polygon(&nodes).is_valid());
    }
}
