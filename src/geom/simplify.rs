//! Douglas-Peucker simplification (spec §4.4), with the validity checks
//! the original wraps around GEOS's simplifier: a simplified linestring
//! still needs ≥ 2 distinct points, and a simplified polygon ring must
//! stay closed with ≥ 4 points.

use geo::{LineString, Polygon, Simplify as GeoSimplify};

use super::GeometryResult;
use geo::Geometry;

fn valid_linestring(ls: &LineString<f64>) -> bool {
    let mut distinct = 0usize;
    let mut last = None;
    for c in &ls.0 {
        if last != Some(*c) {
            distinct += 1;
            last = Some(*c);
        }
    }
    distinct >= 2
}

fn valid_ring(ls: &LineString<f64>) -> bool {
    ls.0.len() >= 4 && ls.0.first() == ls.0.last()
}

/// Simplifies a linestring, rejecting a result collapsed to a single
/// point.
pub fn simplify_linestring(ls: &LineString<f64>, epsilon: f64) -> GeometryResult {
    let simplified = ls.simplify(&epsilon);
    if !valid_linestring(&simplified) {
        return GeometryResult::Invalid("simplification collapsed the linestring");
    }
    GeometryResult::Ok(Geometry::LineString(simplified))
}

/// Simplifies a polygon's rings, rejecting a result where the exterior
/// ring failed to stay closed or dropped below 4 points. A simplified
/// interior ring that becomes degenerate is dropped rather than failing
/// the whole polygon, matching how a vanishingly small hole is immaterial
/// to the outer shape.
pub fn simplify_polygon(poly: &Polygon<f64>, epsilon: f64) -> GeometryResult {
    let exterior = poly.exterior().simplify(&epsilon);
    if !valid_ring(&exterior) {
        return GeometryResult::Invalid("simplification broke the exterior ring");
    }

    let interiors: Vec<LineString<f64>> =
        poly.interiors().iter().map(|r| r.simplify(&epsilon)).filter(|r| valid_ring(r)).collect();

    GeometryResult::Ok(Geometry::Polygon(Polygon::new(exterior, interiors)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    #[test]
    fn collinear_points_are_dropped() {
        let ls = LineString::new(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0001 },
            Coord { x: 2.0, y: 0.0 },
        ]);
        let result = simplify_linestring(&ls, 0.01);
        match result {
            GeometryResult::Ok(Geometry::LineString(out)) => assert_eq!(out.0.len(), 2),
            other => panic!("expected a simplified linestring, got {other:?}"),
        }
    }

    #[test]
    fn two_point_line_survives() {
        let ls = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]);
        assert!(simplify_linestring(&ls, 0.01).is_valid());
    }
}
