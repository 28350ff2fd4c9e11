//! Bounded-length segmentization (spec §4.4, property P4): cut a linestring
//! into separate pieces so no resulting piece exceeds `max_length`.
//!
//! Grounded on `examples/original_source/src/geom-functions.cpp`'s
//! `split_linestring`: distance accumulates across the whole polyline
//! (not reset per edge), and a split lands at each absolute multiple of
//! `max_length` along that running distance, closing one piece and
//! opening the next at the same interpolated point.

use geo::{Coord, LineString, MultiLineString};

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

fn interpolate(from: Coord<f64>, to: Coord<f64>, frac: f64) -> Coord<f64> {
    Coord { x: from.x + frac * (to.x - from.x), y: from.y + frac * (to.y - from.y) }
}

/// Splits `line` into pieces of at most `max_length`, carrying leftover
/// distance from one edge into the next (spec §4.4 P4).
pub fn segmentize(line: &LineString<f64>, max_length: f64) -> MultiLineString<f64> {
    assert!(max_length > 0.0, "max_length must be positive");

    let coords = &line.0;
    if coords.len() < 2 {
        return MultiLineString::new(vec![line.clone()]);
    }

    let mut pieces = Vec::new();
    let mut current = vec![coords[0]];
    let mut prev = coords[0];
    let mut dist = 0.0;

    for &pt in &coords[1..] {
        let delta = distance(prev, pt);

        if dist + delta > max_length {
            let splits = ((dist + delta) / max_length).floor() as u64;
            let mut ipoint = prev;
            for j in 0..splits {
                let frac = ((j + 1) as f64 * max_length - dist) / delta;
                ipoint = interpolate(prev, pt, frac);
                if frac != 0.0 {
                    current.push(ipoint);
                }
                pieces.push(std::mem::replace(&mut current, vec![ipoint]));
            }
            if pt == ipoint {
                dist = 0.0;
                prev = pt;
                continue;
            }
            dist = distance(ipoint, pt);
        } else {
            dist += delta;
        }

        current.push(pt);
        prev = pt;
    }

    if current.len() > 1 {
        pieces.push(current);
    }

    MultiLineString::new(pieces.into_iter().map(LineString::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_e4_three_segments() {
        // Scenario E4 from spec §8: [(0,0),(1,0)], L=0.4 -> three pieces
        // cut at absolute multiples of 0.4 along the line.
        let line = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }]);
        let out = segmentize(&line, 0.4);
        assert_eq!(
            out,
            MultiLineString::new(vec![
                LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 0.4, y: 0.0 }]),
                LineString::new(vec![Coord { x: 0.4, y: 0.0 }, Coord { x: 0.8, y: 0.0 }]),
                LineString::new(vec![Coord { x: 0.8, y: 0.0 }, Coord { x: 1.0, y: 0.0 }]),
            ])
        );
    }

    #[test]
    fn short_edge_is_left_alone() {
        let line = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 0.1, y: 0.0 }]);
        let out = segmentize(&line, 1.0);
        assert_eq!(out.0.len(), 1);
        assert_eq!(out.0[0].0.len(), 2);
    }

    #[test]
    fn endpoints_are_preserved() {
        let line = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 5.0, y: 0.0 }, Coord { x: 5.0, y: 5.0 }]);
        let out = segmentize(&line, 2.0);
        assert_eq!(out.0.first().unwrap().0.first(), Some(&Coord { x: 0.0, y: 0.0 }));
        assert_eq!(out.0.last().unwrap().0.last(), Some(&Coord { x: 5.0, y: 5.0 }));
        for piece in &out.0 {
            for w in piece.0.windows(2) {
                let d = ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt();
                assert!(d <= 2.0 + 1e-9);
            }
        }
    }
}
