//! Ring assembly (spec §4.4, steps 1–4 of "Multipolygon from relation"):
//! stitch way fragments end-to-end into closed rings, then classify each
//! ring as outer or inner by containment and attach inners to their
//! minimal enclosing outer.
//!
//! Grounded on the segment/endpoint-matching approach `examples/original_source/`
//! implements around GEOS polygonization: endpoints are matched by exact
//! coordinate equality (the reader has already deduplicated consecutive
//! identical points per spec §4.4's linestring rule), connected components
//! are walked to close rings, and point-in-ring containment (not role
//! hints) decides outer vs. inner.

use std::collections::HashMap;

use geo::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingRole {
    Outer,
    Inner,
}

#[derive(Debug, Clone)]
pub struct Ring {
    pub points: Vec<Coord<f64>>,
    pub role: RingRole,
}

pub struct AssembledPolygon {
    pub exterior: Vec<Coord<f64>>,
    pub interiors: Vec<Vec<Coord<f64>>>,
}

fn coord_key(c: Coord<f64>) -> (u64, u64) {
    (c.x.to_bits(), c.y.to_bits())
}

/// Stitches a set of (possibly already-closed) way fragments into closed
/// rings by matching shared endpoints, per spec §4.4 steps 1–2.
pub fn close_rings(segments: &[Vec<Coord<f64>>]) -> Result<Vec<Ring>, &'static str> {
    let mut chains: Vec<Vec<Coord<f64>>> = segments.iter().filter(|s| s.len() >= 2).cloned().collect();
    if chains.is_empty() {
        return Err("no usable segments");
    }

    // Repeatedly merge any two chains that share an endpoint, same
    // approach as `line_merge` but stopping once every chain is closed
    // (first == last) rather than continuing to merge open components.
    loop {
        let mut merged_any = false;
        let mut endpoints: HashMap<(u64, u64), usize> = HashMap::new();
        let mut merge_pair = None;

        for (i, chain) in chains.iter().enumerate() {
            if chain.first() == chain.last() {
                continue; // already closed, nothing to attach
            }
            for &end in &[chain.first().copied().unwrap(), chain.last().copied().unwrap()] {
                let key = coord_key(end);
                if let Some(&j) = endpoints.get(&key) {
                    if j != i {
                        merge_pair = Some((j, i));
                        break;
                    }
                } else {
                    endpoints.insert(key, i);
                }
            }
            if merge_pair.is_some() {
                break;
            }
        }

        if let Some((a, b)) = merge_pair {
            let chain_b = chains.remove(b);
            let chain_a = &mut chains[if b < a { a - 1 } else { a }];
            append_matching(chain_a, chain_b);
            merged_any = true;
        }

        if !merged_any {
            break;
        }
    }

    let mut rings = Vec::with_capacity(chains.len());
    for chain in chains {
        if chain.first() != chain.last() {
            return Err("unclosed ring");
        }
        if chain.len() < 4 {
            return Err("ring has fewer than 4 points");
        }
        let interior = &chain[..chain.len() - 1];
        let mut seen = std::collections::HashSet::with_capacity(interior.len());
        for &c in interior {
            if !seen.insert(coord_key(c)) {
                return Err("duplicate node in ring");
            }
        }
        rings.push(Ring { points: chain, role: RingRole::Outer });
    }
    Ok(rings)
}

/// Appends `b` onto `a`, flipping either so the shared endpoint lines up;
/// the shared point is written once, not duplicated.
fn append_matching(a: &mut Vec<Coord<f64>>, mut b: Vec<Coord<f64>>) {
    let a_last = *a.last().unwrap();
    if b.first() == Some(&a_last) {
        a.extend(b.drain(1..));
    } else if b.last() == Some(&a_last) {
        b.reverse();
        a.extend(b.drain(1..));
    } else if b.first() == a.first().as_deref().copied().as_ref() {
        a.reverse();
        a.extend(b.drain(1..));
    } else {
        b.reverse();
        a.reverse();
        a.extend(b.drain(1..));
    }
}

fn signed_area(points: &[Coord<f64>]) -> f64 {
    let mut sum = 0.0;
    for w in points.windows(2) {
        sum += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    sum / 2.0
}

/// Even-odd ray casting, matching the standard point-in-polygon test used
/// for containment classification.
fn contains_point(ring: &[Coord<f64>], p: Coord<f64>) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].x, ring[i].y);
        let (xj, yj) = (ring[j].x, ring[j].y);
        let intersects = ((yi > p.y) != (yj > p.y)) && (p.x < (xj - xi) * (p.y - yi) / (yj - yi) + xi);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Classifies each ring as outer/inner by containment depth and attaches
/// inners to their minimal enclosing outer (spec §4.4 steps 3–4).
pub fn classify_and_attach(rings: Vec<Ring>) -> Result<Vec<AssembledPolygon>, &'static str> {
    let n = rings.len();
    let containing: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && contains_point(&rings[j].points, rings[i].points[0]))
                .collect()
        })
        .collect();
    let depth: Vec<usize> = containing.iter().map(|c| c.len()).collect();

    let mut assembled: Vec<AssembledPolygon> = Vec::new();
    let mut outer_index: HashMap<usize, usize> = HashMap::new();

    for i in 0..n {
        if depth[i] % 2 == 0 {
            outer_index.insert(i, assembled.len());
            assembled.push(AssembledPolygon { exterior: rings[i].points.clone(), interiors: Vec::new() });
        }
    }

    for i in 0..n {
        if depth[i] % 2 != 0 {
            let parent = containing[i]
                .iter()
                .filter(|&&j| depth[j] + 1 == depth[i])
                .min_by(|&&a, &&b| {
                    signed_area(&rings[a].points).abs().partial_cmp(&signed_area(&rings[b].points).abs()).unwrap()
                })
                .copied();
            match parent.and_then(|p| outer_index.get(&p)) {
                Some(&assembled_idx) => assembled[assembled_idx].interiors.push(rings[i].points.clone()),
                None => return Err("inner ring not contained in exactly one outer"),
            }
        }
    }

    Ok(assembled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn already_closed_single_segment_is_one_outer_ring() {
        let square = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        let rings = close_rings(&[square]).unwrap();
        assert_eq!(rings.len(), 1);
    }

    #[test]
    fn two_open_fragments_stitch_into_one_ring() {
        let a = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)];
        let b = vec![c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        let rings = close_rings(&[a, b]).unwrap();
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].points.first(), rings[0].points.last());
    }

    #[test]
    fn unclosed_fragment_is_rejected() {
        let a = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)];
        assert_eq!(close_rings(&[a]), Err("unclosed ring"));
    }

    #[test]
    fn multipolygon_with_hole_e2() {
        // Scenario E2 from spec §8.
        let outer = vec![c(0.0, 0.0), c(3.0, 0.0), c(3.0, 3.0), c(0.0, 3.0), c(0.0, 0.0)];
        let inner = vec![c(1.0, 1.0), c(2.0, 1.0), c(2.0, 2.0), c(1.0, 2.0), c(1.0, 1.0)];
        let rings = close_rings(&[outer, inner]).unwrap();
        let assembled = classify_and_attach(rings).unwrap();
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].interiors.len(), 1);
        let outer_area = signed_area(&assembled[0].exterior).abs();
        let inner_area = signed_area(&assembled[0].interiors[0]).abs();
        assert!((outer_area - 9.0).abs() < 1e-9);
        assert!((inner_area - 1.0).abs() < 1e-9);
    }
}
