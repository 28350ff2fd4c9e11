//! End-to-end line merging (spec §4.4): collapse a multilinestring's
//! member lines into the fewest possible continuous lines, splitting only
//! at junctions visited by more than two members.
//!
//! Grounded on `examples/original_source/`'s GEOS-backed `LineMerger` use:
//! endpoints are counted into a multiset, a point touched by exactly two
//! members is a junction safe to walk through, a point touched once is an
//! open end the walk starts or stops at, and a point touched more than
//! twice is ambiguous and forces a split there.

use std::collections::HashMap;

use geo::{Coord, LineString, MultiLineString};

fn key(c: Coord<f64>) -> (u64, u64) {
    (c.x.to_bits(), c.y.to_bits())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    First,
    Last,
}

/// Merges `lines` end-to-end, preserving the deterministic ordering spec
/// §4.4 requires: walks start at open ends in the order those ends are
/// first seen in the input, then any leftover cyclic components are
/// walked in input order.
pub fn line_merge(lines: &MultiLineString<f64>) -> MultiLineString<f64> {
    let members: Vec<Vec<Coord<f64>>> = lines.0.iter().map(|ls| ls.0.clone()).collect();
    let n = members.len();

    let mut degree: HashMap<(u64, u64), u32> = HashMap::new();
    for m in &members {
        if m.len() < 2 {
            continue;
        }
        *degree.entry(key(m[0])).or_insert(0) += 1;
        *degree.entry(key(*m.last().unwrap())).or_insert(0) += 1;
    }

    // endpoint key -> member indices touching it, in input order.
    let mut touching: HashMap<(u64, u64), Vec<usize>> = HashMap::new();
    for (i, m) in members.iter().enumerate() {
        if m.len() < 2 {
            continue;
        }
        touching.entry(key(m[0])).or_default().push(i);
        let last_key = key(*m.last().unwrap());
        if last_key != key(m[0]) {
            touching.entry(last_key).or_default().push(i);
        } else {
            touching.get_mut(&last_key).unwrap().push(i);
        }
    }

    let mut used = vec![false; n];
    let mut out: Vec<LineString<f64>> = Vec::new();

    // Find, among the members touching `at` other than `from_idx`, the
    // single remaining unused one. A plain junction (degree 2) always
    // has exactly one; an ambiguous point (degree > 2) is resolved the
    // same way once enough of its other incident lines have already been
    // consumed by earlier walks — the walk order is fixed by the input
    // ordering of open ends, so which pair merges is deterministic.
    let next_at = |at: (u64, u64), from_idx: usize, used: &[bool]| -> Option<usize> {
        let candidates: Vec<usize> =
            touching.get(&at).into_iter().flatten().copied().filter(|&j| j != from_idx && !used[j]).collect();
        if candidates.len() == 1 {
            Some(candidates[0])
        } else {
            None
        }
    };

    let walk_from = |start_idx: usize, start_end: End, used: &mut Vec<bool>| -> Vec<Coord<f64>> {
        let mut chain = members[start_idx].clone();
        if start_end == End::Last {
            chain.reverse();
        }
        used[start_idx] = true;
        let mut current = start_idx;

        loop {
            let tail = key(*chain.last().unwrap());
            match next_at(tail, current, used) {
                Some(j) => {
                    let other = &members[j];
                    if key(other[0]) == tail {
                        chain.extend(other[1..].iter().copied());
                    } else {
                        chain.extend(other[..other.len() - 1].iter().rev().copied());
                    }
                    used[j] = true;
                    current = j;
                }
                None => break,
            }
        }
        chain
    };

    // open ends, in the order they are first encountered walking members
    // in input order, first-endpoint before last-endpoint.
    let mut open_ends: Vec<(usize, End)> = Vec::new();
    for (i, m) in members.iter().enumerate() {
        if m.len() < 2 {
            continue;
        }
        if degree[&key(m[0])] == 1 {
            open_ends.push((i, End::First));
        }
        let last_key = key(*m.last().unwrap());
        if last_key != key(m[0]) && degree[&last_key] == 1 {
            open_ends.push((i, End::Last));
        }
    }

    for (idx, end) in open_ends {
        if used[idx] {
            continue;
        }
        let chain = walk_from(idx, end, &mut used);
        out.push(LineString::new(chain));
    }

    // remaining unused members are cyclic components (or isolated
    // ambiguous fragments); walk each starting from its own first point.
    for i in 0..n {
        if used[i] || members[i].len() < 2 {
            continue;
        }
        let chain = walk_from(i, End::First, &mut used);
        out.push(LineString::new(chain));
    }

    MultiLineString::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ls(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::new(points.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    #[test]
    fn two_end_to_end_lines_merge_into_one() {
        let a = ls(&[(0.0, 0.0), (1.0, 0.0)]);
        let b = ls(&[(1.0, 0.0), (2.0, 0.0)]);
        let merged = line_merge(&MultiLineString::new(vec![a, b]));
        assert_eq!(merged.0.len(), 1);
        assert_eq!(merged.0[0].0.len(), 3);
    }

    #[test]
    fn scenario_e3_y_shape_has_two_components() {
        // Scenario E3 from spec §8: w1=[n,(2,1)], w2=[n,(1,2)], w3=[n,(2,2)]
        // sharing n=(1,1).
        let n = (1.0, 1.0);
        let w1 = ls(&[n, (2.0, 1.0)]);
        let w2 = ls(&[n, (1.0, 2.0)]);
        let w3 = ls(&[n, (2.0, 2.0)]);
        let merged = line_merge(&MultiLineString::new(vec![w1, w2, w3]));
        assert_eq!(merged.0.len(), 2);
    }

    #[test]
    fn disjoint_lines_stay_separate() {
        let a = ls(&[(0.0, 0.0), (1.0, 0.0)]);
        let b = ls(&[(10.0, 10.0), (11.0, 10.0)]);
        let merged = line_merge(&MultiLineString::new(vec![a, b]));
        assert_eq!(merged.0.len(), 2);
    }

    #[test]
    fn closed_ring_of_open_segments_forms_one_cyclic_component() {
        let a = ls(&[(0.0, 0.0), (1.0, 0.0)]);
        let b = ls(&[(1.0, 0.0), (1.0, 1.0)]);
        let c = ls(&[(1.0, 1.0), (0.0, 0.0)]);
        let merged = line_merge(&MultiLineString::new(vec![a, b, c]));
        assert_eq!(merged.0.len(), 1);
        assert_eq!(merged.0[0].0.first(), merged.0[0].0.last());
    }
}
