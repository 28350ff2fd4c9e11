//! Pole of inaccessibility (spec §4.4, property P7): the point inside a
//! polygon farthest from its boundary, via the "Polylabel" quadtree search.
//!
//! Grounded on `examples/original_source/src/geom-pole-of-inaccessibility.cpp`,
//! itself adapted from Mapbox's `polylabel`: a priority queue of square
//! cells ordered by their maximum possible distance to the boundary, split
//! the most promising cell into quadrants, and stop once no queued cell
//! could beat the current best by more than the requested precision.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use geo::{Coord, Polygon};

const SQRT2: f64 = std::f64::consts::SQRT_2;

/// Squared distance from `p` to the segment `a`-`b`, with the ring's
/// y-coordinates scaled by `stretch` (spec §4.4: `stretch` biases the
/// search along the y-axis, e.g. to prefer wider spots for a label). `p`
/// is already in stretched space; `a`/`b` come straight from the polygon
/// and are scaled here.
fn point_to_segment_distance_squared(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>, stretch: f64) -> f64 {
    let (mut x, mut y) = (a.x, a.y * stretch);
    let (dx, dy) = (b.x - x, b.y * stretch - y);

    if dx != 0.0 || dy != 0.0 {
        let t = ((p.x - x) * dx + (p.y - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = b.x;
            y = b.y * stretch;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    let (dx, dy) = (p.x - x, p.y - y);
    dx * dx + dy * dy
}

/// Updates `min_dist_squared` and the even-odd inside/outside flag by
/// walking one ring, scaling the ring's y-coordinates by `stretch` to
/// match `point`, which is already in stretched space.
fn point_to_ring_distance_squared(
    point: Coord<f64>,
    ring: &[Coord<f64>],
    mut inside: bool,
    stretch: f64,
    min_dist_squared: &mut f64,
) -> bool {
    let len = ring.len();
    let mut j = len - 1;
    for i in 0..len {
        let a = ring[i];
        let b = ring[j];

        if ((a.y * stretch > point.y) != (b.y * stretch > point.y))
            && (point.x < (b.x - a.x) * (point.y - a.y * stretch) / ((b.y - a.y) * stretch) + a.x)
        {
            inside = !inside;
        }

        let d = point_to_segment_distance_squared(point, a, b, stretch);
        if d < *min_dist_squared {
            *min_dist_squared = d;
        }

        j = i;
    }
    inside
}

/// Signed distance from `point` (in stretched space) to the polygon
/// boundary; negative if `point` lies outside the polygon.
fn point_to_polygon_distance(point: Coord<f64>, polygon: &Polygon<f64>, stretch: f64) -> f64 {
    let mut min_dist_squared = f64::INFINITY;
    let mut inside = point_to_ring_distance_squared(point, &polygon.exterior().0, false, stretch, &mut min_dist_squared);
    for ring in polygon.interiors() {
        inside = point_to_ring_distance_squared(point, &ring.0, inside, stretch, &mut min_dist_squared);
    }
    if inside {
        min_dist_squared.sqrt()
    } else {
        -min_dist_squared.sqrt()
    }
}

#[derive(Clone, Copy)]
struct Cell {
    center: Coord<f64>,
    half_size: f64,
    dist: f64,
    max: f64,
}

impl Cell {
    /// `center` is already in stretched space.
    fn new(center: Coord<f64>, half_size: f64, polygon: &Polygon<f64>, stretch: f64) -> Self {
        let dist = point_to_polygon_distance(center, polygon, stretch);
        Cell { center, half_size, dist, max: dist + half_size * SQRT2 }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.max == other.max
    }
}
impl Eq for Cell {}
impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.max.partial_cmp(&other.max).unwrap_or(Ordering::Equal)
    }
}

fn centroid(polygon: &Polygon<f64>) -> Coord<f64> {
    let ring = &polygon.exterior().0;
    let (mut cx, mut cy, mut area) = (0.0, 0.0, 0.0);
    for w in ring.windows(2) {
        let (p0, p1) = (w[0], w[1]);
        let cross = p0.x * p1.y - p1.x * p0.y;
        area += cross;
        cx += (p0.x + p1.x) * cross;
        cy += (p0.y + p1.y) * cross;
    }
    area /= 2.0;
    if area.abs() < f64::EPSILON {
        // degenerate ring: fall back to the vertex average.
        let n = ring.len().max(1) as f64;
        let (sx, sy) = ring.iter().fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
        return Coord { x: sx / n, y: sy / n };
    }
    Coord { x: cx / (6.0 * area), y: cy / (6.0 * area) }
}

fn envelope(polygon: &Polygon<f64>) -> (f64, f64, f64, f64) {
    let ring = &polygon.exterior().0;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for c in ring {
        min_x = min_x.min(c.x);
        min_y = min_y.min(c.y);
        max_x = max_x.max(c.x);
        max_y = max_y.max(c.y);
    }
    (min_x, min_y, max_x, max_y)
}

/// Finds the pole of inaccessibility of `polygon`, refining until no cell
/// in the queue could improve on the best distance by more than
/// `precision`, clamped to at least `max(width, height) / 1000`.
///
/// `stretch` biases the search along the y-axis: values above 1.0 favor
/// wider spots, below 1.0 favor taller ones. The search runs entirely in
/// y-stretched space and the result's y is divided back out at the end.
/// Requires `stretch > 0`.
pub fn pole_of_inaccessibility(polygon: &Polygon<f64>, precision: f64, stretch: f64) -> Coord<f64> {
    assert!(stretch > 0.0, "stretch must be positive");

    let (min_x, min_y, max_x, max_y) = envelope(polygon);
    let (smin_y, smax_y) = (min_y * stretch, max_y * stretch);
    let width = max_x - min_x;
    let height = smax_y - smin_y;
    let precision = precision.max((width.max(height)) / 1000.0);

    if width == 0.0 || height == 0.0 {
        return Coord { x: min_x, y: min_y };
    }

    let cell_size = width.min(height);
    let h = cell_size / 2.0;
    let mut queue: BinaryHeap<Cell> = BinaryHeap::new();

    let cx = min_x + width / 2.0;
    let scy = smin_y + height / 2.0;
    if (width - height).abs() < f64::EPSILON {
        queue.push(Cell::new(Coord { x: cx, y: scy }, h, polygon, stretch));
    } else if width < height {
        let count = (height / cell_size).ceil() as i64;
        for n in 0..count {
            queue.push(Cell::new(Coord { x: cx, y: smin_y + n as f64 * cell_size + h }, h, polygon, stretch));
        }
    } else {
        let count = (width / cell_size).ceil() as i64;
        for n in 0..count {
            queue.push(Cell::new(Coord { x: min_x + n as f64 * cell_size + h, y: scy }, h, polygon, stretch));
        }
    }

    let c = centroid(polygon);
    let mut best = Cell::new(Coord { x: c.x, y: c.y * stretch }, 0.0, polygon, stretch);
    let bbox_cell = Cell::new(Coord { x: cx, y: scy }, 0.0, polygon, stretch);
    if bbox_cell.dist > best.dist {
        best = bbox_cell;
    }

    while let Some(cell) = queue.pop() {
        if cell.dist > best.dist {
            best = cell;
        }

        if cell.max - best.dist <= precision {
            continue;
        }

        let h = cell.half_size / 2.0;
        for dy in [-h, h] {
            for dx in [-h, h] {
                let c = Cell::new(Coord { x: cell.center.x + dx, y: cell.center.y + dy }, h, polygon, stretch);
                if c.max > best.dist {
                    queue.push(c);
                }
            }
        }
    }

    Coord { x: best.center.x, y: best.center.y / stretch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    fn square() -> Polygon<f64> {
        Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 10.0, y: 0.0 },
                Coord { x: 10.0, y: 10.0 },
                Coord { x: 0.0, y: 10.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )
    }

    #[test]
    fn pole_of_square_is_near_center() {
        let p = pole_of_inaccessibility(&square(), 0.01, 1.0);
        assert!((p.x - 5.0).abs() < 0.2);
        assert!((p.y - 5.0).abs() < 0.2);
    }

    #[test]
    fn pole_lies_inside_polygon() {
        let poly = square();
        let p = pole_of_inaccessibility(&poly, 0.01, 1.0);
        let dist = point_to_polygon_distance(p, &poly, 1.0);
        assert!(dist > 0.0);
        // the maximum inscribed circle of a 10x10 square has radius 5.
        assert!(dist <= 5.0 + 0.1);
    }

    #[test]
    fn stretch_biases_the_search_along_y() {
        // A 10x20 rectangle: at stretch=1.0 the pole sits on the short
        // axis' center; at stretch=4.0 the search is compressed along y,
        // so the result should still land near the same x but can't drift
        // arbitrarily off the rectangle.
        let rect = Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 10.0, y: 0.0 },
                Coord { x: 10.0, y: 20.0 },
                Coord { x: 0.0, y: 20.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        );
        let p = pole_of_inaccessibility(&rect, 0.01, 4.0);
        assert!((p.x - 5.0).abs() < 0.5);
        assert!(p.y >= 0.0 && p.y <= 20.0);
    }
}
