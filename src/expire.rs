//! Expire-tile tracker (spec §4.5): a quadtree of dirty map tiles up to a
//! fixed maximum zoom, collapsing four dirty siblings into their parent,
//! and a text writer that expands any still-coarse node back down to a
//! minimum output zoom.
//!
//! Grounded on `examples/original_source/expire-tiles.c`'s `struct tile`
//! tree (`mark_tile`/`_output_and_destroy_tree`), with the C's raw
//! pointers replaced by `Option<Box<TileNode>>` and its global `Options`/
//! `dirty` statics folded into one `ExpireTracker` value.

use std::collections::HashSet;
use std::io::Write;

use geo::{Coord, LineString, Polygon};

use crate::error::{CoreError, Result};

/// Tiles worth of space left on either side of a changed feature's path
/// (spec §4.5 "one-tile leeway either side").
const TILE_EXPIRY_LEEWAY: f64 = 0.1;
const LINE_STEP: f64 = 0.4;

#[derive(Default)]
struct TileNode {
    complete: [[bool; 2]; 2],
    children: [[Option<Box<TileNode>>; 2]; 2],
}

fn calc_complete(node: &TileNode) -> u32 {
    node.complete.iter().flatten().filter(|&&c| c).count() as u32
}

fn mark(slot: &mut Option<Box<TileNode>>, x: i64, y: i64, zoom: u32, depth: u32) -> u32 {
    let node = slot.get_or_insert_with(|| Box::new(TileNode::default()));
    let zoom_diff = zoom as i64 - depth as i64 - 1;
    let rel_x = ((x >> zoom_diff.max(0)) & 1) as usize;
    let rel_y = ((y >> zoom_diff.max(0)) & 1) as usize;

    if !node.complete[rel_x][rel_y] {
        if zoom_diff <= 0 {
            node.complete[rel_x][rel_y] = true;
        } else {
            let completed = mark(&mut node.children[rel_x][rel_y], x, y, zoom, depth + 1);
            if completed >= 4 {
                node.complete[rel_x][rel_y] = true;
                node.children[rel_x][rel_y] = None;
            }
        }
    }
    calc_complete(node)
}

fn collect(node: &TileNode, x: i64, y: i64, depth: u32, min_zoom: u32, out: &mut Vec<(u32, i64, i64)>) {
    let sub_x = x << 1;
    let sub_y = y << 1;
    for rel_x in 0..2 {
        for rel_y in 0..2 {
            let (tx, ty) = (sub_x + rel_x as i64, sub_y + rel_y as i64);
            if node.complete[rel_x][rel_y] {
                emit(depth + 1, tx, ty, min_zoom, out);
            } else if let Some(child) = &node.children[rel_x][rel_y] {
                collect(child, tx, ty, depth + 1, min_zoom, out);
            }
        }
    }
}

fn emit(zoom: u32, x: i64, y: i64, min_zoom: u32, out: &mut Vec<(u32, i64, i64)>) {
    let out_zoom = zoom.max(min_zoom);
    let zoom_diff = out_zoom - zoom;
    let count = 1i64 << zoom_diff;
    for dx in 0..count {
        for dy in 0..count {
            out.push((out_zoom, (x << zoom_diff) + dx, (y << zoom_diff) + dy));
        }
    }
}

/// Converts WGS84 degrees into fractional slippy-map tile coordinates at
/// `zoom`, matching the standard XYZ tile scheme.
fn lonlat_to_tile(coord: Coord<f64>, zoom: u32) -> (f64, f64) {
    let n = (1u64 << zoom) as f64;
    let x = (coord.x + 180.0) / 360.0 * n;
    let lat_rad = coord.y.to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * n;
    (x, y)
}

fn normalise_x(x: i64, map_width: i64) -> i64 {
    x.rem_euclid(map_width)
}

/// Tracks dirty tiles across one run and writes them out as `z/x/y` lines
/// (spec §4.5, §6).
pub struct ExpireTracker {
    zoom: u32,
    zoom_min: u32,
    max_bbox_m: f64,
    map_width: i64,
    root: Option<Box<TileNode>>,
}

impl ExpireTracker {
    /// `zoom` is the collection resolution; `zoom_min` is the coarsest
    /// zoom the output may use when a large dirty region has already
    /// collapsed above it; `max_bbox_m` bounds how large a polygon's
    /// bounding box may be before only its perimeter is expired.
    pub fn new(zoom: u32, zoom_min: u32, max_bbox_m: f64) -> Self {
        ExpireTracker { zoom, zoom_min, max_bbox_m, map_width: 1i64 << zoom, root: None }
    }

    fn mark_tile(&mut self, x: i64, y: i64) {
        let x = normalise_x(x, self.map_width);
        mark(&mut self.root, x, y, self.zoom, 0);
    }

    /// Expires every tile the segment `a`-`b` passes through, walking in
    /// tile space with a one-tile leeway either side (spec §4.5).
    pub fn expire_line(&mut self, a: Coord<f64>, b: Coord<f64>) {
        let (mut ax, mut ay) = lonlat_to_tile(a, self.zoom);
        let (mut bx, mut by) = lonlat_to_tile(b, self.zoom);

        if ax > bx {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut ay, &mut by);
        }

        let map_width = self.map_width as f64;
        let mut x_len = bx - ax;
        if x_len > map_width / 2.0 {
            // the short route crosses x = 0; the line actually wraps the
            // antimeridian, so extend `a` past the right edge instead.
            ax += map_width;
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut ay, &mut by);
            x_len = bx - ax;
        }

        let y_len = by - ay;
        let hyp_len = (x_len * x_len + y_len * y_len).sqrt();
        if hyp_len == 0.0 {
            self.expire_point_tile(ax, ay);
            return;
        }
        let x_step = x_len / hyp_len;
        let y_step = y_len / hyp_len;

        let mut step = 0.0;
        while step <= hyp_len {
            let next_step = (step + LINE_STEP).min(hyp_len);
            let x1 = ax + step * x_step;
            let y1 = ay + step * y_step;
            let x2 = ax + next_step * x_step;
            let y2 = ay + next_step * y_step;
            let (ylo, yhi) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };

            let x_lo = (x1 - TILE_EXPIRY_LEEWAY).floor() as i64;
            let x_hi = (x2 + TILE_EXPIRY_LEEWAY).floor() as i64;
            let y_lo = (ylo - TILE_EXPIRY_LEEWAY).floor() as i64;
            let y_hi = (yhi + TILE_EXPIRY_LEEWAY).floor() as i64;
            for x in x_lo..=x_hi {
                for y in y_lo..=y_hi {
                    self.mark_tile(x, y);
                }
            }
            step += LINE_STEP;
        }
    }

    fn expire_point_tile(&mut self, tx: f64, ty: f64) {
        let x_lo = (tx - TILE_EXPIRY_LEEWAY).floor() as i64;
        let x_hi = (tx + TILE_EXPIRY_LEEWAY).floor() as i64;
        let y_lo = (ty - TILE_EXPIRY_LEEWAY).floor() as i64;
        let y_hi = (ty + TILE_EXPIRY_LEEWAY).floor() as i64;
        for x in x_lo..=x_hi {
            for y in y_lo..=y_hi {
                self.mark_tile(x, y);
            }
        }
    }

    /// Expires every tile in the bounding box of `min`..`max` (degrees),
    /// failing if either side exceeds `max_bbox_m` (spec §4.5).
    pub fn expire_bbox(&mut self, min: Coord<f64>, max: Coord<f64>) -> Result<()> {
        let width_m = (max.x - min.x) * 111_320.0 * min.y.to_radians().cos().abs().max(1e-6);
        let height_m = (max.y - min.y) * 111_320.0;
        if width_m.abs() > self.max_bbox_m || height_m.abs() > self.max_bbox_m {
            return Err(CoreError::Topology("expire bounding box exceeds the configured maximum".into()));
        }

        let (min_tx, max_ty) = lonlat_to_tile(Coord { x: min.x, y: max.y }, self.zoom);
        let (max_tx, min_ty) = lonlat_to_tile(Coord { x: max.x, y: min.y }, self.zoom);
        let x_lo = (min_tx - TILE_EXPIRY_LEEWAY).floor() as i64;
        let x_hi = (max_tx + TILE_EXPIRY_LEEWAY).floor() as i64;
        let y_lo = (min_ty - TILE_EXPIRY_LEEWAY).floor().max(0.0) as i64;
        let y_hi = (max_ty + TILE_EXPIRY_LEEWAY).floor() as i64;

        for x in x_lo..=x_hi {
            for y in y_lo..=y_hi {
                self.mark_tile(x, y);
            }
        }
        Ok(())
    }

    /// Expires a polyline's tiles edge by edge.
    pub fn expire_linestring(&mut self, line: &LineString<f64>) {
        for w in line.0.windows(2) {
            self.expire_line(w[0], w[1]);
        }
    }

    /// Expires a polygon's bounding box, falling back to the perimeter
    /// when the box is too large (spec §4.5).
    pub fn expire_polygon(&mut self, polygon: &Polygon<f64>) {
        let ring = &polygon.exterior().0;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in ring {
            min_x = min_x.min(c.x);
            min_y = min_y.min(c.y);
            max_x = max_x.max(c.x);
            max_y = max_y.max(c.y);
        }

        let min = Coord { x: min_x, y: min_y };
        let max = Coord { x: max_x, y: max_y };
        if self.expire_bbox(min, max).is_err() {
            self.expire_linestring(polygon.exterior());
        }
    }

    /// Writes every dirty tile as a `z/x/y` line, expanding tiles
    /// collapsed above `zoom_min` back down to it, then clears the tree.
    pub fn write_and_clear<W: Write>(&mut self, mut out: W) -> Result<()> {
        let mut tiles = Vec::new();
        if let Some(root) = self.root.take() {
            collect(&root, 0, 0, 0, self.zoom_min, &mut tiles);
        }
        // the tree already dedupes by construction; a `HashSet` guards
        // only against the rare zoom_min expansion overlap.
        let mut seen = HashSet::with_capacity(tiles.len());
        for (z, x, y) in tiles {
            if seen.insert((z, x, y)) {
                writeln!(out, "{z}/{x}/{y}").map_err(CoreError::from)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_all_four_children_collapses_into_parent() {
        let mut t = ExpireTracker::new(2, 0, 20_000.0);
        t.mark_tile(0, 0);
        t.mark_tile(1, 0);
        t.mark_tile(0, 1);
        t.mark_tile(1, 1);
        let root = t.root.as_ref().unwrap();
        assert!(root.complete[0][0]);
    }

    #[test]
    fn scenario_e6_line_crosses_antimeridian() {
        // Scenario E6 from spec §8: a line from (179,0) to (-179,0) at
        // zoom 15 expires tiles on both sides of the antimeridian, not
        // the short route through x=0.
        let mut t = ExpireTracker::new(15, 0, 20_000.0);
        t.expire_line(Coord { x: 179.0, y: 0.0 }, Coord { x: -179.0, y: 0.0 });

        let map_width = 1i64 << 15;
        let mut buf = Vec::new();
        t.write_and_clear(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let xs: Vec<i64> = text.lines().map(|l| l.split('/').nth(1).unwrap().parse().unwrap()).collect();
        assert!(xs.iter().any(|&x| x < map_width / 4 || x > map_width - map_width / 4));
        assert!(!xs.iter().any(|&x| (map_width / 2 - 10..map_width / 2 + 10).contains(&x)));
    }

    #[test]
    fn bbox_over_max_size_is_rejected() {
        let mut t = ExpireTracker::new(15, 0, 1.0);
        let err = t.expire_bbox(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 });
        assert!(err.is_err());
    }
}
