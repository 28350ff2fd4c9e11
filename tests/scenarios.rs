//! End-to-end scenarios E1-E6 (spec §8), driven through the crate's public
//! API rather than its internal unit tests, so a change that breaks the
//! wiring between modules fails here even if each module's own tests still
//! pass in isolation.

use std::sync::mpsc;

use geo::Geometry;

use osm2pgsql_core::copy::{Command, CopyManager, CopyTarget, CopyWriterHandle};
use osm2pgsql_core::expire::ExpireTracker;
use osm2pgsql_core::geom::assembler::{self, MultipolygonMember};
use osm2pgsql_core::geom::segmentize::segmentize;
use osm2pgsql_core::geom::GeometryResult;
use osm2pgsql_core::model::{MemberType, NodeLocation, RelationMember};
use std::sync::Arc;

fn loc(lon: f64, lat: f64) -> NodeLocation {
    NodeLocation::new(lon, lat)
}

fn ring_area(points: &[geo::Coord<f64>]) -> f64 {
    let mut sum = 0.0;
    for w in points.windows(2) {
        sum += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    (sum / 2.0).abs()
}

#[test]
fn e1_single_way_polygon() {
    let nodes = [loc(1.0, 1.0), loc(2.0, 1.0), loc(2.0, 2.0), loc(1.0, 2.0), loc(1.0, 1.0)];
    let result = assembler::create_polygon(&nodes);
    let Geometry::Polygon(polygon) = result.ok().expect("single closed way builds a polygon") else {
        panic!("expected a polygon");
    };
    assert_eq!(polygon.exterior().0, nodes.iter().map(|&n| geo::Coord { x: n.lon, y: n.lat }).collect::<Vec<_>>());
    assert!((ring_area(&polygon.exterior().0) - 1.0).abs() < 1e-9);
}

#[test]
fn e2_multipolygon_with_hole() {
    let outer = [loc(0.0, 0.0), loc(3.0, 0.0), loc(3.0, 3.0), loc(0.0, 3.0), loc(0.0, 0.0)];
    let inner = [loc(1.0, 1.0), loc(2.0, 1.0), loc(2.0, 2.0), loc(1.0, 2.0), loc(1.0, 1.0)];

    let outer_member = RelationMember { member_type: MemberType::Way, member_ref: 1, role: "outer".into() };
    let inner_member = RelationMember { member_type: MemberType::Way, member_ref: 2, role: "inner".into() };
    let members = vec![
        MultipolygonMember { member: &outer_member, resolved_nodes: outer.to_vec() },
        MultipolygonMember { member: &inner_member, resolved_nodes: inner.to_vec() },
    ];

    let result = assembler::create_multipolygon(&members);
    let Geometry::Polygon(polygon) = result.ok().expect("one outer with one hole builds a single polygon") else {
        panic!("expected a single polygon, not a multipolygon, for one outer ring");
    };

    let outer_area = ring_area(&polygon.exterior().0);
    assert!((outer_area - 9.0).abs() < 1e-9);
    assert_eq!(polygon.interiors().len(), 1);
    let inner_area = ring_area(&polygon.interiors()[0].0);
    assert!((inner_area - 1.0).abs() < 1e-9);
    assert!((outer_area - inner_area - 8.0).abs() < 1e-9);
}

#[test]
fn e3_line_merge_y_shape_has_two_components() {
    use geo::{LineString, MultiLineString};
    use osm2pgsql_core::geom::line_merge::line_merge;

    let n = geo::Coord { x: 1.0, y: 1.0 };
    let lines = MultiLineString(vec![
        LineString::new(vec![n, geo::Coord { x: 2.0, y: 1.0 }]),
        LineString::new(vec![n, geo::Coord { x: 1.0, y: 2.0 }]),
        LineString::new(vec![n, geo::Coord { x: 2.0, y: 2.0 }]),
    ]);

    let merged = line_merge(&lines);
    assert_eq!(merged.0.len(), 2, "a Y-junction merges into exactly two components, one branch left dangling");
}

#[test]
fn e4_segmentize_three_pieces() {
    let line = geo::LineString::new(vec![geo::Coord { x: 0.0, y: 0.0 }, geo::Coord { x: 1.0, y: 0.0 }]);
    let result = segmentize(&line, 0.4);
    assert_eq!(result.0.len(), 4, "three 0.4-length segments need four points");
    for w in result.0.windows(2) {
        let len = ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt();
        assert!(len <= 0.4 + 1e-9);
    }
    assert_eq!(*result.0.first().unwrap(), geo::Coord { x: 0.0, y: 0.0 });
    assert_eq!(*result.0.last().unwrap(), geo::Coord { x: 1.0, y: 0.0 });
}

#[test]
fn e5_change_file_modify_deletes_before_inserting() {
    // A node moving from (0,0) to (5,5): the writer must see the delete
    // for the old row queued in the same buffer as the new row, ahead of
    // it, so the table never transiently holds both.
    let (probe_tx, probe_rx) = mpsc::channel();
    let handle = CopyWriterHandle::for_test(probe_tx);
    let mut copy = CopyManager::new(handle);

    let target = Arc::new(CopyTarget { name: "planet_osm_point".into(), columns: None, id_column: "osm_id".into() });
    copy.new_line(target.clone());
    copy.delete_id(5);
    copy.add_int_column(5);
    let geom = assembler::create_point(loc(5.0, 5.0));
    copy.add_geometry_column(&geom, 4326).unwrap();
    copy.finish_line();
    copy.sync();

    let mut saw_copy = false;
    while let Ok(cmd) = probe_rx.recv() {
        match cmd {
            Command::Copy { target: t, deletes, buffer } => {
                assert_eq!(t.name, "planet_osm_point");
                assert_eq!(deletes, vec![5]);
                assert!(buffer.starts_with('5'), "new row for id 5 must be present in the flushed buffer");
                saw_copy = true;
            }
            Command::Sync(ack) => {
                let _ = ack.send(());
                break;
            }
            other => panic!("unexpected command before sync: {other:?}"),
        }
    }
    assert!(saw_copy, "expected exactly one Copy command carrying both the delete and the new row");
}

#[test]
fn e6_expire_tiles_line_crossing_antimeridian() {
    let mut tracker = ExpireTracker::new(15, 0, 20_000.0);
    tracker.expire_line(geo::Coord { x: 179.0, y: 0.0 }, geo::Coord { x: -179.0, y: 0.0 });

    let mut buf = Vec::new();
    tracker.write_and_clear(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let map_width = 1i64 << 15;
    let xs: Vec<i64> = text.lines().map(|l| l.split('/').nth(1).unwrap().parse().unwrap()).collect();

    assert!(!xs.is_empty());
    assert!(xs.iter().any(|&x| x < map_width / 4 || x > map_width - map_width / 4));
    assert!(!xs.iter().any(|&x| (map_width / 2 - 10..map_width / 2 + 10).contains(&x)));
}

// Sanity check that a way which fails to close is rejected rather than
// silently coerced into a polygon (ties P2 to the public API).
#[test]
fn p2_unclosed_way_never_becomes_a_polygon() {
    let nodes = [loc(1.0, 1.0), loc(2.0, 1.0), loc(2.0, 2.0)];
    assert!(matches!(assembler::create_polygon(&nodes), GeometryResult::Invalid(_)));
}
