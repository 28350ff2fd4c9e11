//! A thin demonstration CLI wiring the library's pieces into one pipeline:
//! an [`osm2pgsql_core::reader::Reader`] event stream drives a
//! [`osm2pgsql_core::middle::Middle`], which feeds the geometry assembler,
//! which feeds the COPY pipeline.
//!
//! Decoding a real OSM XML/PBF/O5M file is out of scope for this crate
//! (spec §1), so `--demo` is the only input source wired up here: it
//! drives a small synthetic dataset through the full pipeline so the
//! plumbing can be exercised end to end without a real file or a live
//! database connection to fall back on.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use geo::Geometry;
use log::{info, warn};

use osm2pgsql_core::copy::{CopyManager, CopyTarget, CopyWriter};
use osm2pgsql_core::expire::ExpireTracker;
use osm2pgsql_core::geom::project::{Projection, SphericalMercator, Wgs84};
use osm2pgsql_core::geom::{assembler, segmentize::segmentize, simplify};
use osm2pgsql_core::middle::{Middle, RamMiddle, SlimMiddle};
use osm2pgsql_core::model::{Action, MemberType, NodeLocation, ObjectKind, ObjectState, OsmId, RelationMember, Tags};
use osm2pgsql_core::options::{CacheStrategy, Options};
use osm2pgsql_core::reader::{Event, IterReader, Reader};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CacheStrategyArg {
    Dense,
    Sparse,
    DenseAndSparse,
}

impl From<CacheStrategyArg> for CacheStrategy {
    fn from(v: CacheStrategyArg) -> Self {
        match v {
            CacheStrategyArg::Dense => CacheStrategy::Dense,
            CacheStrategyArg::Sparse => CacheStrategy::Sparse,
            CacheStrategyArg::DenseAndSparse => CacheStrategy::DenseAndSparse,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// libpq-style connection string for the target database.
    #[arg(long, default_value = "host=localhost dbname=osm")]
    conninfo: String,

    /// Table name prefix.
    #[arg(long, default_value = "planet_osm")]
    prefix: String,

    /// Target SRID for stored geometry: 4326 (WGS84) or 3857 (Web Mercator).
    #[arg(long, default_value_t = 4326)]
    srid: i32,

    /// Use the database-backed slim middle instead of the RAM-only middle.
    #[arg(long)]
    slim: bool,

    /// Process a change file against existing data rather than an initial load.
    #[arg(long)]
    append: bool,

    /// Total RAM budget for the node location cache, e.g. "800MB" or "2GB".
    #[arg(long, default_value = "800MB")]
    ram_budget: bytesize::ByteSize,

    /// Node cache allocation strategy.
    #[arg(long, value_enum, default_value_t = CacheStrategyArg::DenseAndSparse)]
    cache_strategy: CacheStrategyArg,

    /// Drop cache entries instead of aborting when the RAM budget runs out.
    #[arg(long)]
    lossy: bool,

    /// Spill the node cache to this file once the RAM budget is exhausted.
    #[arg(long)]
    node_cache_file: Option<PathBuf>,

    /// Split a way's geometry into pieces no longer than this, in degrees.
    #[arg(long)]
    max_segment_length: Option<f64>,

    /// Douglas-Peucker simplification tolerance, in degrees.
    #[arg(long)]
    simplify_epsilon: Option<f64>,

    /// Zoom level to collect expired tiles at.
    #[arg(long)]
    expire_tiles_zoom: Option<u8>,

    /// Coarsest zoom the expiry output may use (defaults to expire-tiles-zoom).
    #[arg(long)]
    expire_tiles_zoom_min: Option<u8>,

    /// File to write expired `z/x/y` tile coordinates to.
    #[arg(long)]
    expire_tiles_file: Option<PathBuf>,

    /// Bounding-box size, in metres, above which a changed polygon's
    /// perimeter is expired instead of its full bounding box.
    #[arg(long, default_value_t = 20_000.0)]
    expire_max_bbox_m: f64,

    /// Run the built-in demonstration dataset through the pipeline.
    #[arg(long)]
    demo: bool,
}

fn build_options(args: &Args) -> Options {
    Options {
        conninfo: args.conninfo.clone(),
        prefix: args.prefix.clone(),
        projection_srid: args.srid,
        append: args.append,
        slim: args.slim,
        ram_budget_mb: (args.ram_budget.as_u64() / (1024 * 1024)).max(1) as u32,
        strategy: args.cache_strategy.into(),
        lossy: args.lossy,
        persistent_cache_file: args.node_cache_file.clone(),
        expire_tiles_zoom: args.expire_tiles_zoom,
        expire_tiles_zoom_min: args.expire_tiles_zoom_min.or(args.expire_tiles_zoom),
        expire_tiles_filename: args.expire_tiles_file.clone(),
        ..Options::default()
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let options = build_options(&args);

    if !args.demo {
        anyhow::bail!("reading a real OSM file is out of scope for this crate; pass --demo to exercise the pipeline");
    }

    let projection: Box<dyn Projection> = if options.projection_srid == 3857 {
        Box::new(SphericalMercator)
    } else {
        Box::new(Wgs84)
    };

    let writer = CopyWriter::spawn(options.conninfo.clone());
    let mut copy = CopyManager::new(writer.handle());
    let targets = Targets::new(&options.prefix);

    let mut middle: Box<dyn Middle> = if options.slim {
        Box::new(SlimMiddle::connect(&options)?)
    } else {
        Box::new(RamMiddle::new(&options)?)
    };

    let mut expire = options
        .expire_tiles_zoom
        .map(|zoom| ExpireTracker::new(u32::from(zoom), u32::from(options.expire_tiles_zoom_min.unwrap_or(zoom)), args.expire_max_bbox_m));

    let mut reader = IterReader::new(demo_events());
    let mut current_way: Option<(OsmId, Tags, Action, Vec<OsmId>)> = None;
    let mut current_relation: Option<(OsmId, Tags, Action, Vec<RelationMember>)> = None;

    while let Some(event) = reader.next_event()? {
        match event {
            Event::Node { id, location, tags, action } => {
                if action == Action::Delete {
                    middle.nodes_delete(id)?;
                    middle.node_changed(id)?;
                    continue;
                }
                middle.nodes_set(id, location, &tags)?;
                middle.node_changed(id)?;
                if !tags.is_empty() {
                    emit_point(&mut copy, &targets, &mut expire, projection.as_ref(), id, location, &tags)?;
                }
            }
            Event::StartWay { id, tags, action } => current_way = Some((id, tags, action, Vec::new())),
            Event::WayRef(node_id) => {
                if let Some((_, _, _, refs)) = current_way.as_mut() {
                    refs.push(node_id);
                }
            }
            Event::StartRelation { id, tags, action } => current_relation = Some((id, tags, action, Vec::new())),
            Event::RelMember { member_type, member_ref, role } => {
                if let Some((_, _, _, members)) = current_relation.as_mut() {
                    members.push(RelationMember { member_type, member_ref, role });
                }
            }
            Event::EndObject => {
                if let Some((id, tags, action, node_ids)) = current_way.take() {
                    process_way(middle.as_mut(), &mut copy, &targets, &mut expire, projection.as_ref(), &args, id, tags, action, node_ids)?;
                } else if let Some((id, tags, action, members)) = current_relation.take() {
                    process_relation(middle.as_mut(), &mut copy, &targets, &mut expire, projection.as_ref(), id, tags, action, members)?;
                }
            }
            Event::Delete { kind, id } => match kind {
                ObjectKind::Node => {
                    middle.nodes_delete(id)?;
                    middle.node_changed(id)?;
                }
                ObjectKind::Way => {
                    middle.ways_delete(id)?;
                    middle.way_changed(id)?;
                }
                ObjectKind::Relation => middle.relations_delete(id)?,
            },
        }
    }

    // Append mode may have marked ways/relations pending without this run
    // having seen a fresh copy of them; replay whatever is still pending.
    middle.iterate_ways(&mut |id, tags, coords| {
        if let Some(geom) = build_way_geometry(coords, &args) {
            let geom = finish_geometry(geom, &args, projection.as_ref());
            if let Some(geom) = geom {
                if let Some(tracker) = expire.as_mut() {
                    mark_expired(tracker, &geom);
                }
                let target = target_for(&targets, &geom);
                if emit_geometry(&mut copy, target, id, tags, &geom, projection.srid()).is_err() {
                    warn!("failed to emit replayed way {id}");
                }
            }
        }
    })?;
    // Resolving a pending relation's members back into geometry needs a
    // second borrow of `middle` that this callback signature can't offer;
    // a real append run would hand these ids to a follow-up pass instead.
    let mut pending_relations = 0usize;
    middle.iterate_relations(&mut |_id, _tags, _members| pending_relations += 1)?;
    if pending_relations > 0 {
        info!("{pending_relations} relation(s) remained pending after this run");
    }

    copy.sync();
    drop(copy);
    writer.finish();

    if let Some(tracker) = expire.as_mut() {
        match &options.expire_tiles_filename {
            Some(path) => {
                let file = File::create(path)?;
                tracker.write_and_clear(file)?;
            }
            None => {
                let mut buf = Vec::new();
                tracker.write_and_clear(&mut buf)?;
                info!("{} tile(s) expired (no --expire-tiles-file given)", String::from_utf8_lossy(&buf).lines().count());
            }
        }
    }

    Ok(())
}

struct Targets {
    point: Arc<CopyTarget>,
    line: Arc<CopyTarget>,
    polygon: Arc<CopyTarget>,
}

impl Targets {
    fn new(prefix: &str) -> Self {
        let target = |suffix: &str| {
            Arc::new(CopyTarget { name: format!("{prefix}_{suffix}"), columns: None, id_column: "osm_id".into() })
        };
        Targets { point: target("point"), line: target("line"), polygon: target("polygon") }
    }
}

fn target_for<'a>(targets: &'a Targets, geom: &Geometry<f64>) -> &'a Arc<CopyTarget> {
    match geom {
        Geometry::Point(_) => &targets.point,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => &targets.polygon,
        _ => &targets.line,
    }
}

fn emit_point(
    copy: &mut CopyManager,
    targets: &Targets,
    expire: &mut Option<ExpireTracker>,
    projection: &dyn Projection,
    id: OsmId,
    location: NodeLocation,
    tags: &Tags,
) -> anyhow::Result<()> {
    let geom = assembler::create_point(location);
    let geom = reproject(geom, projection);
    if let Some(tracker) = expire.as_mut() {
        mark_expired(tracker, &geom);
    }
    emit_geometry(copy, &targets.point, id, tags, &geom, projection.srid())
}

#[allow(clippy::too_many_arguments)]
fn process_way(
    middle: &mut dyn Middle,
    copy: &mut CopyManager,
    targets: &Targets,
    expire: &mut Option<ExpireTracker>,
    projection: &dyn Projection,
    args: &Args,
    id: OsmId,
    tags: Tags,
    action: Action,
    node_ids: Vec<OsmId>,
) -> anyhow::Result<()> {
    if action == Action::Delete {
        middle.ways_delete(id)?;
        middle.way_changed(id)?;
        return Ok(());
    }

    middle.ways_set(id, node_ids, tags.clone(), ObjectState::Fresh)?;
    if tags.is_empty() {
        return Ok(());
    }
    let Some((_, resolved)) = middle.ways_get(id) else {
        return Ok(());
    };

    if let Some(geom) = build_way_geometry(&resolved, args) {
        if let Some(geom) = finish_geometry(geom, args, projection) {
            if let Some(tracker) = expire.as_mut() {
                mark_expired(tracker, &geom);
            }
            let target = target_for(targets, &geom);
            emit_geometry(copy, target, id, &tags, &geom, projection.srid())?;
        }
    }
    Ok(())
}

/// Builds a linestring, or a polygon when the way is closed with at least
/// four positions — the same closed-way-is-an-area heuristic the original
/// applies before consulting its (here out-of-scope) tag style file.
fn build_way_geometry(resolved: &[NodeLocation], _args: &Args) -> Option<Geometry<f64>> {
    let closed = resolved.len() >= 4 && resolved.first() == resolved.last();
    let result = if closed { assembler::create_polygon(resolved) } else { assembler::create_linestring(resolved) };
    result.ok()
}

fn finish_geometry(geom: Geometry<f64>, args: &Args, projection: &dyn Projection) -> Option<Geometry<f64>> {
    let geom = apply_segmentize(geom, args.max_segment_length);
    let geom = match apply_simplify(geom, args.simplify_epsilon) {
        Some(g) => g,
        None => {
            warn!("dropping a geometry that failed to simplify");
            return None;
        }
    };
    Some(reproject(geom, projection))
}

fn apply_segmentize(geom: Geometry<f64>, max_length: Option<f64>) -> Geometry<f64> {
    let Some(max_length) = max_length else { return geom };
    match geom {
        Geometry::LineString(ls) => {
            let mut pieces = segmentize(&ls, max_length);
            if pieces.0.len() == 1 {
                Geometry::LineString(pieces.0.remove(0))
            } else {
                Geometry::MultiLineString(pieces)
            }
        }
        other => other,
    }
}

fn apply_simplify(geom: Geometry<f64>, epsilon: Option<f64>) -> Option<Geometry<f64>> {
    let Some(epsilon) = epsilon else { return Some(geom) };
    match geom {
        Geometry::LineString(ls) => simplify::simplify_linestring(&ls, epsilon).ok(),
        Geometry::Polygon(p) => simplify::simplify_polygon(&p, epsilon).ok(),
        other => Some(other),
    }
}

fn reproject(geom: Geometry<f64>, projection: &dyn Projection) -> Geometry<f64> {
    use geo::{LineString, Point, Polygon};

    match geom {
        Geometry::Point(p) => Geometry::Point(Point(projection.project(p.0))),
        Geometry::LineString(ls) => {
            Geometry::LineString(LineString::new(ls.0.into_iter().map(|c| projection.project(c)).collect()))
        }
        Geometry::Polygon(p) => {
            let exterior = LineString::new(p.exterior().0.iter().map(|c| projection.project(*c)).collect());
            let interiors = p
                .interiors()
                .iter()
                .map(|r| LineString::new(r.0.iter().map(|c| projection.project(*c)).collect()))
                .collect();
            Geometry::Polygon(Polygon::new(exterior, interiors))
        }
        Geometry::MultiPolygon(mp) => {
            Geometry::MultiPolygon(geo::MultiPolygon(mp.0.into_iter().map(|p| match reproject(Geometry::Polygon(p), projection) {
                Geometry::Polygon(p) => p,
                _ => unreachable!("reprojecting a polygon always yields a polygon"),
            }).collect()))
        }
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(geo::MultiLineString(
            mls.0
                .into_iter()
                .map(|ls| LineString::new(ls.0.into_iter().map(|c| projection.project(c)).collect()))
                .collect(),
        )),
        other => other,
    }
}

fn mark_expired(tracker: &mut ExpireTracker, geom: &Geometry<f64>) {
    match geom {
        Geometry::LineString(ls) => tracker.expire_linestring(ls),
        Geometry::Polygon(p) => tracker.expire_polygon(p),
        Geometry::MultiPolygon(mp) => {
            for p in &mp.0 {
                tracker.expire_polygon(p);
            }
        }
        Geometry::Point(p) => tracker.expire_linestring(&geo::LineString::new(vec![p.0, p.0])),
        Geometry::MultiLineString(mls) => {
            for ls in &mls.0 {
                tracker.expire_linestring(ls);
            }
        }
        _ => {}
    }
}

fn emit_geometry(
    copy: &mut CopyManager,
    target: &Arc<CopyTarget>,
    id: OsmId,
    tags: &Tags,
    geom: &Geometry<f64>,
    srid: i32,
) -> anyhow::Result<()> {
    copy.new_line(target.clone());
    copy.add_int_column(id);
    copy.add_hash_column(tags);
    copy.add_geometry_column(geom, srid)?;
    copy.finish_line();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_relation(
    middle: &mut dyn Middle,
    copy: &mut CopyManager,
    targets: &Targets,
    expire: &mut Option<ExpireTracker>,
    projection: &dyn Projection,
    id: OsmId,
    tags: Tags,
    action: Action,
    members: Vec<RelationMember>,
) -> anyhow::Result<()> {
    if action == Action::Delete {
        middle.relations_delete(id)?;
        return Ok(());
    }

    middle.relations_set(id, members.clone(), tags.clone())?;
    let is_area = matches!(tags.get("type"), Some("multipolygon") | Some("boundary"));
    if !is_area {
        return Ok(());
    }

    let mut resolved = Vec::new();
    for member in &members {
        if member.member_type != MemberType::Way {
            continue;
        }
        if let Some((_, coords)) = middle.ways_get(member.member_ref) {
            resolved.push(assembler::MultipolygonMember { member, resolved_nodes: coords });
        }
    }

    if let Some(geom) = assembler::create_multipolygon(&resolved).ok() {
        let geom = reproject(geom, projection);
        if let Some(tracker) = expire.as_mut() {
            mark_expired(tracker, &geom);
        }
        emit_geometry(copy, &targets.polygon, id, &tags, &geom, projection.srid())?;
        middle.relations_done(id)?;
    }
    Ok(())
}

/// A handful of nodes, a line way, a building way and a multipolygon
/// relation with one hole, enough to exercise every code path the demo
/// pipeline drives.
fn demo_events() -> Vec<Event> {
    let node = |id, lon, lat, tags: Tags| Event::Node { id, location: NodeLocation::new(lon, lat), tags, action: Action::Create };

    let mut shop_tags = Tags::new();
    shop_tags.insert("shop", "bakery");
    shop_tags.insert("name", "Corner Bakery");

    let mut highway_tags = Tags::new();
    highway_tags.insert("highway", "residential");
    highway_tags.insert("name", "Example Street");

    let mut building_tags = Tags::new();
    building_tags.insert("building", "yes");

    let mut mp_tags = Tags::new();
    mp_tags.insert("type", "multipolygon");
    mp_tags.insert("landuse", "forest");

    vec![
        // A standalone tagged point.
        node(1, 0.5, 0.5, shop_tags),
        // A line way.
        node(10, 0.0, 0.0, Tags::new()),
        node(11, 1.0, 1.0, Tags::new()),
        Event::StartWay { id: 100, tags: highway_tags, action: Action::Create },
        Event::WayRef(10),
        Event::WayRef(11),
        Event::EndObject,
        // A closed building way (scenario E1).
        node(20, 1.0, 1.0, Tags::new()),
        node(21, 2.0, 1.0, Tags::new()),
        node(22, 2.0, 2.0, Tags::new()),
        node(23, 1.0, 2.0, Tags::new()),
        Event::StartWay { id: 200, tags: building_tags, action: Action::Create },
        Event::WayRef(20),
        Event::WayRef(21),
        Event::WayRef(22),
        Event::WayRef(23),
        Event::WayRef(20),
        Event::EndObject,
        // A multipolygon with one hole (scenario E2): outer 0..3 square,
        // inner a smaller square fully contained in it.
        node(30, 0.0, 0.0, Tags::new()),
        node(31, 3.0, 0.0, Tags::new()),
        node(32, 3.0, 3.0, Tags::new()),
        node(33, 0.0, 3.0, Tags::new()),
        Event::StartWay { id: 300, tags: Tags::new(), action: Action::Create },
        Event::WayRef(30),
        Event::WayRef(31),
        Event::WayRef(32),
        Event::WayRef(33),
        Event::WayRef(30),
        Event::EndObject,
        node(40, 1.0, 1.0, Tags::new()),
        node(41, 2.0, 1.0, Tags::new()),
        node(42, 2.0, 2.0, Tags::new()),
        node(43, 1.0, 2.0, Tags::new()),
        Event::StartWay { id: 301, tags: Tags::new(), action: Action::Create },
        Event::WayRef(40),
        Event::WayRef(41),
        Event::WayRef(42),
        Event::WayRef(43),
        Event::WayRef(40),
        Event::EndObject,
        Event::StartRelation { id: 400, tags: mp_tags, action: Action::Create },
        Event::RelMember { member_type: MemberType::Way, member_ref: 300, role: "outer".into() },
        Event::RelMember { member_type: MemberType::Way, member_ref: 301, role: "inner".into() },
        Event::EndObject,
    ]
}
