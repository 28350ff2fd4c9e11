//! The `Options` struct (spec §6 "Environment/config") that every other
//! module is constructed from or threaded a reference to.
//!
//! Grounded on `examples/nyurik-osm2rdf/src/lib.rs`'s `Args`/`Command`
//! pair: there, `clap::Parser` derives directly onto the struct that is
//! passed around. Because command-line parsing is explicitly out of scope
//! for the core (spec §1), `Options` itself carries no `clap` derive —
//! the demo binary (`src/bin/main.rs`) has its own `clap`-derived `Args`
//! and builds an `Options` from it, the same separation
//! `middle-pgsql.c`/`osm2pgsql.c` keep between `options_t` and `getopt`
//! parsing in the original.

use std::path::PathBuf;

/// Node cache allocation strategy (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    Dense,
    Sparse,
    #[default]
    DenseAndSparse,
}

/// The single configuration struct threaded by reference into `Middle`,
/// `NodeCache` and the COPY pipeline.
#[derive(Debug, Clone)]
pub struct Options {
    /// `libpq`-style connection string for the target database.
    pub conninfo: String,
    /// Table name prefix (e.g. `planet_osm`).
    pub prefix: String,
    /// Fixed-point scale used by the node caches. Default 10,000,000 so
    /// that ±20,000 km mercator fits in 32 bits (spec §3).
    pub scale: i32,
    /// Target SRID for projected geometry output.
    pub projection_srid: i32,
    /// True when processing a change file against an existing database
    /// rather than an initial planet load.
    pub append: bool,
    /// True selects the database-backed ("slim") middle; false selects the
    /// RAM-only middle.
    pub slim: bool,
    /// Total RAM budget, in MiB, for the node location cache.
    pub ram_budget_mb: u32,
    pub strategy: CacheStrategy,
    /// Allocate the dense arena in `PER_BLOCK`-sized chunks rather than one
    /// monolithic allocation.
    pub dense_chunked: bool,
    /// Drop the least-valuable block instead of aborting when the RAM
    /// budget is exhausted.
    pub lossy: bool,
    /// Path to the file-backed node cache, when the RAM budget is
    /// undersized relative to the input.
    pub persistent_cache_file: Option<PathBuf>,
    /// Tag-filter/style file path, opaque to the core (spec §1).
    pub style_file: Option<PathBuf>,
    pub expire_tiles_zoom: Option<u8>,
    pub expire_tiles_zoom_min: Option<u8>,
    pub expire_tiles_filename: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            conninfo: String::new(),
            prefix: "planet_osm".to_string(),
            scale: 10_000_000,
            projection_srid: 4326,
            append: false,
            slim: false,
            ram_budget_mb: 800,
            strategy: CacheStrategy::default(),
            dense_chunked: false,
            lossy: false,
            persistent_cache_file: None,
            style_file: None,
            expire_tiles_zoom: None,
            expire_tiles_zoom_min: None,
            expire_tiles_filename: None,
        }
    }
}
