//! Middle layer, geometry assembler and COPY pipeline for ingesting
//! OpenStreetMap data into a spatial database.
//!
//! Reading the OSM wire formats (XML/PBF/O5M) and a full command-line
//! importer are out of scope for this crate (spec §1): callers plug a
//! decoder in through [`reader::Reader`] and drive the rest of the
//! pipeline by hand. `src/bin/main.rs` is a thin demonstration of that
//! wiring, not a replacement for the real `osm2pgsql` CLI.

pub mod cache;
pub mod copy;
pub mod error;
pub mod ewkb;
pub mod expire;
pub mod geom;
pub mod middle;
pub mod model;
pub mod options;
pub mod reader;

pub use error::{CoreError, Result};
pub use options::Options;
