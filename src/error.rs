//! Typed error kinds, per §7 of the design: input, cache, persistent I/O,
//! database and topology failures each get their own variant so callers can
//! match on what went wrong instead of parsing strings.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::OsmId;

/// The one error type returned by this crate's fallible operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A malformed OSM object or an unresolvable reference. Recoverable:
    /// callers should drop the offending geometry and continue.
    #[error("input error: {0}")]
    Input(String),

    /// Cache out-of-memory without `lossy`, or another unrecoverable cache
    /// condition.
    #[error("node cache error: {0}")]
    Cache(String),

    /// Short read/write or bad header on the persistent node cache file.
    #[error("persistent cache I/O error on {path}: {source}")]
    PersistentIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persistent cache header does not match what this build expects.
    #[error("persistent cache header mismatch in {path}: {reason}")]
    BadHeader { path: PathBuf, reason: String },

    /// Connection loss, unexpected status, or COPY rejection from the
    /// database.
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),

    /// Ring assembly failed, or a ring did not close.
    #[error("topology error: {0}")]
    Topology(String),

    /// An id that should have resolved to a stored object did not.
    #[error("unknown id {0} ({1})")]
    UnknownId(OsmId, &'static str),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// I/O errors surfaced while reading/writing the in-memory EWKB buffer
/// (`crate::ewkb`) are reported as malformed input rather than getting a
/// dedicated variant — a short EWKB buffer is a data problem, not a
/// filesystem one.
impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Input(format!("EWKB I/O error: {e}"))
    }
}
