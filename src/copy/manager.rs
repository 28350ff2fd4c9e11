//! Buffer-building API for producers (spec §4.3), mirroring
//! `examples/original_source/db-copy.hpp`'s `db_copy_mgr_t`: accumulate
//! COPY text into a per-target buffer, batching deletes and row inserts,
//! and hand finished buffers off to the writer thread in emission order.

use std::sync::Arc;

use crate::error::Result;

use super::wire;
use super::writer::{Command, CopyTarget, CopyWriterHandle};
use crate::model::OsmId;

/// A buffer is also closed once it grows past this size, even if the
/// producer keeps writing to the same target (spec §3 CopyBuffer, spec §5).
const BUFFER_FLUSH_THRESHOLD: usize = 10 * 1024 * 1024;

/// Accumulates COPY rows for one table at a time and forwards finished
/// buffers to a [`CopyWriterHandle`], same role as `db_copy_mgr_t`.
pub struct CopyManager {
    writer: CopyWriterHandle,
    current: Option<PendingBuffer>,
}

struct PendingBuffer {
    target: Arc<CopyTarget>,
    deletes: Vec<OsmId>,
    buffer: String,
}

impl CopyManager {
    pub fn new(writer: CopyWriterHandle) -> Self {
        CopyManager { writer, current: None }
    }

    /// Starts a new row for `table`. Flushes whatever buffer is open if it
    /// targets a different table.
    pub fn new_line(&mut self, target: Arc<CopyTarget>) {
        let needs_flush = match &self.current {
            Some(p) => p.target.name != target.name || p.target.columns != target.columns,
            None => false,
        };
        if needs_flush {
            self.flush_current();
        }
        if self.current.is_none() {
            self.current = Some(PendingBuffer { target, deletes: Vec::new(), buffer: String::new() });
        }
    }

    /// Appends a column's already-encoded text, inserting the column
    /// separator first if this isn't the row's first column.
    fn add_column(&mut self, value: &str) {
        self.add_tab_if_needed();
        let pending = self.current.as_mut().expect("add_column called with no open row");
        pending.buffer.push_str(value);
    }

    /// Appends a text column, applying COPY escaping.
    pub fn add_text_column(&mut self, value: &str) {
        self.add_column(&wire::escape_text(value));
    }

    /// Appends an integer column.
    pub fn add_int_column(&mut self, value: i64) {
        self.add_column(&value.to_string());
    }

    /// Appends a hash (tag) column.
    pub fn add_hash_column(&mut self, tags: &crate::model::Tags) {
        self.add_column(&wire::encode_hash(tags));
    }

    /// Appends an EWKB-hex geometry column.
    pub fn add_geometry_column(&mut self, geom: &geo::Geometry<f64>, srid: i32) -> Result<()> {
        let hex = wire::encode_geometry_hex(geom, srid)?;
        self.add_column(&hex);
        Ok(())
    }

    /// Appends the SQL NULL marker as a column.
    pub fn add_null_column(&mut self) {
        self.add_column(wire::NULL);
    }

    fn add_tab_if_needed(&mut self) {
        let pending = self.current.as_mut().expect("add column called with no open row");
        let at_row_start = pending.buffer.is_empty() || pending.buffer.ends_with('\n');
        if !at_row_start {
            pending.buffer.push('\t');
        }
    }

    /// Terminates the current row with the COPY row delimiter, then
    /// flushes if the buffer has grown past the size threshold.
    pub fn finish_line(&mut self) {
        let pending = self.current.as_mut().expect("finish_line called with no open row");
        pending.buffer.push('\n');
        if pending.buffer.len() >= BUFFER_FLUSH_THRESHOLD {
            self.flush_current();
        }
    }

    /// Marks an object for deletion in the current table before any rows
    /// emitted after this call are inserted (spec §4.3).
    pub fn delete_id(&mut self, id: OsmId) {
        let pending = self.current.as_mut().expect("delete_id called with no open table");
        pending.deletes.push(id);
    }

    /// Runs raw SQL, finishing whatever copy buffer is open first so
    /// ordering is preserved.
    pub fn exec_sql(&mut self, sql: impl Into<String>) {
        self.flush_current();
        self.writer.send(Command::Sql(sql.into()));
    }

    /// Blocks until every command issued before this call has been
    /// applied by the writer.
    pub fn sync(&mut self) {
        self.flush_current();
        self.writer.sync();
    }

    fn flush_current(&mut self) {
        if let Some(p) = self.current.take() {
            self.writer.send(Command::Copy { target: p.target, deletes: p.deletes, buffer: p.buffer });
        }
    }
}

impl Drop for CopyManager {
    fn drop(&mut self) {
        self.flush_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::writer::CopyWriterHandle;
    use std::sync::mpsc;

    fn test_target() -> Arc<CopyTarget> {
        Arc::new(CopyTarget { name: "planet_osm_point".into(), columns: None, id_column: "osm_id".into() })
    }

    #[test]
    fn builds_tab_separated_row() {
        let (tx, rx) = mpsc::channel();
        let handle = CopyWriterHandle::for_test(tx);
        let mut mgr = CopyManager::new(handle);
        mgr.new_line(test_target());
        mgr.add_int_column(42);
        mgr.add_text_column("residential");
        mgr.finish_line();
        mgr.exec_sql("SELECT 1");

        match rx.recv().unwrap() {
            Command::Copy { buffer, .. } => assert_eq!(buffer, "42\tresidential\n"),
            other => panic!("expected a copy buffer, got {other:?}"),
        }
    }

    #[test]
    fn oversized_buffer_flushes_without_a_target_switch() {
        let (tx, rx) = mpsc::channel();
        let handle = CopyWriterHandle::for_test(tx);
        let mut mgr = CopyManager::new(handle);
        let target = test_target();

        mgr.new_line(target.clone());
        mgr.add_text_column(&"x".repeat(BUFFER_FLUSH_THRESHOLD));
        mgr.finish_line();

        match rx.recv().unwrap() {
            Command::Copy { target: t, buffer, .. } => {
                assert_eq!(t.name, "planet_osm_point");
                assert!(buffer.len() >= BUFFER_FLUSH_THRESHOLD);
            }
            other => panic!("expected the oversized buffer to flush, got {other:?}"),
        }

        // the manager still has no open row after the size-triggered flush.
        mgr.new_line(target);
        mgr.add_int_column(1);
        mgr.finish_line();
        mgr.sync();
    }

    #[test]
    fn switching_tables_flushes_the_previous_buffer() {
        let (tx, rx) = mpsc::channel();
        let handle = CopyWriterHandle::for_test(tx);
        let mut mgr = CopyManager::new(handle);
        let points = test_target();
        let lines = Arc::new(CopyTarget { name: "planet_osm_line".into(), columns: None, id_column: "osm_id".into() });

        mgr.new_line(points);
        mgr.add_int_column(1);
        mgr.finish_line();
        mgr.new_line(lines);

        match rx.recv().unwrap() {
            Command::Copy { target, .. } => assert_eq!(target.name, "planet_osm_point"),
            other => panic!("expected a copy buffer, got {other:?}"),
        }
    }
}
