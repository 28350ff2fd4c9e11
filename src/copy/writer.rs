//! The background COPY-writer thread (spec §4.3, §5): exactly one
//! long-running consumer per output connection, draining a bounded
//! FIFO of commands built by [`super::manager::CopyManager`].
//!
//! Grounded on `examples/original_source/db-copy.cpp`'s
//! `db_copy_thread_t::worker_thread`: a mutex/condvar-guarded queue, a
//! `synchronous_commit=off` connection wrapped in one transaction, and a
//! fatal process exit on a database error rather than limping on with a
//! half-applied import. The state machine is
//! `Idle -> InCopy{target} -> Committing -> Closed` (spec §5); here
//! `InCopy` is scoped to a single buffer rather than held open across
//! buffers, since the synchronous `postgres` crate's `CopyInWriter`
//! borrows the connection for its lifetime and cannot be parked between
//! queue pops.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use postgres::{Client, NoTls};

use crate::error::{CoreError, Result};
use crate::model::OsmId;

/// Identifies one COPY target table (spec §4.3): its name, the
/// column list (`None` means "every column, in table order"), and the
/// id column used for `delete_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTarget {
    pub name: String,
    pub columns: Option<String>,
    pub id_column: String,
}

impl CopyTarget {
    fn copy_statement(&self) -> String {
        match &self.columns {
            Some(cols) => format!("COPY {} ({}) FROM STDIN", self.name, cols),
            None => format!("COPY {} FROM STDIN", self.name),
        }
    }

    /// Builds the `DELETE FROM <table> WHERE <id> IN (...)` statement.
    ///
    /// `examples/original_source/db-copy.cpp` concatenates
    /// `"DELETE FROM "` and `"WHERE "` directly onto the table name with
    /// no separating space (`sql += buffer->target->name; sql += "WHERE
    /// ";`), producing `DELETE FROM planet_osm_pointWHERE osm_id IN
    /// (...)`. Fixed here with an explicit space.
    fn delete_statement(&self, ids: &[OsmId]) -> String {
        let mut sql = String::with_capacity(self.name.len() + ids.len() * 15 + 40);
        sql.push_str("DELETE FROM ");
        sql.push_str(&self.name);
        sql.push_str(" WHERE ");
        sql.push_str(&self.id_column);
        sql.push_str(" IN (");
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&id.to_string());
        }
        sql.push(')');
        sql
    }
}

pub enum Command {
    Copy { target: Arc<CopyTarget>, deletes: Vec<OsmId>, buffer: String },
    Sql(String),
    Sync(Sender<()>),
    Finish,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Copy { target, deletes, .. } => {
                f.debug_struct("Copy").field("target", &target.name).field("deletes", &deletes.len()).finish()
            }
            Command::Sql(s) => f.debug_tuple("Sql").field(s).finish(),
            Command::Sync(_) => f.debug_tuple("Sync").finish(),
            Command::Finish => write!(f, "Finish"),
        }
    }
}

struct Queue {
    items: Mutex<VecDeque<Command>>,
    cond: Condvar,
}

/// The producer-side handle: enqueues commands, never touches the
/// connection itself.
#[derive(Clone)]
pub struct CopyWriterHandle {
    queue: Arc<Queue>,
}

impl CopyWriterHandle {
    pub fn send(&self, cmd: Command) {
        let mut items = self.queue.items.lock().unwrap();
        items.push_back(cmd);
        self.queue.cond.notify_one();
    }

    /// Blocks until the writer has applied every command issued before
    /// this call.
    pub fn sync(&self) {
        let (tx, rx) = std::sync::mpsc::channel();
        self.send(Command::Sync(tx));
        let _ = rx.recv();
    }

    /// Routes every command straight to `probe` instead of a real writer
    /// thread, for tests that only need to inspect what would have been
    /// sent without a database connection.
    pub fn for_test(probe: std::sync::mpsc::Sender<Command>) -> Self {
        let queue = Arc::new(Queue { items: Mutex::new(VecDeque::new()), cond: Condvar::new() });
        let handle = CopyWriterHandle { queue: queue.clone() };
        std::thread::spawn(move || loop {
            let cmd = {
                let mut items = queue.items.lock().unwrap();
                loop {
                    if let Some(cmd) = items.pop_front() {
                        break cmd;
                    }
                    items = queue.cond.wait(items).unwrap();
                }
            };
            let is_finish = matches!(cmd, Command::Finish);
            if probe.send(cmd).is_err() || is_finish {
                break;
            }
        });
        handle
    }
}

/// Owns the worker thread's join handle and the shared queue.
pub struct CopyWriter {
    queue: Arc<Queue>,
    thread: Option<JoinHandle<()>>,
}

impl CopyWriter {
    /// Spawns the background writer against `conninfo`, matching
    /// `db_copy_thread_t`'s constructor: the connection itself is opened
    /// on the worker thread, not here.
    pub fn spawn(conninfo: String) -> Self {
        let queue = Arc::new(Queue { items: Mutex::new(VecDeque::new()), cond: Condvar::new() });
        let worker_queue = queue.clone();
        let thread = std::thread::spawn(move || {
            if let Err(e) = worker_thread(conninfo, worker_queue) {
                // A failed writer thread cannot be allowed to silently
                // drop rows: the original exits the whole process on a
                // database error rather than continuing with a partial
                // import.
                eprintln!("DB writer thread failed: {e}");
                std::process::exit(2);
            }
        });
        CopyWriter { queue, thread: Some(thread) }
    }

    pub fn handle(&self) -> CopyWriterHandle {
        CopyWriterHandle { queue: self.queue.clone() }
    }

    /// Enqueues the `Finish` sentinel and blocks until the writer has
    /// committed and exited.
    pub fn finish(mut self) {
        self.handle().send(Command::Finish);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn worker_thread(conninfo: String, queue: Arc<Queue>) -> Result<()> {
    let mut client = Client::connect(&conninfo, NoTls).map_err(CoreError::from)?;
    client.batch_execute("SET synchronous_commit TO off; BEGIN;").map_err(CoreError::from)?;

    loop {
        let cmd = {
            let mut items = queue.items.lock().unwrap();
            loop {
                if let Some(cmd) = items.pop_front() {
                    break cmd;
                }
                items = queue.cond.wait(items).unwrap();
            }
        };

        match cmd {
            Command::Copy { target, deletes, buffer } => {
                if !deletes.is_empty() {
                    client.batch_execute(&target.delete_statement(&deletes)).map_err(CoreError::from)?;
                }
                if !buffer.is_empty() {
                    let mut writer = client.copy_in(&target.copy_statement()).map_err(CoreError::from)?;
                    std::io::Write::write_all(&mut writer, buffer.as_bytes())?;
                    writer.finish().map_err(CoreError::from)?;
                }
            }
            Command::Sql(sql) => {
                client.batch_execute(&sql).map_err(CoreError::from)?;
            }
            Command::Sync(ack) => {
                let _ = ack.send(());
            }
            Command::Finish => {
                client.batch_execute("COMMIT").map_err(CoreError::from)?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CopyTarget {
        CopyTarget { name: "planet_osm_point".into(), columns: None, id_column: "osm_id".into() }
    }

    #[test]
    fn delete_statements_include_the_space_before_where() {
        let sql = target().delete_statement(&[1, 2, 3]);
        assert!(sql.contains(" WHERE "));
        assert_eq!(sql, "DELETE FROM planet_osm_point WHERE osm_id IN (1,2,3)");
    }

    #[test]
    fn copy_statement_without_columns() {
        assert_eq!(target().copy_statement(), "COPY planet_osm_point FROM STDIN");
    }

    #[test]
    fn copy_statement_with_columns() {
        let t = CopyTarget { columns: Some("osm_id,tags,way".into()), ..target() };
        assert_eq!(t.copy_statement(), "COPY planet_osm_point (osm_id,tags,way) FROM STDIN");
    }
}
