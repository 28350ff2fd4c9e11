//! The COPY pipeline (spec §4.3, component C3): turn finished rows into
//! PostgreSQL COPY traffic on a dedicated writer thread.
//!
//! Grounded on `examples/original_source/db-copy.cpp`/`db-copy.hpp`'s
//! `db_copy_thread_t`/`db_copy_mgr_t` split between a background writer
//! and a buffer-building manager used by the producer.

pub mod manager;
pub mod wire;
pub mod writer;

pub use manager::CopyManager;
pub use writer::{Command, CopyTarget, CopyWriter, CopyWriterHandle};
