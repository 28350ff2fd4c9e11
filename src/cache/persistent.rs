//! File-backed overflow node cache (spec §4.1 "Persistent layout", spec §6
//! header table).
//!
//! Grounded on `examples/original_source/node-persistent-cache.c`: the
//! fixed header (`format_version`, `id_size`, `max_initialised_id`) and the
//! block-aligned growth of the backing file are carried over unchanged so
//! an on-disk cache written by one run is byte-compatible with another.
//! The original additionally hand-rolls an LRU over `READ_NODE_CACHE_SIZE`
//! read blocks to avoid re-reading the same 4 KiB page repeatedly; here
//! that role is delegated to the OS page cache via `memmap2`, which gives
//! the same locality benefit without a second cache to keep coherent with
//! the file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{CoreError, Result};
use crate::model::{NodeLocation, OsmId};

use super::{decode_fixed, encode_fixed, ABSENT};

const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: u64 = 16; // u32 + u32 + u64, explicitly laid out (no padding left to chance)
const ENTRY_SIZE: u64 = 8; // (i32 lat, i32 lon)
const WRITE_NODE_BLOCK_SIZE: u64 = 1 << 20;

/// File-backed node cache used when a RAM strategy overflows (spec §4.1).
pub struct PersistentNodeCache {
    path: PathBuf,
    file: std::fs::File,
    mmap: MmapMut,
    scale: i32,
    max_initialised_id: u64,
}

impl PersistentNodeCache {
    pub fn open(path: &Path, append: bool, scale: i32) -> Result<Self> {
        let exists = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;

        if !exists || !append {
            file.set_len(HEADER_SIZE)
                .map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;
            write_header(&file, path, FORMAT_VERSION, std::mem::size_of::<i64>() as u32, 0)?;
        }

        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?
        };

        let format_version = u32::from_le_bytes(mmap[0..4].try_into().unwrap());
        let id_size = u32::from_le_bytes(mmap[4..8].try_into().unwrap());
        let max_initialised_id = u64::from_le_bytes(mmap[8..16].try_into().unwrap());

        if format_version != FORMAT_VERSION {
            return Err(CoreError::BadHeader {
                path: path.to_path_buf(),
                reason: format!("format_version {format_version} unsupported (expected {FORMAT_VERSION})"),
            });
        }
        if id_size as usize != std::mem::size_of::<i64>() {
            return Err(CoreError::BadHeader {
                path: path.to_path_buf(),
                reason: format!("id_size {id_size} does not match this build's OsmId width"),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            scale,
            max_initialised_id,
        })
    }

    fn entry_offset(id: OsmId) -> Result<u64> {
        if id < 0 {
            return Err(CoreError::Cache(format!("persistent node cache cannot address negative id {id}")));
        }
        Ok(HEADER_SIZE + (id as u64) * ENTRY_SIZE)
    }

    fn ensure_capacity(&mut self, end_offset: u64) -> Result<()> {
        let current_len = self.file.metadata().map_err(|source| CoreError::PersistentIo {
            path: self.path.clone(),
            source,
        })?.len();
        if end_offset <= current_len {
            return Ok(());
        }
        // Grow in whole write-blocks, matching the original's block-aligned
        // extension so the file never ends mid-block.
        let block_bytes = WRITE_NODE_BLOCK_SIZE * ENTRY_SIZE;
        let blocks_needed = (end_offset - HEADER_SIZE).div_ceil(block_bytes);
        let new_len = HEADER_SIZE + blocks_needed * block_bytes;

        drop(std::mem::replace(&mut self.mmap, MmapMut::map_anon(1).unwrap()));
        self.file
            .set_len(new_len)
            .map_err(|source| CoreError::PersistentIo { path: self.path.clone(), source })?;
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).map_err(|source| CoreError::PersistentIo { path: self.path.clone(), source })?
        };

        // `set_len` zero-fills the new region, but a zeroed (lat, lon) pair
        // decodes as the real coordinate (0, 0), not "absent". Stamp the
        // sentinel across every newly added slot so a never-written id
        // still reads back as `None`.
        let sentinel = ABSENT.to_le_bytes();
        let mut at = current_len as usize;
        while at + 8 <= self.mmap.len() {
            self.mmap[at..at + 4].copy_from_slice(&sentinel);
            self.mmap[at + 4..at + 8].copy_from_slice(&sentinel);
            at += 8;
        }
        Ok(())
    }

    fn sync_header(&mut self) -> Result<()> {
        self.mmap[0..4].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        self.mmap[4..8].copy_from_slice(&(std::mem::size_of::<i64>() as u32).to_le_bytes());
        self.mmap[8..16].copy_from_slice(&self.max_initialised_id.to_le_bytes());
        Ok(())
    }

    pub fn set(&mut self, id: OsmId, loc: NodeLocation) -> Result<()> {
        let offset = Self::entry_offset(id)?;
        self.ensure_capacity(offset + ENTRY_SIZE)?;

        let lat = encode_fixed(self.scale, loc.lat);
        let lon = encode_fixed(self.scale, loc.lon);
        let at = offset as usize;
        self.mmap[at..at + 4].copy_from_slice(&lat.to_le_bytes());
        self.mmap[at + 4..at + 8].copy_from_slice(&lon.to_le_bytes());

        let slot = (id as u64) + 1;
        if slot > self.max_initialised_id {
            self.max_initialised_id = slot;
            self.sync_header()?;
        }
        Ok(())
    }

    pub fn get(&self, id: OsmId) -> Option<NodeLocation> {
        let offset = Self::entry_offset(id).ok()?;
        let at = offset as usize;
        if at + 8 > self.mmap.len() {
            return None;
        }
        let lat = i32::from_le_bytes(self.mmap[at..at + 4].try_into().unwrap());
        let lon = i32::from_le_bytes(self.mmap[at + 4..at + 8].try_into().unwrap());
        if lat == ABSENT && lon == ABSENT {
            return None;
        }
        Some(NodeLocation::new(decode_fixed(self.scale, lon), decode_fixed(self.scale, lat)))
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|source| CoreError::PersistentIo { path: self.path.clone(), source })
    }
}

fn write_header(file: &std::fs::File, path: &Path, format_version: u32, id_size: u32, max_initialised_id: u64) -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = file.try_clone().map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;
    file.seek(SeekFrom::Start(0)).map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;
    file.write_all(&format_version.to_le_bytes())
        .map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;
    file.write_all(&id_size.to_le_bytes())
        .map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;
    file.write_all(&max_initialised_id.to_le_bytes())
        .map_err(|source| CoreError::PersistentIo { path: path.to_path_buf(), source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn round_trips_through_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.cache");

        {
            let mut cache = PersistentNodeCache::open(&path, false, 10_000_000).unwrap();
            cache.set(1, NodeLocation::new(1.5, 2.5)).unwrap();
            cache.set(2_000_000, NodeLocation::new(-3.0, 4.0)).unwrap();
            cache.flush().unwrap();
        }

        let cache = PersistentNodeCache::open(&path, true, 10_000_000).unwrap();
        let a = cache.get(1).unwrap();
        assert!((a.lon - 1.5).abs() < 1e-6);
        let b = cache.get(2_000_000).unwrap();
        assert!((b.lon + 3.0).abs() < 1e-6);
        assert!(cache.get(3).is_none());
    }

    #[test]
    fn rejects_mismatched_header_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.cache");
        {
            let _cache = PersistentNodeCache::open(&path, false, 10_000_000).unwrap();
        }
        // Corrupt the format_version field directly.
        {
            use std::io::Write;
            let mut f = OpenOptions::new().write(true).open(&path).unwrap();
            f.write_all(&99u32.to_le_bytes()).unwrap();
        }
        let result = PersistentNodeCache::open(&path, true, 10_000_000);
        assert!(matches!(result, Err(CoreError::BadHeader { .. })));
    }

    #[test]
    fn negative_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.cache");
        let mut cache = PersistentNodeCache::open(&path, false, 10_000_000).unwrap();
        assert!(cache.set(-1, NodeLocation::new(0.0, 0.0)).is_err());
    }
}
