//! On-disk placement of chunks.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── Hashable/
//! │   ├── Normal/
//! │   │   └── 3/
//! │   │       └── e/
//! │   │           └── f/
//! │   │               └── a0c4...93ef   # full hex name; last 3 chars pick the shard
//! │   ├── Cache/
//! │   ├── Outgoing/
//! │   └── TempCache/
//! └── NonHashable/
//!     └── (same four lifecycle directories)
//! ```
//!
//! A chunk's path depends only on its type and digest, so the catalogue can
//! be rebuilt at any time by rescanning these eight trees.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{ChunkName, ChunkType};

/// Number of single-character shard directories between a type directory and the chunk file.
pub const SHARD_DEPTH: usize = 3;

/// Fixed table from each of the 8 chunk types to its base directory.
#[derive(Debug, Clone)]
pub struct PathMap {
    root: PathBuf,
    dirs: [PathBuf; 8],
}

impl PathMap {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let dirs = ChunkType::ALL.map(|ty| root.join(ty.hashability.leaf()).join(ty.lifecycle.leaf()));
        Self { root, dirs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base directory for chunks of type `ty`.
    #[inline]
    pub fn resolve_directory(&self, ty: ChunkType) -> &Path {
        &self.dirs[ty.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkType, &Path)> + '_ {
        ChunkType::ALL
            .into_iter()
            .map(move |ty| (ty, self.resolve_directory(ty)))
    }
}

/// Directory sharding scheme: type directory + 3 hex-character levels + hex filename.
#[derive(Debug, Clone)]
pub struct ShardLayout {
    paths: PathMap,
    key_size: usize,
}

impl ShardLayout {
    pub fn new<P: AsRef<Path>>(root: P, key_size: usize) -> Self {
        Self {
            paths: PathMap::new(root),
            key_size,
        }
    }

    pub fn path_map(&self) -> &PathMap {
        &self.paths
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Shard directory for a hex name: `<type dir>/<hex[n-3]>/<hex[n-2]>/<hex[n-1]>`.
    pub fn shard_dir(&self, hex: &str, ty: ChunkType) -> PathBuf {
        let mut dir = self.paths.resolve_directory(ty).to_path_buf();
        let start = hex.len().saturating_sub(SHARD_DEPTH);
        for i in start..hex.len() {
            dir.push(&hex[i..i + 1]);
        }
        dir
    }

    /// Full path of a chunk file. Pure; touches no filesystem state.
    pub fn chunk_path(&self, name: &ChunkName, ty: ChunkType) -> PathBuf {
        let hex = name.to_hex();
        self.shard_dir(&hex, ty).join(hex)
    }

    /// Resolve a chunk path, optionally creating its shard directories.
    ///
    /// Returns `None` for an empty or wrongly-sized name, when the shard
    /// directory is missing and `create_if_missing` is false, or when
    /// creating it fails.
    pub fn resolve_path(
        &self,
        name: &[u8],
        ty: ChunkType,
        create_if_missing: bool,
    ) -> Option<PathBuf> {
        if name.is_empty() || name.len() != self.key_size {
            return None;
        }
        let hex = hex::encode(name);
        let dir = self.shard_dir(&hex, ty);
        if !dir.is_dir() {
            if !create_if_missing {
                return None;
            }
            fs::create_dir_all(&dir).ok()?;
        }
        Some(dir.join(hex))
    }

    /// Like `resolve_path(.., true)` but reports the I/O failure.
    pub(crate) fn ensure_chunk_path(&self, name: &ChunkName, ty: ChunkType) -> io::Result<PathBuf> {
        let hex = name.to_hex();
        let dir = self.shard_dir(&hex, ty);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(hex))
    }

    /// Interpret a file name found while scanning. Only lowercase hex names of
    /// exactly the key size are chunks; anything else is ignored.
    pub fn parse_file_name(&self, file_name: &str) -> Option<ChunkName> {
        if file_name.len() != self.key_size * 2
            || !file_name
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        ChunkName::from_hex(file_name)
    }
}
