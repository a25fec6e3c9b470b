//! Filesystem scanning and parallel hash verification.
//!
//! # Thread Pool Configuration
//!
//! Hash checks can touch every byte in the store. To leave room for the rest
//! of the host, the pool defaults to half the CPU cores, capped at
//! `MAX_CHECK_THREADS`.

use std::io;
use std::path::PathBuf;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::warn;
use walkdir::WalkDir;

use crate::layout::{ShardLayout, SHARD_DEPTH};
use crate::{ChunkHasher, ChunkName, ChunkType, Result, StoreError};

/// Maximum threads for parallel hash checks
pub const MAX_CHECK_THREADS: usize = 4;

/// Default thread count: min(cpu_cores / 2, MAX_CHECK_THREADS), at least 1
pub fn default_thread_count() -> usize {
    (num_cpus::get() / 2).clamp(1, MAX_CHECK_THREADS)
}

pub(crate) fn build_pool(threads: Option<usize>) -> Result<ThreadPool> {
    let num_threads = threads.unwrap_or_else(default_thread_count).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("cvault-check-{}", i))
        .build()
        .map_err(|e| StoreError::ChunkStore(format!("failed to create check pool: {}", e)))
}

/// A chunk file found on disk.
#[derive(Debug, Clone)]
pub(crate) struct ScannedChunk {
    pub name: ChunkName,
    pub chunk_type: ChunkType,
    pub path: PathBuf,
    pub size: u64,
}

/// Result of walking one type directory.
#[derive(Debug, Default)]
pub(crate) struct TypeDirScan {
    pub chunks: Vec<ScannedChunk>,
    /// Leftovers of interrupted atomic writes.
    pub temp_files: Vec<PathBuf>,
}

/// Walk one type directory and collect every well-formed chunk file in it.
///
/// Temp files are reported separately. Names that are not lowercase hex of
/// the key size and files sitting in the wrong shard are ignored. A missing
/// type directory yields an empty scan.
pub(crate) fn scan_type_dir(layout: &ShardLayout, ty: ChunkType) -> TypeDirScan {
    let dir = layout.path_map().resolve_directory(ty);
    let mut scan = TypeDirScan::default();
    if !dir.is_dir() {
        return scan;
    }

    let walker = WalkDir::new(dir)
        .min_depth(SHARD_DEPTH + 1)
        .max_depth(SHARD_DEPTH + 1);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            scan.temp_files.push(path.to_path_buf());
            continue;
        }
        let Some(name) = entry
            .file_name()
            .to_str()
            .and_then(|f| layout.parse_file_name(f))
        else {
            continue;
        };
        if layout.chunk_path(&name, ty) != path {
            warn!(path = %path.display(), "ignoring chunk file outside its shard");
            continue;
        }
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping chunk without metadata");
                continue;
            }
        };
        scan.chunks.push(ScannedChunk {
            name,
            chunk_type: ty,
            path: path.to_path_buf(),
            size,
        });
    }
    scan
}

/// Hash every file on `pool`. `Ok(true)` means the content matches the name.
pub(crate) fn verify_all(
    pool: &ThreadPool,
    hasher: &dyn ChunkHasher,
    chunks: &[ScannedChunk],
) -> Vec<io::Result<bool>> {
    pool.install(|| {
        chunks
            .par_iter()
            .map(|chunk| {
                hasher
                    .digest_file(&chunk.path)
                    .map(|digest| digest == chunk.name.as_bytes())
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Blake3Hasher;
    use std::fs;
    use tempfile::TempDir;

    fn place(layout: &ShardLayout, content: &[u8], ty: ChunkType) -> ChunkName {
        let name = ChunkName::from(Blake3Hasher.digest(content));
        let path = layout.ensure_chunk_path(&name, ty).unwrap();
        fs::write(path, content).unwrap();
        name
    }

    #[test]
    fn test_default_thread_count_bounds() {
        let n = default_thread_count();
        assert!((1..=MAX_CHECK_THREADS).contains(&n));
    }

    #[test]
    fn test_scan_finds_only_chunk_files() {
        let temp = TempDir::new().unwrap();
        let layout = ShardLayout::new(temp.path(), Blake3Hasher.digest_len());
        let ty = ChunkType::HASHABLE_NORMAL;
        let a = place(&layout, b"alpha", ty);
        let b = place(&layout, b"beta", ty);

        // Noise that must be skipped
        let shard = layout.chunk_path(&a, ty).parent().unwrap().to_path_buf();
        let temp_file = shard.join(format!("{}.1.tmp", a.to_hex()));
        fs::write(&temp_file, b"partial").unwrap();
        fs::write(shard.join("README"), b"not a chunk").unwrap();
        let misplaced = place(&layout, b"gamma", ty);
        let hex = misplaced.to_hex();
        let correct = layout.chunk_path(&misplaced, ty);
        let wrong_leaf = if hex.ends_with('0') { "1" } else { "0" };
        let wrong_shard = correct.parent().unwrap().with_file_name(wrong_leaf);
        fs::create_dir_all(&wrong_shard).unwrap();
        fs::rename(&correct, wrong_shard.join(&hex)).unwrap();

        let scan = scan_type_dir(&layout, ty);
        assert_eq!(scan.temp_files, vec![temp_file]);
        let mut names: Vec<_> = scan.chunks.into_iter().map(|c| c.name).collect();
        names.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(names, expected);

        let empty = scan_type_dir(&layout, ChunkType::HASHABLE_CACHE);
        assert!(empty.chunks.is_empty());
        assert!(empty.temp_files.is_empty());
    }

    #[test]
    fn test_verify_all_detects_tampering() {
        let temp = TempDir::new().unwrap();
        let layout = ShardLayout::new(temp.path(), Blake3Hasher.digest_len());
        let ty = ChunkType::HASHABLE_NORMAL;
        let good = place(&layout, b"good", ty);
        let bad = place(&layout, b"bad", ty);
        fs::write(layout.chunk_path(&bad, ty), b"tampered").unwrap();

        let chunks = scan_type_dir(&layout, ty).chunks;
        let pool = build_pool(Some(2)).unwrap();
        let results = verify_all(&pool, &Blake3Hasher, &chunks);
        for (chunk, result) in chunks.iter().zip(results) {
            let ok = result.unwrap();
            if chunk.name == good {
                assert!(ok);
            } else {
                assert_eq!(chunk.name, bad);
                assert!(!ok);
            }
        }
    }
}
