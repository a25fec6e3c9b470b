//! Helpers for tests that need a real store on disk.
//!
//! # Usage
//!
//! ```ignore
//! use cvault_store::testing::{make_chunks, TestStore};
//!
//! let env = TestStore::new()?;
//! let chunks = make_chunks(env.store.hasher(), 10, 256);
//! for (name, content) in &chunks {
//!     env.store.store(name.as_bytes(), content)?;
//! }
//! ```

use std::path::{Path, PathBuf};

use rand::RngCore;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::{
    ChunkHasher, ChunkName, ChunkStore, ChunkType, Result, StoreOptions, VaultChunkStore,
};

/// An initialised store in a private temporary directory.
pub struct TestStore {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Store root, `<temp>/store`
    pub root: PathBuf,
    pub store: ChunkStore,
}

impl TestStore {
    pub fn new() -> Result<Self> {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("store");
        let store = ChunkStore::new(&root, options);
        store.init()?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
            store,
        })
    }

    /// A second, uninitialised store over the same root, as a restarted
    /// process would see it.
    pub fn reopen(&self) -> ChunkStore {
        ChunkStore::new(&self.root, self.store.options().clone())
    }
}

/// An initialised vault in a private temporary directory.
pub struct TestVault {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub vault: VaultChunkStore,
}

impl TestVault {
    pub fn new(available_space: u64) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("vault");
        let vault = VaultChunkStore::new(&root, StoreOptions::default(), available_space);
        vault.init()?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
            vault,
        })
    }
}

/// `count` random chunks of `size` bytes, each named by its digest.
pub fn make_chunks(hasher: &dyn ChunkHasher, count: usize, size: usize) -> Vec<(ChunkName, Vec<u8>)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut content = vec![0u8; size];
            rng.fill_bytes(&mut content);
            (ChunkName::from(hasher.digest(&content)), content)
        })
        .collect()
}

/// Search `dir` recursively for a file called `file_name`.
pub fn find_file(dir: &Path, file_name: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.into_path())
}

/// True if the chunk file sits exactly where the sharding scheme puts it:
/// `<root>/<Hashability>/<Lifecycle>/<c>/<c>/<c>/<hex>`.
pub fn check_file_path(root: &Path, name: &ChunkName, ty: ChunkType) -> bool {
    let hex = name.to_hex();
    let n = hex.len();
    if n < 3 {
        return false;
    }
    let expected = root
        .join(ty.hashability.leaf())
        .join(ty.lifecycle.leaf())
        .join(&hex[n - 3..n - 2])
        .join(&hex[n - 2..n - 1])
        .join(&hex[n - 1..])
        .join(&hex);
    expected.is_file()
}
