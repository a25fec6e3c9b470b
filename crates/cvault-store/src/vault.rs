//! Vault extension: space accounting, cache admission and eviction, random
//! sampling for integrity challenges, and full-store hash audits.

use std::fs;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::catalogue::ChunkInfo;
use crate::scan::{self, ScannedChunk};
use crate::{
    ChunkName, ChunkStore, ChunkType, Hashability, Lifecycle, Result, StoreError, StoreOptions,
};

/// Summary of a successful [`VaultChunkStore::hash_check_all_chunks`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashCheckReport {
    /// Files hashed.
    pub checked: usize,
    /// Files found on disk that the catalogue did not know about.
    pub adopted: usize,
    pub bytes_checked: u64,
}

/// A [`ChunkStore`] with an available-space budget shared between permanent
/// chunks and the network cache.
#[derive(Debug)]
pub struct VaultChunkStore {
    store: ChunkStore,
    available_space: AtomicU64,
    admission: Mutex<()>,
}

impl Deref for VaultChunkStore {
    type Target = ChunkStore;

    fn deref(&self) -> &ChunkStore {
        &self.store
    }
}

impl VaultChunkStore {
    pub fn new<P: AsRef<Path>>(root: P, options: StoreOptions, available_space: u64) -> Self {
        Self::from_store(ChunkStore::new(root, options), available_space)
    }

    pub fn from_store(store: ChunkStore, available_space: u64) -> Self {
        Self {
            store,
            available_space: AtomicU64::new(available_space),
            admission: Mutex::new(()),
        }
    }

    pub fn available_space(&self) -> u64 {
        self.available_space.load(Ordering::Relaxed)
    }

    pub fn set_available_space(&self, bytes: u64) {
        self.available_space.store(bytes, Ordering::Relaxed);
    }

    /// Bytes held by chunks outside the Cache lifecycle.
    pub fn used_space(&self) -> u64 {
        let catalogue = self.store.catalogue();
        catalogue.total_bytes() - catalogue.bytes_in_lifecycle(Lifecycle::Cache)
    }

    pub fn space_used_by_cache(&self) -> u64 {
        self.store.catalogue().bytes_in_lifecycle(Lifecycle::Cache)
    }

    /// `available - used - cache`, floored at zero.
    pub fn free_space(&self) -> u64 {
        let used = self.store.catalogue().total_bytes();
        self.available_space().saturating_sub(used)
    }

    /// Admit a chunk into the cache if it fits in the free space.
    ///
    /// Cached chunks are always filed as Hashable. A chunk that is already
    /// stored (under any type) is left alone.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name), len = content.len()))]
    pub fn cache_chunk(&self, name: &[u8], content: &[u8]) -> Result<()> {
        self.store.check_name(name)?;
        let _admit = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        if self.store.has(name) {
            return Ok(());
        }

        let needed = content.len() as u64;
        let free = self.free_space();
        if needed > free {
            return Err(StoreError::NoSpaceForCaching { needed, free });
        }

        let name = ChunkName::new(name);
        self.store.write_new(&name, ChunkType::HASHABLE_CACHE, content)?;
        Ok(())
    }

    /// Evict Cache chunks, least recently checked first, until at least
    /// `bytes` have been released or the cache is empty. Returns the bytes
    /// actually released.
    #[instrument(skip(self), level = "debug")]
    pub fn free_cache_space(&self, bytes: u64) -> Result<u64> {
        self.store.ensure_initialised()?;
        let mut catalogue = self.store.catalogue();
        if catalogue.bytes_in_lifecycle(Lifecycle::Cache) == 0 {
            return Err(StoreError::NoCacheSpaceToClear);
        }

        let mut victims: Vec<ChunkInfo> = Vec::new();
        let mut planned = 0u64;
        for info in catalogue.iter_by_last_checked() {
            if planned >= bytes {
                break;
            }
            if info.chunk_type.is_cache() {
                planned += info.size;
                victims.push(info.clone());
            }
        }

        let mut cleared = 0u64;
        for info in victims {
            let path = self.store.layout().chunk_path(&info.name, info.chunk_type);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(chunk = %info.name, error = %e, "failed to evict cache chunk");
                    continue;
                }
            }
            catalogue.remove(info.name.as_bytes());
            cleared += info.size;
            debug!(chunk = %info.name, size = info.size, "evicted cache chunk");
        }

        info!(requested = bytes, cleared, "freed cache space");
        Ok(cleared)
    }

    /// Pick a Hashable Normal chunk uniformly at random and load it.
    pub fn load_random_chunk(&self) -> Result<(ChunkName, Vec<u8>)> {
        self.store.ensure_initialised()?;
        let name = {
            let catalogue = self.store.catalogue();
            if catalogue.is_empty() {
                return Err(StoreError::ChunkStore("store is empty".to_string()));
            }
            let count = catalogue.count_by_type(ChunkType::HASHABLE_NORMAL);
            if count == 0 {
                return Err(StoreError::ChunkStore(
                    "no hashable normal chunks to sample".to_string(),
                ));
            }
            let index = rand::thread_rng().gen_range(0..count);
            catalogue
                .nth_by_type(ChunkType::HASHABLE_NORMAL, index)
                .map(|info| info.name.clone())
                .ok_or_else(|| StoreError::ChunkStore("type index out of sync".to_string()))?
        };
        let content = self.store.load(name.as_bytes())?;
        Ok((name, content))
    }

    /// Hash every file under the Hashable directories.
    ///
    /// Files the catalogue does not know are adopted; last-checked advances
    /// for everything hashed. With `delete_failures`, mismatching chunks are
    /// removed after the scan. Any mismatch yields `HashCheckFailure`.
    #[instrument(skip(self))]
    pub fn hash_check_all_chunks(&self, delete_failures: bool) -> Result<HashCheckReport> {
        self.store.ensure_initialised()?;

        let files: Vec<ScannedChunk> = ChunkType::ALL
            .into_iter()
            .filter(|ty| ty.hashability == Hashability::Hashable)
            .flat_map(|ty| scan::scan_type_dir(self.store.layout(), ty).chunks)
            .collect();

        let pool = scan::build_pool(self.store.options().check_threads)?;
        let results = scan::verify_all(&pool, self.store.hasher(), &files);

        let mut report = HashCheckReport::default();
        let mut failures: Vec<&ScannedChunk> = Vec::new();
        {
            let mut catalogue = self.store.catalogue();
            for (file, result) in files.iter().zip(results) {
                let matches = match result {
                    Ok(m) => m,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        warn!(path = %file.path.display(), error = %e, "unreadable chunk");
                        false
                    }
                };
                report.checked += 1;
                report.bytes_checked += file.size;

                let tick = catalogue.tick();
                match catalogue.find(file.name.as_bytes()).map(|i| i.chunk_type) {
                    Some(ty) if ty == file.chunk_type => {
                        catalogue.update_last_checked(file.name.as_bytes(), tick);
                    }
                    Some(_) => {
                        debug!(chunk = %file.name, "duplicate file under another type, skipping");
                        continue;
                    }
                    None => {
                        catalogue.insert(ChunkInfo::new(
                            file.name.clone(),
                            file.chunk_type,
                            file.size,
                            tick,
                        ));
                        report.adopted += 1;
                    }
                }
                if !matches {
                    warn!(chunk = %file.name, "hash check failed");
                    failures.push(file);
                }
            }
        }

        if failures.is_empty() {
            info!(checked = report.checked, adopted = report.adopted, "hash check passed");
            return Ok(report);
        }

        if delete_failures {
            for file in &failures {
                if let Err(e) = self.store.delete_chunk(file.name.as_bytes()) {
                    warn!(chunk = %file.name, error = %e, "failed to delete corrupt chunk");
                }
            }
            info!(deleted = failures.len(), "deleted chunks that failed hash check");
        }

        Err(StoreError::HashCheckFailure {
            names: failures.into_iter().map(|f| f.name.clone()).collect(),
        })
    }

    /// Overwrite an existing chunk in place. Its type and last-checked time
    /// are unchanged.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name), len = content.len()))]
    pub fn update_chunk(&self, name: &[u8], content: &[u8]) -> Result<()> {
        self.store.check_name(name)?;
        self.store.overwrite(&ChunkName::new(name), content)
    }

    pub fn into_inner(self) -> ChunkStore {
        self.store
    }
}
