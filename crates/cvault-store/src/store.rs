//! The chunk store: files on disk plus the catalogue that indexes them.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::catalogue::{ChunkCatalogue, ChunkInfo};
use crate::layout::ShardLayout;
use crate::scan;
use crate::{
    ChunkHasher, ChunkName, ChunkType, DigestAlgorithm, Hashability, Lifecycle, Result,
    StoreError,
};

/// Longest root path (in characters) the store accepts.
pub const MAX_ROOT_PATH_LEN: usize = 256;

/// Behavioural switches for a [`ChunkStore`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Digest used for names and hash checks.
    pub digest: DigestAlgorithm,
    /// Hash new content on store and file it as NonHashable when the digest
    /// does not match its name.
    pub detect_hashability: bool,
    /// Hash-check hashable chunks found by `init` and delete failures.
    pub verify_on_init: bool,
    /// Thread count for bulk hash checks. `None` = `scan::default_thread_count()`.
    pub check_threads: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialised,
    Initialising,
    Initialised,
}

impl StoreState {
    const fn as_u8(self) -> u8 {
        match self {
            StoreState::Uninitialised => 0,
            StoreState::Initialising => 1,
            StoreState::Initialised => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => StoreState::Initialising,
            2 => StoreState::Initialised,
            _ => StoreState::Uninitialised,
        }
    }
}

/// Outcome of [`ChunkStore::add_chunk_to_outgoing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingStatus {
    Added,
    /// The chunk was already stored (under any type); nothing was written.
    AlreadyPresent,
}

/// Content-addressed chunk store with an in-memory catalogue.
///
/// Thread-safe: share it behind an `Arc`. All data operations fail with
/// [`StoreError::Uninitialised`] until [`ChunkStore::init`] has completed.
#[derive(Debug)]
pub struct ChunkStore {
    layout: ShardLayout,
    hasher: Arc<dyn ChunkHasher>,
    options: StoreOptions,
    state: AtomicU8,
    init_lock: Mutex<()>,
    catalogue: Mutex<ChunkCatalogue>,
}

impl ChunkStore {
    /// Create an uninitialised store rooted at `root`. Nothing touches the
    /// filesystem until `init`.
    pub fn new<P: AsRef<Path>>(root: P, options: StoreOptions) -> Self {
        let hasher = options.digest.hasher();
        Self::with_hasher(root, hasher, options)
    }

    /// Like `new`, with a caller-supplied digest function. `options.digest`
    /// is ignored.
    pub fn with_hasher<P: AsRef<Path>>(
        root: P,
        hasher: Arc<dyn ChunkHasher>,
        options: StoreOptions,
    ) -> Self {
        Self {
            layout: ShardLayout::new(root, hasher.digest_len()),
            hasher,
            options,
            state: AtomicU8::new(StoreState::Uninitialised.as_u8()),
            init_lock: Mutex::new(()),
            catalogue: Mutex::new(ChunkCatalogue::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.layout.path_map().root()
    }

    /// Required name length in bytes.
    pub fn key_size(&self) -> usize {
        self.layout.key_size()
    }

    pub fn hasher(&self) -> &dyn ChunkHasher {
        self.hasher.as_ref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_initialised(&self) -> bool {
        self.state() == StoreState::Initialised
    }

    fn set_state(&self, state: StoreState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Create the directory tree and rebuild the catalogue from disk.
    ///
    /// Idempotent. Concurrent callers block until the first finishes. On
    /// failure the store is left uninitialised.
    #[instrument(skip(self), fields(root = %self.root().display()))]
    pub fn init(&self) -> Result<()> {
        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_initialised() {
            return Ok(());
        }

        let len = self.root().to_string_lossy().chars().count();
        if len > MAX_ROOT_PATH_LEN {
            return Err(StoreError::RootPathTooLong {
                len,
                max: MAX_ROOT_PATH_LEN,
            });
        }

        self.set_state(StoreState::Initialising);
        match self.rebuild_catalogue() {
            Ok(count) => {
                self.set_state(StoreState::Initialised);
                info!(chunks = count, "chunk store initialised");
                Ok(())
            }
            Err(e) => {
                self.set_state(StoreState::Uninitialised);
                Err(e)
            }
        }
    }

    /// Run `init` on a background thread. Poll `is_initialised` or join the
    /// handle for the result.
    pub fn spawn_init(self: Arc<Self>) -> io::Result<thread::JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("cvault-init".to_string())
            .spawn(move || self.init())
    }

    fn rebuild_catalogue(&self) -> Result<usize> {
        for (_, dir) in self.layout.path_map().iter() {
            fs::create_dir_all(dir)?;
        }

        let pool = if self.options.verify_on_init {
            Some(scan::build_pool(self.options.check_threads)?)
        } else {
            None
        };

        let mut catalogue = self.catalogue();
        catalogue.clear();
        for ty in ChunkType::ALL {
            let scanned = scan::scan_type_dir(&self.layout, ty);
            for temp in &scanned.temp_files {
                debug!(path = %temp.display(), "removing leftover temp file");
                if let Err(e) = fs::remove_file(temp) {
                    warn!(path = %temp.display(), error = %e, "failed to remove temp file");
                }
            }
            let mut found = scanned.chunks;
            if let (Some(pool), true) = (&pool, ty.is_hashable()) {
                let results = scan::verify_all(pool, self.hasher(), &found);
                let mut kept = Vec::with_capacity(found.len());
                for (chunk, result) in found.into_iter().zip(results) {
                    match result {
                        Ok(true) => kept.push(chunk),
                        Ok(false) => {
                            warn!(chunk = %chunk.name, "hash check failed during init, deleting");
                            if let Err(e) = fs::remove_file(&chunk.path) {
                                warn!(path = %chunk.path.display(), error = %e, "failed to delete chunk");
                            }
                        }
                        Err(e) => {
                            warn!(path = %chunk.path.display(), error = %e, "unreadable chunk skipped");
                        }
                    }
                }
                found = kept;
            }

            for chunk in found {
                let tick = catalogue.tick();
                let info = ChunkInfo::new(chunk.name, ty, chunk.size, tick);
                if !catalogue.insert(info) {
                    warn!(path = %chunk.path.display(), "chunk already catalogued under another type, ignoring");
                }
            }
        }
        Ok(catalogue.len())
    }

    /// Store `content` under `name`.
    ///
    /// A new chunk is filed as Normal. Storing onto an existing Outgoing,
    /// Cache or TempCache chunk rewrites it and promotes it to Normal;
    /// storing onto an existing Normal chunk fails with `InvalidChunkType`.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name), len = content.len()))]
    pub fn store(&self, name: &[u8], content: &[u8]) -> Result<()> {
        self.check_name(name)?;
        let name = ChunkName::new(name);
        let existing = self.catalogue().find(name.as_bytes()).map(|i| i.chunk_type);
        match existing {
            Some(ty) if ty.lifecycle == Lifecycle::Normal => Err(StoreError::InvalidChunkType),
            Some(_) => {
                self.overwrite(&name, content)?;
                self.promote_to_normal(name.as_bytes())
            }
            None => {
                let ty = self.classify(&name, content, Lifecycle::Normal);
                if self.write_new(&name, ty, content)? {
                    Ok(())
                } else {
                    Err(StoreError::InvalidChunkType)
                }
            }
        }
    }

    /// Store the contents of the file at `path` under `name`.
    pub fn store_file<P: AsRef<Path>>(&self, name: &[u8], path: P) -> Result<()> {
        let data = fs::read(path)?;
        self.store(name, &data)
    }

    /// Queue a chunk for upload. Never touches an existing chunk.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name), len = content.len()))]
    pub fn add_chunk_to_outgoing(&self, name: &[u8], content: &[u8]) -> Result<OutgoingStatus> {
        self.check_name(name)?;
        let name = ChunkName::new(name);
        if self.catalogue().contains(name.as_bytes()) {
            return Ok(OutgoingStatus::AlreadyPresent);
        }
        let ty = self.classify(&name, content, Lifecycle::Outgoing);
        if self.write_new(&name, ty, content)? {
            Ok(OutgoingStatus::Added)
        } else {
            Ok(OutgoingStatus::AlreadyPresent)
        }
    }

    pub fn add_file_to_outgoing<P: AsRef<Path>>(
        &self,
        name: &[u8],
        path: P,
    ) -> Result<OutgoingStatus> {
        let data = fs::read(path)?;
        self.add_chunk_to_outgoing(name, &data)
    }

    /// Catalogue membership. Never touches the disk.
    pub fn has(&self, name: &[u8]) -> bool {
        self.check_name(name).is_ok() && self.catalogue().contains(name)
    }

    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name)))]
    pub fn load(&self, name: &[u8]) -> Result<Vec<u8>> {
        self.check_name(name)?;
        let name = ChunkName::new(name);
        let ty = self
            .catalogue()
            .find(name.as_bytes())
            .map(|i| i.chunk_type)
            .ok_or(StoreError::InvalidChunkType)?;
        let path = self.layout.chunk_path(&name, ty);
        fs::read(&path).map_err(|e| not_found_or(e, &name))
    }

    /// Remove a chunk. Deleting an unknown chunk succeeds.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name)))]
    pub fn delete_chunk(&self, name: &[u8]) -> Result<()> {
        self.check_name(name)?;
        let mut catalogue = self.catalogue();
        let Some(info) = catalogue.find(name) else {
            return Ok(());
        };
        let path = self.layout.chunk_path(&info.name, info.chunk_type);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "chunk file already gone");
            }
            Err(e) => return Err(e.into()),
        }
        catalogue.remove(name);
        Ok(())
    }

    /// Recompute a hashable chunk's digest and compare it with its name.
    ///
    /// The chunk's last-checked time advances whatever the outcome.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name)))]
    pub fn hash_check_chunk(&self, name: &[u8]) -> Result<()> {
        self.check_name(name)?;
        let name = ChunkName::new(name);
        let ty = match self.catalogue().find(name.as_bytes()) {
            Some(info) if info.chunk_type.is_hashable() => info.chunk_type,
            _ => return Err(StoreError::InvalidChunkType),
        };

        let path = self.layout.chunk_path(&name, ty);
        let outcome = self.hasher.digest_file(&path);

        {
            let mut catalogue = self.catalogue();
            let tick = catalogue.tick();
            catalogue.update_last_checked(name.as_bytes(), tick);
        }

        match outcome {
            Ok(digest) if digest == name.as_bytes() => Ok(()),
            Ok(_) => {
                warn!(chunk = %name, "hash check failed");
                Err(StoreError::HashCheckFailure { names: vec![name] })
            }
            Err(e) => Err(not_found_or(e, &name)),
        }
    }

    /// Move a chunk to the directory of `new_type`.
    ///
    /// Fails with `StoreError::ChunkStore` for an unknown chunk; a no-op when
    /// the type is unchanged. If the move fails the catalogue is untouched.
    #[instrument(skip_all, level = "debug", fields(chunk = %hex::encode(name), to = %new_type))]
    pub fn change_chunk_type(&self, name: &[u8], new_type: ChunkType) -> Result<()> {
        self.check_name(name)?;
        let mut catalogue = self.catalogue();
        let old_type = catalogue
            .find(name)
            .map(|i| i.chunk_type)
            .ok_or_else(|| unknown_chunk(name))?;
        self.relocate_locked(&mut catalogue, name, old_type, new_type)
    }

    /// Move a chunk to the Normal lifecycle, keeping its hashability.
    pub fn promote_to_normal(&self, name: &[u8]) -> Result<()> {
        self.check_name(name)?;
        let mut catalogue = self.catalogue();
        let old_type = catalogue
            .find(name)
            .map(|i| i.chunk_type)
            .ok_or_else(|| unknown_chunk(name))?;
        let new_type = old_type.with_lifecycle(Lifecycle::Normal);
        self.relocate_locked(&mut catalogue, name, old_type, new_type)
    }

    fn relocate_locked(
        &self,
        catalogue: &mut ChunkCatalogue,
        name: &[u8],
        old_type: ChunkType,
        new_type: ChunkType,
    ) -> Result<()> {
        if old_type == new_type {
            return Ok(());
        }
        let name_owned = ChunkName::new(name);
        let from = self.layout.chunk_path(&name_owned, old_type);
        let to = self.layout.ensure_chunk_path(&name_owned, new_type)?;
        move_file(&from, &to)?;
        catalogue.update_type(name, new_type);
        debug!(chunk = %name_owned, from = %old_type, to = %new_type, "chunk relocated");
        Ok(())
    }

    pub fn chunk_type(&self, name: &[u8]) -> Option<ChunkType> {
        self.chunk_info(name).map(|i| i.chunk_type)
    }

    pub fn chunk_size(&self, name: &[u8]) -> Option<u64> {
        self.chunk_info(name).map(|i| i.size)
    }

    pub fn chunk_info(&self, name: &[u8]) -> Option<ChunkInfo> {
        if !self.is_initialised() {
            return None;
        }
        self.catalogue().find(name).cloned()
    }

    /// Where a catalogued chunk lives on disk.
    pub fn chunk_path(&self, name: &[u8]) -> Option<PathBuf> {
        self.chunk_info(name)
            .map(|i| self.layout.chunk_path(&i.name, i.chunk_type))
    }

    /// Every catalogued chunk name, sorted.
    pub fn chunk_names(&self) -> Vec<ChunkName> {
        let mut names: Vec<_> = self.catalogue().names().cloned().collect();
        names.sort();
        names
    }

    pub fn chunk_count(&self) -> usize {
        self.catalogue().len()
    }

    pub fn count_by_type(&self, ty: ChunkType) -> usize {
        self.catalogue().count_by_type(ty)
    }

    /// The chunk whose last hash check (or insertion) is oldest.
    pub fn oldest_checked(&self) -> Option<ChunkInfo> {
        self.catalogue().oldest_by_last_checked().cloned()
    }

    /// Delete the whole store tree and return to the uninitialised state.
    #[instrument(skip(self), fields(root = %self.root().display()))]
    pub fn clear(&self) -> Result<()> {
        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut catalogue = self.catalogue();
        self.set_state(StoreState::Uninitialised);
        match fs::remove_dir_all(self.root()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        catalogue.clear();
        info!("chunk store cleared");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Crate-internal plumbing shared with the vault.
    // ------------------------------------------------------------------

    pub(crate) fn catalogue(&self) -> MutexGuard<'_, ChunkCatalogue> {
        self.catalogue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_initialised(&self) -> Result<()> {
        if self.is_initialised() {
            Ok(())
        } else {
            Err(StoreError::Uninitialised)
        }
    }

    pub(crate) fn check_name(&self, name: &[u8]) -> Result<()> {
        self.ensure_initialised()?;
        if name.len() != self.key_size() {
            return Err(StoreError::IncorrectKeySize {
                expected: self.key_size(),
                actual: name.len(),
            });
        }
        Ok(())
    }

    /// Type for a new chunk in `lifecycle`.
    fn classify(&self, name: &ChunkName, content: &[u8], lifecycle: Lifecycle) -> ChunkType {
        let hashability = if self.options.detect_hashability
            && self.hasher.digest(content) != name.as_bytes()
        {
            Hashability::NonHashable
        } else {
            Hashability::Hashable
        };
        ChunkType::new(hashability, lifecycle)
    }

    /// Write a chunk that was not catalogued when the caller looked.
    ///
    /// Returns `false` if another writer catalogued the name first; the
    /// file written here is then removed unless it landed on the winner's path.
    pub(crate) fn write_new(&self, name: &ChunkName, ty: ChunkType, content: &[u8]) -> Result<bool> {
        let path = self.layout.ensure_chunk_path(name, ty)?;
        write_atomic(&path, content)?;

        let mut catalogue = self.catalogue();
        let tick = catalogue.tick();
        if catalogue.insert(ChunkInfo::new(name.clone(), ty, content.len() as u64, tick)) {
            return Ok(true);
        }
        let winner = catalogue.find(name.as_bytes()).map(|i| i.chunk_type);
        if winner != Some(ty) {
            let _ = fs::remove_file(&path);
        }
        debug!(chunk = %name, "lost race to catalogue chunk");
        Ok(false)
    }

    /// Rewrite an existing chunk at its current location and record the new size.
    pub(crate) fn overwrite(&self, name: &ChunkName, content: &[u8]) -> Result<()> {
        let ty = self
            .catalogue()
            .find(name.as_bytes())
            .map(|i| i.chunk_type)
            .ok_or(StoreError::InvalidChunkType)?;
        let path = self.layout.ensure_chunk_path(name, ty)?;
        write_atomic(&path, content)?;

        let mut catalogue = self.catalogue();
        if let Some(old_size) = catalogue.find(name.as_bytes()).map(|i| i.size) {
            let delta = content.len() as i64 - old_size as i64;
            catalogue.update_size(name.as_bytes(), delta);
        }
        Ok(())
    }
}

/// Unique per process and thread, so concurrent writers never share one.
fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "chunk path has no file name"))?;
    let temp_name = format!(
        "{}.{}.{:?}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        thread::current().id()
    );
    Ok(path.with_file_name(temp_name))
}

/// Write via a unique temp file in the same directory, then rename into place.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let temp_path = temp_path_for(path)?;

    let result = File::create(&temp_path).and_then(|mut file| {
        file.write_all(content)?;
        file.sync_all()
    });
    if let Err(e) = result.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

/// Rename, falling back to copy + remove across filesystems.
///
/// On error the chunk is left at `from` only. The fallback copies into a temp
/// file of its own, so a failed copy never removes anything it did not create.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    let temp_path = temp_path_for(to)?;
    if let Err(e) = fs::copy(from, &temp_path).and_then(|_| fs::rename(&temp_path, to)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    match fs::remove_file(from) {
        Ok(()) => Ok(()),
        // Someone else removed the source; the chunk now lives at `to`.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            if let Err(undo) = fs::remove_file(to) {
                warn!(path = %to.display(), error = %undo, "failed to undo chunk copy");
            }
            Err(e)
        }
    }
}

fn not_found_or(e: io::Error, name: &ChunkName) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound { name: name.clone() }
    } else {
        StoreError::Io(e)
    }
}

fn unknown_chunk(name: &[u8]) -> StoreError {
    StoreError::ChunkStore(format!("chunk {} is not in the store", hex::encode(name)))
}
