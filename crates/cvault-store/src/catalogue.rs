//! In-memory multi-index over every chunk currently on disk.
//!
//! Three views are kept in lock-step:
//! - by name: point lookup of metadata
//! - by last-checked: ordered, oldest first (audit and eviction)
//! - by type: one vector per type with swap-remove, so counting and
//!   picking the n-th chunk of a type are O(1)
//!
//! The catalogue is plain data. `ChunkStore` owns it behind a single mutex
//! and is the only mutator.

use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{ChunkName, ChunkType, Lifecycle};

/// Catalogue entry for one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub name: ChunkName,
    pub chunk_type: ChunkType,
    pub size: u64,
    /// Microseconds since the UNIX epoch, strictly increasing per catalogue.
    pub last_checked: u64,
}

impl ChunkInfo {
    pub fn new(name: ChunkName, chunk_type: ChunkType, size: u64, last_checked: u64) -> Self {
        Self {
            name,
            chunk_type,
            size,
            last_checked,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChunkCatalogue {
    by_name: HashMap<ChunkName, ChunkInfo>,
    by_last_checked: BTreeSet<(u64, ChunkName)>,
    by_type: [Vec<ChunkName>; 8],
    type_slot: HashMap<ChunkName, usize>,
    total_bytes: u64,
    lifecycle_bytes: [u64; 4],
    clock: u64,
}

impl ChunkCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next catalogue timestamp: wall-clock microseconds, bumped so that it
    /// is always greater than the previous tick.
    pub fn tick(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.clock = now.max(self.clock + 1);
        self.clock
    }

    /// Insert a new entry. Returns `false` and leaves the catalogue untouched
    /// if the name is already present.
    pub fn insert(&mut self, info: ChunkInfo) -> bool {
        if self.by_name.contains_key(&info.name) {
            return false;
        }
        let slot = &mut self.by_type[info.chunk_type.index()];
        self.type_slot.insert(info.name.clone(), slot.len());
        slot.push(info.name.clone());
        self.by_last_checked
            .insert((info.last_checked, info.name.clone()));
        self.add_bytes(info.chunk_type, info.size);
        self.by_name.insert(info.name.clone(), info);
        true
    }

    pub fn find(&self, name: &[u8]) -> Option<&ChunkInfo> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn remove(&mut self, name: &[u8]) -> Option<ChunkInfo> {
        let info = self.by_name.remove(name)?;
        self.by_last_checked
            .remove(&(info.last_checked, info.name.clone()));
        self.detach_from_type(&info.name, info.chunk_type);
        self.sub_bytes(info.chunk_type, info.size);
        Some(info)
    }

    pub fn count_by_type(&self, ty: ChunkType) -> usize {
        self.by_type[ty.index()].len()
    }

    /// The `index`-th chunk of type `ty`, for `index < count_by_type(ty)`.
    ///
    /// Order within a type is arbitrary but stable between mutations.
    pub fn nth_by_type(&self, ty: ChunkType, index: usize) -> Option<&ChunkInfo> {
        self.by_type[ty.index()]
            .get(index)
            .and_then(|name| self.by_name.get(name))
    }

    pub fn oldest_by_last_checked(&self) -> Option<&ChunkInfo> {
        self.iter_by_last_checked().next()
    }

    /// All entries, least recently checked first.
    pub fn iter_by_last_checked(&self) -> impl Iterator<Item = &ChunkInfo> + '_ {
        self.by_last_checked
            .iter()
            .filter_map(move |(_, name)| self.by_name.get(name))
    }

    pub fn update_type(&mut self, name: &[u8], new_type: ChunkType) -> bool {
        let (old_type, size) = match self.by_name.get(name) {
            Some(info) => (info.chunk_type, info.size),
            None => return false,
        };
        if old_type == new_type {
            return true;
        }
        let key = self.by_name[name].name.clone();
        self.detach_from_type(&key, old_type);
        let slot = &mut self.by_type[new_type.index()];
        self.type_slot.insert(key.clone(), slot.len());
        slot.push(key);
        self.sub_bytes(old_type, size);
        self.add_bytes(new_type, size);
        if let Some(info) = self.by_name.get_mut(name) {
            info.chunk_type = new_type;
        }
        true
    }

    pub fn update_last_checked(&mut self, name: &[u8], timestamp: u64) -> bool {
        let Some(info) = self.by_name.get_mut(name) else {
            return false;
        };
        self.by_last_checked
            .remove(&(info.last_checked, info.name.clone()));
        info.last_checked = timestamp;
        self.by_last_checked.insert((timestamp, info.name.clone()));
        true
    }

    /// Adjust a chunk's recorded size by `delta` bytes (clamped at zero).
    pub fn update_size(&mut self, name: &[u8], delta: i64) -> bool {
        let (ty, old_size) = match self.by_name.get(name) {
            Some(info) => (info.chunk_type, info.size),
            None => return false,
        };
        let new_size = (old_size as i64).saturating_add(delta).max(0) as u64;
        self.sub_bytes(ty, old_size);
        self.add_bytes(ty, new_size);
        if let Some(info) = self.by_name.get_mut(name) {
            info.size = new_size;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &ChunkName> + '_ {
        self.by_name.keys()
    }

    pub fn clear(&mut self) {
        let clock = self.clock;
        *self = Self::default();
        self.clock = clock;
    }

    /// Sum of the sizes of all catalogued chunks.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_in_lifecycle(&self, lifecycle: Lifecycle) -> u64 {
        self.lifecycle_bytes[lifecycle.index()]
    }

    fn detach_from_type(&mut self, name: &ChunkName, ty: ChunkType) {
        let Some(pos) = self.type_slot.remove(name) else {
            return;
        };
        let slot = &mut self.by_type[ty.index()];
        slot.swap_remove(pos);
        if let Some(moved) = slot.get(pos) {
            self.type_slot.insert(moved.clone(), pos);
        }
    }

    fn add_bytes(&mut self, ty: ChunkType, size: u64) {
        self.total_bytes += size;
        self.lifecycle_bytes[ty.lifecycle.index()] += size;
    }

    fn sub_bytes(&mut self, ty: ChunkType, size: u64) {
        self.total_bytes = self.total_bytes.saturating_sub(size);
        let bucket = &mut self.lifecycle_bytes[ty.lifecycle.index()];
        *bucket = bucket.saturating_sub(size);
    }
}
