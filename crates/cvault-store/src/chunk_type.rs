//! Chunk types: one hashability plus one lifecycle state.
//!
//! The legacy wire/bitmask form sets exactly one bit from each axis:
//!
//! ```text
//! Hashable    0x10    Normal     0x01
//! NonHashable 0x20    Cache      0x02
//!                     Outgoing   0x04
//!                     TempCache  0x08
//! ```

use std::fmt;
use std::str::FromStr;

use crate::{Result, StoreError};

/// Whether `digest(content) == name` is expected to hold for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hashability {
    Hashable,
    NonHashable,
}

impl Hashability {
    pub const ALL: [Hashability; 2] = [Hashability::Hashable, Hashability::NonHashable];

    pub const fn bits(self) -> u8 {
        match self {
            Hashability::Hashable => 0x10,
            Hashability::NonHashable => 0x20,
        }
    }

    /// Directory leaf used under the store root.
    pub const fn leaf(self) -> &'static str {
        match self {
            Hashability::Hashable => "Hashable",
            Hashability::NonHashable => "NonHashable",
        }
    }
}

/// Lifecycle state of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Permanently stored.
    Normal,
    /// Cached on behalf of the network; evictable.
    Cache,
    /// Queued for upload.
    Outgoing,
    /// Short-lived local cache.
    TempCache,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 4] = [
        Lifecycle::Normal,
        Lifecycle::Cache,
        Lifecycle::Outgoing,
        Lifecycle::TempCache,
    ];

    pub const fn bits(self) -> u8 {
        match self {
            Lifecycle::Normal => 0x01,
            Lifecycle::Cache => 0x02,
            Lifecycle::Outgoing => 0x04,
            Lifecycle::TempCache => 0x08,
        }
    }

    pub const fn leaf(self) -> &'static str {
        match self {
            Lifecycle::Normal => "Normal",
            Lifecycle::Cache => "Cache",
            Lifecycle::Outgoing => "Outgoing",
            Lifecycle::TempCache => "TempCache",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Lifecycle::Normal => 0,
            Lifecycle::Cache => 1,
            Lifecycle::Outgoing => 2,
            Lifecycle::TempCache => 3,
        }
    }
}

/// A valid chunk type. Every value of this struct is one of the 8 legal combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkType {
    pub hashability: Hashability,
    pub lifecycle: Lifecycle,
}

impl ChunkType {
    pub const HASHABLE_NORMAL: ChunkType = ChunkType::new(Hashability::Hashable, Lifecycle::Normal);
    pub const HASHABLE_CACHE: ChunkType = ChunkType::new(Hashability::Hashable, Lifecycle::Cache);
    pub const HASHABLE_OUTGOING: ChunkType =
        ChunkType::new(Hashability::Hashable, Lifecycle::Outgoing);
    pub const HASHABLE_TEMP_CACHE: ChunkType =
        ChunkType::new(Hashability::Hashable, Lifecycle::TempCache);
    pub const NON_HASHABLE_NORMAL: ChunkType =
        ChunkType::new(Hashability::NonHashable, Lifecycle::Normal);
    pub const NON_HASHABLE_CACHE: ChunkType =
        ChunkType::new(Hashability::NonHashable, Lifecycle::Cache);
    pub const NON_HASHABLE_OUTGOING: ChunkType =
        ChunkType::new(Hashability::NonHashable, Lifecycle::Outgoing);
    pub const NON_HASHABLE_TEMP_CACHE: ChunkType =
        ChunkType::new(Hashability::NonHashable, Lifecycle::TempCache);

    /// All 8 valid types, hashable first.
    pub const ALL: [ChunkType; 8] = [
        ChunkType::HASHABLE_NORMAL,
        ChunkType::HASHABLE_CACHE,
        ChunkType::HASHABLE_OUTGOING,
        ChunkType::HASHABLE_TEMP_CACHE,
        ChunkType::NON_HASHABLE_NORMAL,
        ChunkType::NON_HASHABLE_CACHE,
        ChunkType::NON_HASHABLE_OUTGOING,
        ChunkType::NON_HASHABLE_TEMP_CACHE,
    ];

    pub const fn new(hashability: Hashability, lifecycle: Lifecycle) -> Self {
        Self {
            hashability,
            lifecycle,
        }
    }

    /// Decode a legacy bitmask. Exactly one bit from each axis must be set.
    pub fn from_bits(bits: u8) -> Result<Self> {
        let hashability = match bits & 0xf0 {
            0x10 => Hashability::Hashable,
            0x20 => Hashability::NonHashable,
            _ => return Err(StoreError::InvalidChunkType),
        };
        let lifecycle = match bits & 0x0f {
            0x01 => Lifecycle::Normal,
            0x02 => Lifecycle::Cache,
            0x04 => Lifecycle::Outgoing,
            0x08 => Lifecycle::TempCache,
            _ => return Err(StoreError::InvalidChunkType),
        };
        Ok(Self::new(hashability, lifecycle))
    }

    pub const fn bits(self) -> u8 {
        self.hashability.bits() | self.lifecycle.bits()
    }

    #[inline]
    pub fn is_hashable(self) -> bool {
        self.hashability == Hashability::Hashable
    }

    #[inline]
    pub fn is_cache(self) -> bool {
        self.lifecycle == Lifecycle::Cache
    }

    /// Same hashability, different lifecycle.
    pub const fn with_lifecycle(self, lifecycle: Lifecycle) -> Self {
        Self::new(self.hashability, lifecycle)
    }

    pub(crate) const fn index(self) -> usize {
        let base = match self.hashability {
            Hashability::Hashable => 0,
            Hashability::NonHashable => 4,
        };
        base + self.lifecycle.index()
    }
}

impl Default for ChunkType {
    fn default() -> Self {
        ChunkType::HASHABLE_NORMAL
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.hashability.leaf().to_ascii_lowercase(),
            self.lifecycle.leaf().to_ascii_lowercase()
        )
    }
}

/// Parses `hashable:normal`, `nonhashable:tempcache`, ... (case-insensitive),
/// or a legacy bitmask such as `0x11`.
impl FromStr for ChunkType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(hex_bits) = s.strip_prefix("0x") {
            let bits = u8::from_str_radix(hex_bits, 16).map_err(|_| StoreError::InvalidChunkType)?;
            return ChunkType::from_bits(bits);
        }
        let (h, l) = s.split_once(':').ok_or(StoreError::InvalidChunkType)?;
        let hashability = match h {
            "hashable" => Hashability::Hashable,
            "nonhashable" | "non-hashable" => Hashability::NonHashable,
            _ => return Err(StoreError::InvalidChunkType),
        };
        let lifecycle = match l {
            "normal" => Lifecycle::Normal,
            "cache" => Lifecycle::Cache,
            "outgoing" => Lifecycle::Outgoing,
            "tempcache" | "temp-cache" => Lifecycle::TempCache,
            _ => return Err(StoreError::InvalidChunkType),
        };
        Ok(ChunkType::new(hashability, lifecycle))
    }
}
