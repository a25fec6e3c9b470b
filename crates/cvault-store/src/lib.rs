//! # cvault-store
//!
//! Content-addressed chunk store for Chunkvault.
//!
//! Chunks are opaque byte blobs named by the digest of their content. Each
//! chunk has a type made of a hashability (whether `digest(content) == name`
//! is expected to hold) and a lifecycle (Normal, Cache, Outgoing,
//! TempCache). The type selects one of eight directories; three single hex
//! characters taken from the end of the name shard each directory.
//!
//! An in-memory [`ChunkCatalogue`] indexes what is on disk by name, by
//! type and by last hash check. It is derived state: [`ChunkStore::init`]
//! rebuilds it by rescanning the tree.
//!
//! [`VaultChunkStore`] adds space accounting, cache admission, eviction of
//! the least recently checked cache chunks, random sampling and full-store
//! hash audits.

mod catalogue;
mod chunk_type;
mod error;
mod hasher;
pub mod layout;
mod name;
pub mod scan;
mod store;
pub mod testing;
mod vault;

pub use catalogue::{ChunkCatalogue, ChunkInfo};
pub use chunk_type::{ChunkType, Hashability, Lifecycle};
pub use error::{Result, StoreError};
pub use hasher::{Blake3Hasher, ChunkHasher, DigestAlgorithm, Sha512Hasher};
pub use layout::{PathMap, ShardLayout};
pub use name::ChunkName;
pub use store::{ChunkStore, OutgoingStatus, StoreOptions, StoreState, MAX_ROOT_PATH_LEN};
pub use vault::{HashCheckReport, VaultChunkStore};
