use std::io;

use thiserror::Error;

use crate::ChunkName;

/// Errors that can occur during chunk store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("chunk store is not initialised")]
    Uninitialised,

    #[error("incorrect key size: expected {expected} bytes, got {actual}")]
    IncorrectKeySize { expected: usize, actual: usize },

    #[error("invalid chunk type")]
    InvalidChunkType,

    #[error("chunk file not found: {name}")]
    NotFound { name: ChunkName },

    #[error("hash check failed for {} chunk(s)", .names.len())]
    HashCheckFailure { names: Vec<ChunkName> },

    #[error("not enough space for caching: need {needed} bytes, {free} free")]
    NoSpaceForCaching { needed: u64, free: u64 },

    #[error("no cache space to clear")]
    NoCacheSpaceToClear,

    #[error("root path too long: {len} characters (max {max})")]
    RootPathTooLong { len: usize, max: usize },

    #[error("chunk store error: {0}")]
    ChunkStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
