//! Digest functions used to name and verify chunks.
//!
//! The store never hashes on the write path unless hashability detection is
//! enabled; hashing is otherwise confined to hash checks.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Injected digest function: `name == digest(content)` for hashable chunks.
pub trait ChunkHasher: Send + Sync + fmt::Debug {
    /// Digest length in bytes. This is also the store's key size.
    fn digest_len(&self) -> usize;

    fn digest(&self, data: &[u8]) -> Vec<u8>;

    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<Vec<u8>>;

    fn name(&self) -> &'static str;

    fn digest_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut reader = BufReader::with_capacity(READ_BUF_SIZE, File::open(path)?);
        self.digest_reader(&mut reader)
    }
}

/// SHA-512 (64-byte names).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Hasher;

impl ChunkHasher for Sha512Hasher {
    fn digest_len(&self) -> usize {
        64
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha512::digest(data).to_vec()
    }

    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<Vec<u8>> {
        let mut hasher = Sha512::new();
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().to_vec())
    }

    fn name(&self) -> &'static str {
        "sha512"
    }
}

/// BLAKE3 (32-byte names).
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl ChunkHasher for Blake3Hasher {
    fn digest_len(&self) -> usize {
        blake3::OUT_LEN
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }

    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<Vec<u8>> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().as_bytes().to_vec())
    }

    fn name(&self) -> &'static str {
        "blake3"
    }
}

/// Digest selection as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha512,
    Blake3,
}

impl DigestAlgorithm {
    pub fn hasher(self) -> Arc<dyn ChunkHasher> {
        match self {
            DigestAlgorithm::Sha512 => Arc::new(Sha512Hasher),
            DigestAlgorithm::Blake3 => Arc::new(Blake3Hasher),
        }
    }
}
