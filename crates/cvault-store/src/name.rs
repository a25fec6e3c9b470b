//! Chunk names: the raw digest bytes of a chunk's content.

use std::borrow::Borrow;
use std::fmt;

/// Binary ("non-hex") chunk name.
///
/// Stored as raw digest bytes; rendered as lowercase hex for filenames,
/// logs and the CLI.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkName(Box<[u8]>);

impl ChunkName {
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded name. Returns `None` for odd lengths or non-hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        hex::decode(hex).ok().map(Self::from)
    }

    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ChunkName {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for ChunkName {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for ChunkName {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Lets catalogue maps be queried with a plain byte slice.
impl Borrow<[u8]> for ChunkName {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Full digests are unreadable in debug output; a prefix is enough to tell chunks apart.
impl fmt::Debug for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        if hex.len() > 16 {
            write!(f, "ChunkName({}..)", &hex[..16])
        } else {
            write!(f, "ChunkName({})", hex)
        }
    }
}
