//! Content hashing for change detection and cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// A 128-bit content digest computed using XXH3.
///
/// Two inputs with the same `ContentHash` are assumed to have identical
/// content. The digest only detects changes; it makes no claim of
/// cryptographic strength.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_u128(xxhash_rust::xxh3::xxh3_128(data))
    }

    fn from_u128(value: u128) -> Self {
        Self(value.to_le_bytes())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the digest as 32 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Streaming digest over byte blocks.
///
/// Feeding the same bytes in any block split produces the same
/// [`ContentHash`] as [`ContentHash::from_bytes`] over the concatenation.
pub struct Digest {
    state: Xxh3,
    processed: u64,
}

impl Digest {
    /// Creates an empty digest.
    pub fn new() -> Self {
        Self {
            state: Xxh3::new(),
            processed: 0,
        }
    }

    /// Feeds a block of bytes into the digest.
    pub fn update(&mut self, block: &[u8]) {
        self.state.update(block);
        self.processed += block.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Returns the digest of everything fed so far.
    ///
    /// The digest stays usable; more blocks may be fed afterwards.
    pub fn finish(&self) -> ContentHash {
        ContentHash::from_u128(self.state.digest128())
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digest")
            .field("processed", &self.processed)
            .finish_non_exhaustive()
    }
}
