//! 256-bit identifiers.
//!
//! On the protocol boundary every 256-bit identifier is four 64-bit words.
//! Word 0 holds bytes 0..8 in little-endian order, word 3 holds bytes 24..32.
//! Ordering is defined over the byte form so it matches lexicographic order of
//! the serialized identifier.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

/// A 256-bit value stored as four little-endian 64-bit words.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Word256(pub [u64; 4]);

/// Hash of a block's canonical envelope bytes.
pub type BlockHash = Word256;

/// Hash of a transaction's canonical envelope bytes.
pub type TxHash = Word256;

impl Word256 {
    pub const ZERO: Self = Self([0; 4]);

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_le_bytes(buf);
        }
        Self(words)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (chunk, word) in out.chunks_exact_mut(8).zip(self.0.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| TypesError::InvalidHex(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl Ord for Word256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Word256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Word256> for String {
    fn from(word: Word256) -> Self {
        word.to_hex()
    }
}

impl TryFrom<String> for Word256 {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl fmt::Display for Word256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Word256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word256({})", self.to_hex())
    }
}

/// An account address: the BLAKE3 hash of the account's public key bytes.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountAddress(pub Word256);

impl AccountAddress {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(Word256::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Word256::from_hex(s).map(Self)
    }

    /// Short form used in log lines.
    pub fn short(&self) -> String {
        let mut s = self.0.to_hex();
        s.truncate(12);
        s
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountAddress({})", self.0.to_hex())
    }
}
