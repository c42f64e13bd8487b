// chunkstore_core/src/domain.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChunkStoreError, Result};

pub const CHUNK_ID_LEN: usize = 16;
pub const DIGEST_LEN: usize = 20;

/// Opaque 128-bit chunk identity. All-zero is never a valid id.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub [u8; CHUNK_ID_LEN]);

impl ChunkId {
    pub const ZERO: ChunkId = ChunkId([0u8; CHUNK_ID_LEN]);

    pub fn new_random() -> Result<Self> {
        let mut b = [0u8; CHUNK_ID_LEN];
        loop {
            getrandom::getrandom(&mut b).map_err(|e| std::io::Error::other(e.to_string()))?;
            if b != [0u8; CHUNK_ID_LEN] {
                return Ok(Self(b));
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; CHUNK_ID_LEN]
    }

    /// Storage group used to fan chunk files out over 100 sub-directories.
    pub fn group(&self) -> u8 {
        (u128::from_be_bytes(self.0) % 100) as u8
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({self})")
    }
}

impl FromStr for ChunkId {
    type Err = ChunkStoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| ChunkStoreError::Argument(format!("invalid chunk id {s:?}: {e}")))?;
        let arr: [u8; CHUNK_ID_LEN] = bytes.try_into().map_err(|_| {
            ChunkStoreError::Argument(format!("chunk id {s:?} is not {CHUNK_ID_LEN} bytes"))
        })?;
        Ok(Self(arr))
    }
}

/// 160-bit content digest of a decompressed chunk payload.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    pub fn of(data: &[u8]) -> Self {
        let mut h = blake3::Hasher::new();
        h.update(data);
        let mut out = [0u8; DIGEST_LEN];
        h.finalize_xof().fill(&mut out);
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// A byte range taken from one chunk, in file order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPart {
    pub id: ChunkId,
    pub offset: u32,
    pub size: u32,
}

/// Non-fatal problem collected while an operation keeps going.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }
}
