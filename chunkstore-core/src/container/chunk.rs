use std::io::{Read, Write};

use crate::codec::{self, CodecId};
use crate::domain::{CHUNK_ID_LEN, ChunkId, DIGEST_LEN, Digest};
use crate::error::{ChunkStoreError, Result};
use crate::util::rolling;

/// id[16] | rolling u64 | digest[20] | uncompressed_size u32
pub const HEADER_LEN: u64 = (CHUNK_ID_LEN + 8 + DIGEST_LEN + 4) as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub rolling_hash: u64,
    pub digest: Digest,
    pub uncompressed_size: u32,
}

impl ChunkHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN as usize] {
        let mut out = [0u8; HEADER_LEN as usize];
        let (id, rest) = out.split_at_mut(CHUNK_ID_LEN);
        let (rolling, rest) = rest.split_at_mut(8);
        let (digest, size) = rest.split_at_mut(DIGEST_LEN);
        id.copy_from_slice(&self.id.0);
        rolling.copy_from_slice(&self.rolling_hash.to_le_bytes());
        digest.copy_from_slice(&self.digest.0);
        size.copy_from_slice(&self.uncompressed_size.to_le_bytes());
        out
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    pub fn read_from(mut r: impl Read) -> std::io::Result<Self> {
        let mut id = [0u8; CHUNK_ID_LEN];
        r.read_exact(&mut id)?;
        let mut b8 = [0u8; 8];
        r.read_exact(&mut b8)?;
        let mut digest = [0u8; DIGEST_LEN];
        r.read_exact(&mut digest)?;
        let mut b4 = [0u8; 4];
        r.read_exact(&mut b4)?;
        Ok(Self {
            id: ChunkId(id),
            rolling_hash: u64::from_le_bytes(b8),
            digest: Digest(digest),
            uncompressed_size: u32::from_le_bytes(b4),
        })
    }
}

/// A loose chunk as kept in the store: header followed by the stored payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    pub header: ChunkHeader,
    pub payload: Vec<u8>,
}

impl ChunkFile {
    /// Build a chunk from raw data, compressing when it pays off.
    pub fn encode(id: ChunkId, data: &[u8]) -> Result<Self> {
        let uncompressed_size = u32::try_from(data.len()).map_err(|_| {
            ChunkStoreError::Argument(format!("chunk of {} bytes exceeds u32", data.len()))
        })?;
        let (_, payload) = codec::encode_payload(data, codec::DEFAULT_MIN_GAIN)?;
        Ok(Self {
            header: ChunkHeader {
                id,
                rolling_hash: rolling::hash_of(data),
                digest: Digest::of(data),
                uncompressed_size,
            },
            payload,
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if (bytes.len() as u64) < HEADER_LEN {
            return Err(ChunkStoreError::truncated(
                "chunk header",
                HEADER_LEN,
                bytes.len() as u64,
            ));
        }
        let header = ChunkHeader::read_from(&bytes[..HEADER_LEN as usize])?;
        Ok(Self {
            header,
            payload: bytes[HEADER_LEN as usize..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN as usize + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn codec(&self) -> CodecId {
        CodecId::for_payload(self.payload.len() as u64, self.header.uncompressed_size)
    }

    /// Decompress and check the digest. A mismatch is never ignored.
    pub fn decode_verified(&self) -> Result<Vec<u8>> {
        decode_payload(&self.header, &self.payload)
    }
}

pub fn decode_payload(header: &ChunkHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let codec = CodecId::for_payload(payload.len() as u64, header.uncompressed_size);
    let data = codec
        .decompressor()
        .decompress(payload, header.uncompressed_size as usize)
        .map_err(|e| match e {
            ChunkStoreError::Io(_) | ChunkStoreError::Corrupt { .. } => {
                ChunkStoreError::Verification { id: header.id }
            }
            other => other,
        })?;
    if Digest::of(&data) != header.digest {
        return Err(ChunkStoreError::Verification { id: header.id });
    }
    Ok(data)
}
