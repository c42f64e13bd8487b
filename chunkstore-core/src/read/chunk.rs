use tracing::debug;

use crate::container::chunk::ChunkFile;
use crate::container::manifest::ChunkInfo;
use crate::error::{ChunkStoreError, Result};
use crate::store::ChunkStore;

/// Load a loose chunk file and check it is the chunk the caller asked for.
pub fn load_chunk(store: &dyn ChunkStore, path: &str, info: &ChunkInfo) -> Result<ChunkFile> {
    let bytes = store.read(path)?;
    let chunk = ChunkFile::parse(&bytes)?;
    if chunk.header.id != info.id {
        return Err(ChunkStoreError::corrupt(
            path,
            format!("header names chunk {}, expected {}", chunk.header.id, info.id),
        ));
    }
    if chunk.header.digest != info.digest {
        return Err(ChunkStoreError::Verification { id: info.id });
    }
    debug!(path, id = %info.id, stored = chunk.payload.len(), "loaded chunk");
    Ok(chunk)
}

/// Load, decompress and verify a chunk's data.
pub fn read_chunk_data(store: &dyn ChunkStore, path: &str, info: &ChunkInfo) -> Result<Vec<u8>> {
    let chunk = load_chunk(store, path, info)?;
    chunk.decode_verified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkId;
    use crate::store::memory::MemoryStore;

    fn setup() -> (MemoryStore, ChunkInfo, Vec<u8>) {
        // LCG noise keeps the payload raw, so a flipped byte always reaches the digest check.
        let mut x = 0x2545_f491u32;
        let data: Vec<u8> = (0..4096)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (x >> 24) as u8
            })
            .collect();
        let c = ChunkFile::encode(ChunkId([5; 16]), &data).unwrap();
        let info = ChunkInfo {
            id: c.header.id,
            rolling_hash: c.header.rolling_hash,
            digest: c.header.digest,
            group: c.header.id.group(),
            window_size: data.len() as u32,
            file_size: c.to_bytes().len() as u64,
        };
        let s = MemoryStore::new();
        s.write("c.chunk", &c.to_bytes()).unwrap();
        (s, info, data)
    }

    #[test]
    fn verified_read_returns_data() {
        let (s, info, data) = setup();
        assert_eq!(read_chunk_data(&s, "c.chunk", &info).unwrap(), data);
    }

    #[test]
    fn bit_rot_is_a_verification_error() {
        let (s, info, _) = setup();
        let mut bytes = s.read("c.chunk").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        s.write("c.chunk", &bytes).unwrap();
        assert!(matches!(
            read_chunk_data(&s, "c.chunk", &info),
            Err(ChunkStoreError::Verification { .. })
        ));
    }

    #[test]
    fn wrong_chunk_is_corrupt() {
        let (s, mut info, _) = setup();
        info.id = ChunkId([6; 16]);
        assert!(matches!(
            load_chunk(&s, "c.chunk", &info),
            Err(ChunkStoreError::Corrupt { .. })
        ));
    }
}
