use crate::domain::{CHUNK_ID_LEN, ChunkId};
use crate::error::{ChunkStoreError, Result};
use std::io::Write;

pub const ENTRY_SIZE: usize = CHUNK_ID_LEN + 8 + 8;

/// Where one chunk lives inside a package: `byte_start` is the offset of its
/// `ChunkHeader`, `byte_size` the stored payload length that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    pub id: ChunkId,
    pub byte_start: u64,
    pub byte_size: u64,
}

pub fn write_table(mut w: impl Write, entries: &[ChunkLocation]) -> Result<()> {
    let mut buf = [0u8; ENTRY_SIZE];
    for e in entries {
        buf[..16].copy_from_slice(&e.id.0);
        buf[16..24].copy_from_slice(&e.byte_start.to_le_bytes());
        buf[24..32].copy_from_slice(&e.byte_size.to_le_bytes());
        w.write_all(&buf)?;
    }
    Ok(())
}

#[inline]
fn le64(x: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&x[..8]);
    u64::from_le_bytes(b)
}

/// Parse `count` entries from the front of `r`, advancing it.
pub fn read_table(r: &mut &[u8], count: u64) -> Result<Vec<ChunkLocation>> {
    let need = count
        .checked_mul(ENTRY_SIZE as u64)
        .ok_or_else(|| ChunkStoreError::corrupt("chunk table", "size overflow"))?;
    if (r.len() as u64) < need {
        return Err(ChunkStoreError::truncated(
            "chunk table",
            need,
            r.len() as u64,
        ));
    }

    let slice = &r[..need as usize];
    let mut out = Vec::with_capacity(count as usize);
    for e in slice.chunks_exact(ENTRY_SIZE) {
        // Layout: [0..16]=id, [16..24]=byte_start, [24..32]=byte_size
        let mut id = [0u8; CHUNK_ID_LEN];
        id.copy_from_slice(&e[..16]);
        out.push(ChunkLocation {
            id: ChunkId(id),
            byte_start: le64(&e[16..24]),
            byte_size: le64(&e[24..32]),
        });
    }

    *r = &r[need as usize..]; // advance
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_32_bytes() {
        assert_eq!(ENTRY_SIZE, 32);
    }

    #[test]
    fn short_table_reports_truncation() {
        let entries = vec![
            ChunkLocation {
                id: ChunkId([1; 16]),
                byte_start: 100,
                byte_size: 5,
            };
            3
        ];
        let mut buf = Vec::new();
        write_table(&mut buf, &entries).unwrap();
        let mut cut = &buf[..buf.len() - 1];
        assert!(matches!(
            read_table(&mut cut, 3),
            Err(ChunkStoreError::Truncated { .. })
        ));
        let mut full = &buf[..];
        assert_eq!(read_table(&mut full, 3).unwrap(), entries);
        assert!(full.is_empty());
    }
}
