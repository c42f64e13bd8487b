use crate::container::chunk::ChunkFile;
use crate::domain::{ChunkId, ChunkPart};
use crate::error::Result;

/// Packs unmatched bytes into new chunks of a fixed target size.
pub struct NewChunkBuilder {
    chunk_size: usize,
    id: ChunkId,
    buf: Vec<u8>,
    finished: Vec<ChunkFile>,
}

impl NewChunkBuilder {
    pub fn new(chunk_size: usize) -> Result<Self> {
        Ok(Self {
            chunk_size: chunk_size.max(1),
            id: ChunkId::new_random()?,
            buf: Vec::new(),
            finished: Vec::new(),
        })
    }

    /// Append `data` and return the parts that now hold it.
    pub fn push(&mut self, mut data: &[u8]) -> Result<Vec<ChunkPart>> {
        let mut parts = Vec::new();
        while !data.is_empty() {
            let take = (self.chunk_size - self.buf.len()).min(data.len());
            parts.push(ChunkPart {
                id: self.id,
                offset: self.buf.len() as u32,
                size: take as u32,
            });
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.chunk_size {
                self.seal()?;
            }
        }
        Ok(parts)
    }

    fn seal(&mut self) -> Result<()> {
        let data = std::mem::take(&mut self.buf);
        self.finished.push(ChunkFile::encode(self.id, &data)?);
        self.id = ChunkId::new_random()?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<ChunkFile>> {
        if !self.buf.is_empty() {
            self.seal()?;
        }
        Ok(self.finished)
    }
}

/// Parts laid end to end, with the offset at which each one starts.
#[derive(Default)]
pub struct PartMap {
    starts: Vec<u64>,
    parts: Vec<ChunkPart>,
    len: u64,
}

impl PartMap {
    pub fn push(&mut self, part: ChunkPart) {
        self.starts.push(self.len);
        self.len += part.size as u64;
        self.parts.push(part);
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Parts covering `[off, off + len)`. The range must lie within the map.
    pub fn select(&self, off: u64, len: u64) -> Vec<ChunkPart> {
        let mut out = Vec::new();
        let end = off + len;
        let mut i = self.starts.partition_point(|&s| s <= off).saturating_sub(1);
        let mut cur = off;
        while cur < end && i < self.parts.len() {
            let p = self.parts[i];
            let start = self.starts[i];
            let skip = cur - start;
            let take = (p.size as u64 - skip).min(end - cur);
            if take > 0 {
                out.push(ChunkPart {
                    id: p.id,
                    offset: p.offset + skip as u32,
                    size: take as u32,
                });
            }
            cur += take;
            i += 1;
        }
        out
    }
}

/// Join neighbours that continue the same chunk.
pub fn merge_adjacent(parts: Vec<ChunkPart>) -> Vec<ChunkPart> {
    let mut out: Vec<ChunkPart> = Vec::with_capacity(parts.len());
    for p in parts.into_iter().filter(|p| p.size > 0) {
        match out.last_mut() {
            Some(last) if last.id == p.id && last.offset + last.size == p.offset => {
                last.size += p.size;
            }
            _ => out.push(p),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_cuts_at_chunk_size() {
        let mut b = NewChunkBuilder::new(10).unwrap();
        let p1 = b.push(&[1u8; 7]).unwrap();
        let p2 = b.push(&[2u8; 8]).unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p2.len(), 2);
        assert_eq!(p2[0].id, p1[0].id);
        assert_eq!((p2[0].offset, p2[0].size), (7, 3));
        assert_eq!((p2[1].offset, p2[1].size), (0, 5));
        let chunks = b.finish().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].header.uncompressed_size, 10);
        assert_eq!(chunks[1].header.uncompressed_size, 5);
        assert_eq!(chunks[1].header.id, p2[1].id);
    }

    #[test]
    fn part_map_selects_across_boundaries() {
        let a = ChunkId([1; 16]);
        let b = ChunkId([2; 16]);
        let mut m = PartMap::default();
        m.push(ChunkPart { id: a, offset: 100, size: 10 });
        m.push(ChunkPart { id: b, offset: 0, size: 20 });
        assert_eq!(m.len(), 30);
        let got = m.select(5, 10);
        assert_eq!(
            got,
            vec![
                ChunkPart { id: a, offset: 105, size: 5 },
                ChunkPart { id: b, offset: 0, size: 5 },
            ]
        );
        assert_eq!(m.select(12, 3), vec![ChunkPart { id: b, offset: 2, size: 3 }]);
    }

    #[test]
    fn adjacent_parts_merge() {
        let a = ChunkId([1; 16]);
        let merged = merge_adjacent(vec![
            ChunkPart { id: a, offset: 0, size: 4 },
            ChunkPart { id: a, offset: 4, size: 4 },
            ChunkPart { id: a, offset: 10, size: 1 },
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].size, 8);
    }
}
