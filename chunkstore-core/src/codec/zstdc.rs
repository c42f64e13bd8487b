use super::Decompressor;
use crate::error::{ChunkStoreError, Result};
use std::io::Read;

pub struct ZstdCompressor;

impl ZstdCompressor {
    pub fn compress(&self, src: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(src.len() / 2);
        let mut enc = zstd::stream::Encoder::new(&mut out, level.max(1))?;
        std::io::copy(&mut &src[..], &mut enc)?;
        enc.finish()?;
        Ok(out)
    }
}

impl Decompressor for ZstdCompressor {
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let dec = zstd::stream::Decoder::new(src)?;
        let mut out = Vec::with_capacity(expected_len);
        // Read one byte past the expected size to catch oversized frames.
        dec.take(expected_len as u64 + 1).read_to_end(&mut out)?;
        if out.len() != expected_len {
            return Err(ChunkStoreError::corrupt(
                "zstd payload",
                format!("decoded {} bytes, header says {}", out.len(), expected_len),
            ));
        }
        Ok(out)
    }
}
