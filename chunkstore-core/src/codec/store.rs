use super::Decompressor;
use crate::error::{ChunkStoreError, Result};

pub struct Store;

impl Decompressor for Store {
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if src.len() != expected_len {
            return Err(ChunkStoreError::corrupt(
                "raw payload",
                format!("length {} != {}", src.len(), expected_len),
            ));
        }
        Ok(src.to_vec())
    }
}
