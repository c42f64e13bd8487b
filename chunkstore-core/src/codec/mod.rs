use crate::error::Result;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    Store = 0,
    Zstd = 1,
}

impl CodecId {
    /// Payload codec is implied by sizes: a stored length equal to the
    /// uncompressed size means the bytes are raw.
    pub fn for_payload(stored_len: u64, uncompressed_size: u32) -> Self {
        if stored_len == uncompressed_size as u64 {
            CodecId::Store
        } else {
            CodecId::Zstd
        }
    }

    pub fn decompressor(self) -> &'static dyn Decompressor {
        match self {
            CodecId::Store => &store::Store,
            CodecId::Zstd => &zstdc::ZstdCompressor,
        }
    }
}

pub trait Decompressor: Send + Sync {
    /// Decode `src`, failing unless exactly `expected_len` bytes come out.
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

/// Only accept compression if it saves at least this fraction.
pub const DEFAULT_MIN_GAIN: f32 = 0.05;

pub fn should_compress(u: usize, c: usize, min_gain: f32) -> bool {
    // true if (u - c) >= u * min_gain  ⇔  c <= u * (1 - min_gain)
    (u as f64 - c as f64) >= (u as f64 * min_gain as f64)
}

/// Encode a payload for storage, falling back to raw bytes when zstd does
/// not pay for itself. A compressed payload never has the raw length, so
/// the codec can be recovered from sizes alone.
pub fn encode_payload(data: &[u8], min_gain: f32) -> Result<(CodecId, Vec<u8>)> {
    if data.is_empty() {
        return Ok((CodecId::Store, Vec::new()));
    }
    let z = zstdc::ZstdCompressor.compress(data, 3)?;
    if z.len() != data.len() && should_compress(data.len(), z.len(), min_gain) {
        Ok((CodecId::Zstd, z))
    } else {
        Ok((CodecId::Store, data.to_vec()))
    }
}

pub mod store;
pub mod zstdc;
