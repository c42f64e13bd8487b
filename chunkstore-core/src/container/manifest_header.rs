use std::io::{Read, Write};

use crate::error::{ChunkStoreError, Result};

/// Leading word. Zero tells format sniffers this is not a chunk package.
pub const NOT_A_PACKAGE: u32 = 0;
pub const MAGIC: &[u8; 8] = b"CSMANFST";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: u64 = 4 + 8 + 2 + 2 + 8 + 32;

#[derive(Debug, Clone, Copy)]
pub struct ManifestHeader {
    pub version: u16,
    pub flags: u16,
    /// Byte length of the CBOR body that follows the header
    pub body_len: u64,
    pub body_blake3: [u8; 32],
}

impl ManifestHeader {
    pub fn for_body(body: &[u8]) -> Self {
        Self {
            version: VERSION,
            flags: 0,
            body_len: body.len() as u64,
            body_blake3: *blake3::hash(body).as_bytes(),
        }
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        w.write_all(&NOT_A_PACKAGE.to_le_bytes())?;
        w.write_all(MAGIC)?;
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&self.body_len.to_le_bytes())?;
        w.write_all(&self.body_blake3)?;
        Ok(())
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if (bytes.len() as u64) < HEADER_LEN {
            return Err(ChunkStoreError::truncated(
                "manifest header",
                HEADER_LEN,
                bytes.len() as u64,
            ));
        }
        let mut r = bytes;
        let mut lead = [0u8; 4];
        r.read_exact(&mut lead)?;
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if u32::from_le_bytes(lead) != NOT_A_PACKAGE || &magic != MAGIC {
            return Err(ChunkStoreError::corrupt("manifest header", "bad magic"));
        }
        let mut v = [0u8; 2];
        r.read_exact(&mut v)?;
        let version = u16::from_le_bytes(v);
        if version == 0 || version > VERSION {
            return Err(ChunkStoreError::corrupt(
                "manifest header",
                format!("unsupported version {version}"),
            ));
        }
        r.read_exact(&mut v)?;
        let flags = u16::from_le_bytes(v);
        let mut bl = [0u8; 8];
        r.read_exact(&mut bl)?;
        let body_len = u64::from_le_bytes(bl);
        let mut body_blake3 = [0u8; 32];
        r.read_exact(&mut body_blake3)?;
        Ok(Self {
            version,
            flags,
            body_len,
            body_blake3,
        })
    }

    /// Slice out the body and check it against the stored checksum.
    pub fn body<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        let available = bytes.len() as u64 - HEADER_LEN;
        if self.body_len > available {
            return Err(ChunkStoreError::truncated(
                "manifest body",
                self.body_len,
                available,
            ));
        }
        let start = HEADER_LEN as usize;
        let body = &bytes[start..start + self.body_len as usize];
        if blake3::hash(body).as_bytes() != &self.body_blake3 {
            return Err(ChunkStoreError::corrupt("manifest body", "checksum mismatch"));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_word_is_zero() {
        let mut buf = Vec::new();
        ManifestHeader::for_body(b"body").write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_LEN);
        assert_eq!(&buf[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn short_body_is_truncated() {
        let mut buf = Vec::new();
        ManifestHeader::for_body(b"0123456789").write_to(&mut buf).unwrap();
        buf.extend_from_slice(b"01234");
        let h = ManifestHeader::read_from(&buf).unwrap();
        assert!(matches!(h.body(&buf), Err(ChunkStoreError::Truncated { .. })));
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        let mut buf = Vec::new();
        ManifestHeader::for_body(b"").write_to(&mut buf).unwrap();
        buf[5] = b'X';
        assert!(matches!(
            ManifestHeader::read_from(&buf),
            Err(ChunkStoreError::Corrupt { .. })
        ));
    }
}
