//! Chunk package container.
//!
//! ```text
//! u32 format_version (> 0)
//! u32 content_count
//! content_count x ChunkLocation
//! at each byte_start: ChunkHeader, then byte_size payload bytes
//! ```

use std::io::{Read, Seek, SeekFrom, Write};

use crate::container::chunk::{self, ChunkFile, ChunkHeader};
use crate::container::chunktab::{ChunkLocation, ENTRY_SIZE, read_table, write_table};
use crate::domain::ChunkId;
use crate::error::{ChunkStoreError, Result};

pub const FORMAT_VERSION: u32 = 1;
pub const FIXED_HEADER_LEN: u64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPackage {
    pub format_version: u32,
    pub contents: Vec<ChunkLocation>,
}

/// Read the u32 at offset 0 and put the cursor back where it was.
pub fn peek_format_version<R: Read + Seek>(r: &mut R) -> Result<u32> {
    let pos = r.stream_position()?;
    r.seek(SeekFrom::Start(0))?;
    let mut b = [0u8; 4];
    let res = r.read_exact(&mut b);
    r.seek(SeekFrom::Start(pos))?;
    match res {
        Ok(()) => Ok(u32::from_le_bytes(b)),
        // Too short to be a package; the caller falls back to manifest parsing.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
        Err(e) => Err(e.into()),
    }
}

impl ChunkPackage {
    /// Lay out a package for chunks with the given stored payload sizes.
    pub fn plan(entries: &[(ChunkId, u64)]) -> Self {
        let mut cursor = Self::header_len_for(entries.len());
        let contents = entries
            .iter()
            .map(|&(id, size)| {
                let loc = ChunkLocation {
                    id,
                    byte_start: cursor,
                    byte_size: size,
                };
                cursor += chunk::HEADER_LEN + size;
                loc
            })
            .collect();
        Self {
            format_version: FORMAT_VERSION,
            contents,
        }
    }

    pub fn header_len_for(count: usize) -> u64 {
        FIXED_HEADER_LEN + (count * ENTRY_SIZE) as u64
    }

    pub fn header_len(&self) -> u64 {
        Self::header_len_for(self.contents.len())
    }

    /// Total file length once every planned chunk is written.
    pub fn file_len(&self) -> u64 {
        self.contents
            .last()
            .map(|l| l.byte_start + chunk::HEADER_LEN + l.byte_size)
            .unwrap_or_else(|| self.header_len())
    }

    pub fn payload_bytes(&self) -> u64 {
        self.contents.iter().map(|l| l.byte_size).sum()
    }

    pub fn write_header(&self, mut w: impl Write) -> Result<()> {
        let count = u32::try_from(self.contents.len())
            .map_err(|_| ChunkStoreError::Argument("too many chunks for one package".into()))?;
        w.write_all(&self.format_version.to_le_bytes())?;
        w.write_all(&count.to_le_bytes())?;
        write_table(&mut w, &self.contents)
    }

    /// Parse the header table. The table may not claim more bytes than the file holds.
    pub fn read_header<R: Read + Seek>(r: &mut R, file_len: u64) -> Result<Self> {
        r.seek(SeekFrom::Start(0))?;
        if file_len < FIXED_HEADER_LEN {
            return Err(ChunkStoreError::truncated(
                "package header",
                FIXED_HEADER_LEN,
                file_len,
            ));
        }
        let mut fixed = [0u8; FIXED_HEADER_LEN as usize];
        r.read_exact(&mut fixed)?;
        let format_version = u32::from_le_bytes([fixed[0], fixed[1], fixed[2], fixed[3]]);
        let count = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]) as u64;
        if format_version == 0 {
            return Err(ChunkStoreError::corrupt(
                "package header",
                "format version 0 marks a manifest",
            ));
        }

        let table_len = count * ENTRY_SIZE as u64;
        if FIXED_HEADER_LEN + table_len > file_len {
            return Err(ChunkStoreError::truncated(
                "package contents table",
                FIXED_HEADER_LEN + table_len,
                file_len,
            ));
        }
        let mut tbytes = vec![0u8; table_len as usize];
        r.read_exact(&mut tbytes)?;
        let contents = read_table(&mut &tbytes[..], count)?;
        Ok(Self {
            format_version,
            contents,
        })
    }

    /// Seek to a location and parse the chunk header stored there.
    pub fn read_chunk_header<R: Read + Seek>(
        r: &mut R,
        loc: &ChunkLocation,
        file_len: u64,
    ) -> Result<ChunkHeader> {
        let end = loc
            .byte_start
            .checked_add(chunk::HEADER_LEN)
            .and_then(|x| x.checked_add(loc.byte_size))
            .ok_or_else(|| ChunkStoreError::corrupt("chunk location", "offset overflow"))?;
        if end > file_len {
            return Err(ChunkStoreError::truncated(
                format!("chunk {} in package", loc.id),
                end,
                file_len,
            ));
        }
        r.seek(SeekFrom::Start(loc.byte_start))?;
        Ok(ChunkHeader::read_from(&mut *r)?)
    }

    /// Read the header and stored payload for one location.
    pub fn read_chunk<R: Read + Seek>(
        r: &mut R,
        loc: &ChunkLocation,
        file_len: u64,
    ) -> Result<ChunkFile> {
        let header = Self::read_chunk_header(r, loc, file_len)?;
        let mut payload = vec![0u8; loc.byte_size as usize];
        r.read_exact(&mut payload)?;
        Ok(ChunkFile { header, payload })
    }
}

/// Streams chunks into a package whose layout was fixed up front by
/// [`ChunkPackage::plan`].
pub struct PackageWriter<W: Write> {
    w: W,
    package: ChunkPackage,
    next: usize,
    written: u64,
}

impl<W: Write> PackageWriter<W> {
    pub fn begin(mut w: W, package: ChunkPackage) -> Result<Self> {
        package.write_header(&mut w)?;
        let written = package.header_len();
        Ok(Self {
            w,
            package,
            next: 0,
            written,
        })
    }

    pub fn append(&mut self, chunk: &ChunkFile) -> Result<()> {
        let loc = self.package.contents.get(self.next).ok_or_else(|| {
            ChunkStoreError::Argument(format!("chunk {} was not planned", chunk.header.id))
        })?;
        if loc.id != chunk.header.id || loc.byte_size != chunk.payload.len() as u64 {
            return Err(ChunkStoreError::Argument(format!(
                "chunk {} ({} bytes) does not match planned {} ({} bytes)",
                chunk.header.id,
                chunk.payload.len(),
                loc.id,
                loc.byte_size
            )));
        }
        debug_assert_eq!(loc.byte_start, self.written);
        chunk.header.write_to(&mut self.w)?;
        self.w.write_all(&chunk.payload)?;
        self.written += chunk::HEADER_LEN + loc.byte_size;
        self.next += 1;
        Ok(())
    }

    /// Flush and hand back the layout together with the sink.
    pub fn finish(mut self) -> Result<(ChunkPackage, W)> {
        if self.next != self.package.contents.len() {
            return Err(ChunkStoreError::Argument(format!(
                "package closed after {} of {} chunks",
                self.next,
                self.package.contents.len()
            )));
        }
        self.w.flush()?;
        Ok((self.package, self.w))
    }
}
