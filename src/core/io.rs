//! Read-only byte access for archive files
//!
//! The whole file is addressed by absolute byte offset. Offsets are resolved
//! against an immutable backing buffer (a memory map, or an owned buffer for
//! archives built in memory) and every access is bounds-checked, so a bad
//! offset in the index surfaces as an error instead of a panic.

use crate::core::error::{ArchiveError, Result};
use crate::core::header::{le_u32, le_u64, Header, HEADER_SIZE};
use crate::core::varint;
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

enum Backing {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

/// Immutable backing storage of an open archive
pub struct ArchiveSource {
    backing: Backing,
    path: Option<PathBuf>,
}

impl ArchiveSource {
    /// Open an archive file, returning its storage and validated header
    ///
    /// The header is read and checked with a plain read before the file is
    /// mapped, so a file with the wrong magic is rejected without touching
    /// anything past the first 88 bytes.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Header)> {
        let mut file = File::open(&path)?;

        let mut buffer = Vec::with_capacity(HEADER_SIZE);
        (&mut file)
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut buffer)?;
        let header = Header::from_bytes(&buffer)?;

        // SAFETY: the mapping is only ever read; archives are immutable once
        // built and the reader does not guard against concurrent truncation.
        let mmap = unsafe { Mmap::map(&file)? };

        Ok((
            ArchiveSource {
                backing: Backing::Mapped(mmap),
                path: Some(path.as_ref().to_path_buf()),
            },
            header,
        ))
    }

    /// Wrap an in-memory archive image, returning its storage and header
    pub fn from_bytes(bytes: Vec<u8>) -> Result<(Self, Header)> {
        let header = Header::from_bytes(&bytes)?;
        Ok((
            ArchiveSource {
                backing: Backing::Memory(bytes),
                path: None,
            },
            header,
        ))
    }

    /// Whole file contents
    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(mmap) => mmap,
            Backing::Memory(bytes) => bytes,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// File path (None for in-memory archives)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes `[offset, offset + len)`
    pub fn slice(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let bytes = self.bytes();
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= bytes.len() as u64)
            .ok_or_else(|| {
                ArchiveError::corrupt_index(
                    offset,
                    format!("range of {} bytes runs past end of file ({})", len, bytes.len()),
                )
            })?;
        Ok(&bytes[offset as usize..end as usize])
    }

    /// Bytes from `offset` to the end of the file
    pub fn tail(&self, offset: u64) -> Result<&[u8]> {
        let len = self.len().checked_sub(offset).ok_or_else(|| {
            ArchiveError::corrupt_index(offset, "offset past end of file")
        })?;
        self.slice(offset, len)
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        Ok(le_u32(self.slice(offset, 4)?, 0))
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        Ok(le_u64(self.slice(offset, 8)?, 0))
    }

    /// SHA-256 of bytes `[0, end)`
    pub fn digest(&self, end: u64) -> Result<[u8; 32]> {
        let data = self.slice(0, end)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(data));
        Ok(out)
    }
}

/// Forward-only reader over one record
///
/// Tracks the absolute file offset so decode errors can say where they
/// happened.
pub struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8], base: u64) -> Self {
        RecordReader { buf, pos: 0, base }
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < len {
            return Err(ArchiveError::corrupt_index(
                self.offset(),
                format!("record truncated: wanted {} bytes", len),
            ));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(le_u32(self.bytes(4)?, 0))
    }

    pub fn varint(&mut self) -> Result<u64> {
        let at = self.offset();
        let (value, used) =
            varint::decode(self.remaining()).map_err(|e| ArchiveError::varint(at, e))?;
        self.pos += used;
        Ok(value)
    }

    pub fn varint_u32(&mut self) -> Result<u32> {
        let at = self.offset();
        let (value, used) =
            varint::decode_u32(self.remaining()).map_err(|e| ArchiveError::varint(at, e))?;
        self.pos += used;
        Ok(value)
    }

    /// Varint length prefix followed by that many bytes
    pub fn prefixed(&mut self) -> Result<&'a [u8]> {
        let at = self.offset();
        let len = self.varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ArchiveError::corrupt_index(at, "length prefix too large"))?;
        self.bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn header_image(extra: &[u8]) -> Vec<u8> {
        let mut bytes = Header::new().to_bytes();
        bytes.extend_from_slice(extra);
        bytes
    }

    #[test]
    fn test_open_from_disk() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&header_image(b"payload")).unwrap();
        temp.flush().unwrap();

        let (source, header) = ArchiveSource::open(temp.path()).unwrap();
        assert_eq!(header, Header::new());
        assert_eq!(source.len(), HEADER_SIZE as u64 + 7);
        assert_eq!(source.slice(HEADER_SIZE as u64, 7).unwrap(), b"payload");
        assert_eq!(source.path(), Some(temp.path()));
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let mut image = header_image(b"");
        image[..4].copy_from_slice(b"NOPE");
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&image).unwrap();
        temp.flush().unwrap();

        assert!(matches!(
            ArchiveSource::open(temp.path()),
            Err(ArchiveError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ArchiveSource::open(dir.path().join("missing.zim")),
            Err(ArchiveError::Io(_))
        ));
    }

    #[test]
    fn test_slice_bounds() {
        let (source, _) = ArchiveSource::from_bytes(header_image(b"abc")).unwrap();
        assert!(source.slice(HEADER_SIZE as u64, 3).is_ok());
        assert!(source.slice(HEADER_SIZE as u64, 4).is_err());
        assert!(source.slice(u64::MAX, 2).is_err());
        assert_eq!(source.tail(HEADER_SIZE as u64 + 1).unwrap(), b"bc");
        assert!(source.tail(source.len() + 1).is_err());
    }

    #[test]
    fn test_record_reader() {
        let mut buf = vec![b'A'];
        buf.extend_from_slice(&0x1234u16.to_le_bytes());
        varint::encode(300, &mut buf);
        varint::encode(3, &mut buf);
        buf.extend_from_slice(b"Cat");

        let mut reader = RecordReader::new(&buf, 1000);
        assert_eq!(reader.u8().unwrap(), b'A');
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.varint().unwrap(), 300);
        assert_eq!(reader.prefixed().unwrap(), b"Cat");
        assert_eq!(reader.consumed(), buf.len());
        assert_eq!(reader.offset(), 1000 + buf.len() as u64);
    }

    #[test]
    fn test_record_reader_reports_offset() {
        let buf = [0x80u8];
        let mut reader = RecordReader::new(&buf, 500);
        match reader.varint() {
            Err(ArchiveError::CorruptIndex { offset, .. }) => assert_eq!(offset, 500),
            other => panic!("unexpected {:?}", other),
        }
    }
}
