use crate::core::error::{ArchiveError, Result};

/// "ZIM\x04" read as a little-endian u32
pub const MAGIC: u32 = 0x044D_495A;
pub const VERSION_MAJOR: u16 = 6;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_SIZE: usize = 88;

/// Length of the trailing SHA-256 digest
pub const CHECKSUM_LEN: u64 = 32;

/// Marker for an unset main/layout page
pub const NO_PAGE: u32 = u32::MAX;

/// Archive header
///
/// Fixed 88-byte block at offset 0. Besides counts it carries the positions
/// of every table the reader needs: the dirent records, the two pointer
/// tables, the cluster pointers, the MIME list and the trailing checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: 0x044D495A
    pub magic: u32,

    /// Format version (major)
    pub version_major: u16,

    /// Format version (minor)
    pub version_minor: u16,

    /// Archive identity
    pub uuid: [u8; 16],

    /// Number of directory entries
    pub entry_count: u32,

    /// Number of clusters
    pub cluster_count: u32,

    /// Start of the dirent records
    pub dirent_pos: u64,

    /// Position-ordered table of u64 dirent offsets
    pub url_ptr_pos: u64,

    /// Title-ordered table of u32 dirent positions
    pub title_ptr_pos: u64,

    /// Table of u64 cluster offsets
    pub cluster_ptr_pos: u64,

    /// NUL-separated MIME type strings
    pub mime_list_pos: u64,

    /// Offset of the SHA-256 digest, or 0 when absent
    pub checksum_pos: u64,

    /// Dirent position of the main page, or [`NO_PAGE`]
    pub main_page: u32,

    /// Dirent position of the layout page, or [`NO_PAGE`]
    pub layout_page: u32,
}

impl Header {
    /// Create a header for an empty archive
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            uuid: [0; 16],
            entry_count: 0,
            cluster_count: 0,
            dirent_pos: HEADER_SIZE as u64,
            url_ptr_pos: HEADER_SIZE as u64,
            title_ptr_pos: HEADER_SIZE as u64,
            cluster_ptr_pos: HEADER_SIZE as u64,
            mime_list_pos: HEADER_SIZE as u64,
            checksum_pos: 0,
            main_page: NO_PAGE,
            layout_page: NO_PAGE,
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ArchiveError::InvalidFormat(format!(
                "invalid magic number {:#010x} (expected {:#010x})",
                self.magic, MAGIC
            )));
        }

        if self.version_major != VERSION_MAJOR {
            return Err(ArchiveError::InvalidFormat(format!(
                "unsupported format version {}.{}",
                self.version_major, self.version_minor
            )));
        }

        Ok(())
    }

    /// Check that every table the header points at lies inside a file of
    /// `file_len` bytes
    pub fn validate_layout(&self, file_len: u64) -> Result<()> {
        let entries = u64::from(self.entry_count);
        let clusters = u64::from(self.cluster_count);

        check_table("URL pointer", self.url_ptr_pos, entries, 8, file_len)?;
        check_table("title pointer", self.title_ptr_pos, entries, 4, file_len)?;
        check_table("cluster pointer", self.cluster_ptr_pos, clusters, 8, file_len)?;

        if self.mime_list_pos < HEADER_SIZE as u64 || self.mime_list_pos >= file_len {
            return Err(ArchiveError::InvalidFormat(format!(
                "MIME list position {} outside file of {} bytes",
                self.mime_list_pos, file_len
            )));
        }

        if self.dirent_pos < HEADER_SIZE as u64 || self.dirent_pos > file_len {
            return Err(ArchiveError::InvalidFormat(format!(
                "dirent table position {} outside file of {} bytes",
                self.dirent_pos, file_len
            )));
        }

        if self.has_checksum() {
            let end = self.checksum_pos.checked_add(CHECKSUM_LEN);
            if self.checksum_pos < HEADER_SIZE as u64 || end != Some(file_len) {
                return Err(ArchiveError::InvalidFormat(format!(
                    "checksum position {} does not end the file ({} bytes)",
                    self.checksum_pos, file_len
                )));
            }
        }

        for (name, page) in [("main", self.main_page), ("layout", self.layout_page)] {
            if page != NO_PAGE && page >= self.entry_count {
                return Err(ArchiveError::InvalidFormat(format!(
                    "{} page {} out of range ({} entries)",
                    name, page, self.entry_count
                )));
            }
        }

        Ok(())
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum_pos != 0
    }

    pub fn main_page(&self) -> Option<u32> {
        (self.main_page != NO_PAGE).then_some(self.main_page)
    }

    pub fn layout_page(&self) -> Option<u32> {
        (self.layout_page != NO_PAGE).then_some(self.layout_page)
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);

        bytes.extend_from_slice(&self.magic.to_le_bytes());
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.uuid);
        bytes.extend_from_slice(&self.entry_count.to_le_bytes());
        bytes.extend_from_slice(&self.cluster_count.to_le_bytes());
        bytes.extend_from_slice(&self.dirent_pos.to_le_bytes());
        bytes.extend_from_slice(&self.url_ptr_pos.to_le_bytes());
        bytes.extend_from_slice(&self.title_ptr_pos.to_le_bytes());
        bytes.extend_from_slice(&self.cluster_ptr_pos.to_le_bytes());
        bytes.extend_from_slice(&self.mime_list_pos.to_le_bytes());
        bytes.extend_from_slice(&self.checksum_pos.to_le_bytes());
        bytes.extend_from_slice(&self.main_page.to_le_bytes());
        bytes.extend_from_slice(&self.layout_page.to_le_bytes());

        bytes
    }

    /// Deserialize header from bytes
    ///
    /// Rejects a bad magic number or version before looking at anything else.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArchiveError::InvalidFormat(format!(
                "file too short for header ({} of {} bytes)",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&bytes[8..24]);

        let header = Header {
            magic: le_u32(bytes, 0),
            version_major: le_u16(bytes, 4),
            version_minor: le_u16(bytes, 6),
            uuid,
            entry_count: le_u32(bytes, 24),
            cluster_count: le_u32(bytes, 28),
            dirent_pos: le_u64(bytes, 32),
            url_ptr_pos: le_u64(bytes, 40),
            title_ptr_pos: le_u64(bytes, 48),
            cluster_ptr_pos: le_u64(bytes, 56),
            mime_list_pos: le_u64(bytes, 64),
            checksum_pos: le_u64(bytes, 72),
            main_page: le_u32(bytes, 80),
            layout_page: le_u32(bytes, 84),
        };

        header.validate()?;

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

fn check_table(name: &str, pos: u64, count: u64, width: u64, file_len: u64) -> Result<()> {
    let end = count
        .checked_mul(width)
        .and_then(|size| pos.checked_add(size));

    match end {
        Some(end) if pos >= HEADER_SIZE as u64 && end <= file_len => Ok(()),
        _ => Err(ArchiveError::InvalidFormat(format!(
            "{} table at {} ({} x {} bytes) exceeds file of {} bytes",
            name, pos, count, width, file_len
        ))),
    }
}

pub(crate) fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn le_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes([
        bytes[at],
        bytes[at + 1],
        bytes[at + 2],
        bytes[at + 3],
        bytes[at + 4],
        bytes[at + 5],
        bytes[at + 6],
        bytes[at + 7],
    ])
}
