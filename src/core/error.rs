use thiserror::Error;

use crate::core::compression::CodecError;
use crate::core::varint::VarIntError;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Corrupt index at offset {offset}: {reason}")]
    CorruptIndex { offset: u64, reason: String },

    #[error("{what} index {index} out of range (count is {len})")]
    OutOfRange {
        what: &'static str,
        index: u64,
        len: u64,
    },

    #[error("No entry {namespace}/{key}")]
    NotFound { namespace: char, key: String },

    #[error("Cluster {cluster} uses unsupported compression tag {tag}")]
    UnsupportedCodec { cluster: u32, tag: u8 },

    #[error("Cluster {cluster} is corrupt: {reason}")]
    CorruptStream { cluster: u32, reason: String },

    #[error("Broken redirect at entry {position}: {reason}")]
    BrokenRedirect { position: u32, reason: String },

    #[error("Archive checksum verification failed")]
    ChecksumMismatch,

    #[error("Unknown MIME type index {0}")]
    UnknownMimeType(u16),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ArchiveError {
    pub(crate) fn corrupt_index(offset: u64, reason: impl Into<String>) -> Self {
        ArchiveError::CorruptIndex {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn varint(offset: u64, err: VarIntError) -> Self {
        ArchiveError::CorruptIndex {
            offset,
            reason: err.to_string(),
        }
    }

    pub(crate) fn codec(cluster: u32, err: CodecError) -> Self {
        match err {
            CodecError::Unsupported(tag) => ArchiveError::UnsupportedCodec { cluster, tag },
            CodecError::Corrupt(reason) => ArchiveError::CorruptStream { cluster, reason },
        }
    }

    /// True when the error concerns a single record or cluster rather than the
    /// archive as a whole; scans skip these and keep going.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            ArchiveError::CorruptIndex { .. }
                | ArchiveError::UnsupportedCodec { .. }
                | ArchiveError::CorruptStream { .. }
                | ArchiveError::BrokenRedirect { .. }
                | ArchiveError::UnknownMimeType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
