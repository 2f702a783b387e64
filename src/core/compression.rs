//! Cluster compression codecs
//!
//! Every cluster starts with a one-byte tag naming the codec its body was
//! compressed with. Reading is the only direction the archive needs; the
//! compress side exists for [`crate::core::builder::ArchiveBuilder`].
//!
//! **Design**:
//! - One [`Decompressor`] per tag, selected through [`decompressor_for`]
//! - Unknown tags are refused with [`CodecError::Unsupported`], never a panic
//! - Output is bounded: a stream that inflates past `max_size` is corrupt

use std::io::{Read, Write};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported compression tag {0}")]
    Unsupported(u8),

    #[error("{0}")]
    Corrupt(String),
}

/// Compression tag stored in the first byte of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Compression {
    /// Legacy "default" tag, stored uncompressed
    Default = 0,
    /// No compression
    None = 1,
    /// zlib-wrapped deflate
    Zip = 2,
    /// bzip2
    Bzip2 = 3,
    /// LZMA in an xz container
    Lzma = 4,
    /// Zstandard
    Zstd = 5,
}

impl Compression {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Compression::Default),
            1 => Some(Compression::None),
            2 => Some(Compression::Zip),
            3 => Some(Compression::Bzip2),
            4 => Some(Compression::Lzma),
            5 => Some(Compression::Zstd),
            _ => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Compression::Default | Compression::None)
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::Default | Compression::None => "none",
            Compression::Zip => "zip",
            Compression::Bzip2 => "bzip2",
            Compression::Lzma => "lzma",
            Compression::Zstd => "zstd",
        }
    }
}

/// Decoder for one cluster compression tag
pub trait Decompressor: Send + Sync {
    /// Decode `input`, failing if the output would exceed `max_size` bytes
    fn decompress(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError>;
}

pub struct Identity;
pub struct ZipCodec;
pub struct Bzip2Codec;
pub struct LzmaCodec;
pub struct ZstdCodec;

impl Decompressor for Identity {
    fn decompress(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        if input.len() > max_size {
            return Err(oversized(max_size));
        }
        Ok(input.to_vec())
    }
}

impl Decompressor for ZipCodec {
    fn decompress(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        read_bounded(flate2::read::ZlibDecoder::new(input), max_size, "zlib")
    }
}

impl Decompressor for Bzip2Codec {
    fn decompress(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        read_bounded(bzip2::read::BzDecoder::new(input), max_size, "bzip2")
    }
}

impl Decompressor for LzmaCodec {
    fn decompress(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        read_bounded(xz2::read::XzDecoder::new(input), max_size, "lzma")
    }
}

impl Decompressor for ZstdCodec {
    fn decompress(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        let decoder = zstd::stream::read::Decoder::new(input)
            .map_err(|e| CodecError::Corrupt(format!("zstd decompression failed: {}", e)))?;
        read_bounded(decoder, max_size, "zstd")
    }
}

/// Look up the decoder for a raw tag byte, along with the parsed tag
pub fn decompressor_for(tag: u8) -> Result<(Compression, &'static dyn Decompressor), CodecError> {
    let method = Compression::from_u8(tag).ok_or(CodecError::Unsupported(tag))?;
    let codec: &'static dyn Decompressor = match method {
        Compression::Default | Compression::None => &Identity,
        Compression::Zip => &ZipCodec,
        Compression::Bzip2 => &Bzip2Codec,
        Compression::Lzma => &LzmaCodec,
        Compression::Zstd => &ZstdCodec,
    };
    Ok((method, codec))
}

/// Decompress data compressed with the codec named by `tag`
pub fn decompress(tag: u8, data: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
    let (_, codec) = decompressor_for(tag)?;
    codec.decompress(data, max_size)
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: Compression) -> Result<Vec<u8>, CodecError> {
    let failed = |e: std::io::Error| {
        CodecError::Corrupt(format!("{} compression failed: {}", method.name(), e))
    };

    match method {
        Compression::Default | Compression::None => Ok(data.to_vec()),
        Compression::Zip => {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).map_err(failed)?;
            encoder.finish().map_err(failed)
        }
        Compression::Bzip2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data).map_err(failed)?;
            encoder.finish().map_err(failed)
        }
        Compression::Lzma => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data).map_err(failed)?;
            encoder.finish().map_err(failed)
        }
        Compression::Zstd => zstd::bulk::compress(data, 3).map_err(failed),
    }
}

fn read_bounded<R: Read>(reader: R, max_size: usize, codec: &str) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    reader
        .take(max_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Corrupt(format!("{} decompression failed: {}", codec, e)))?;

    if out.len() > max_size {
        return Err(oversized(max_size));
    }

    Ok(out)
}

fn oversized(max_size: usize) -> CodecError {
    CodecError::Corrupt(format!("decompressed size exceeds limit of {} bytes", max_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1 << 20;

    fn round_trip(method: Compression) {
        let data = b"Cluster payload with some repetition. ".repeat(64);
        let compressed = compress(&data, method).unwrap();
        let decompressed = decompress(method as u8, &compressed, LIMIT).unwrap();

        assert_eq!(data, decompressed);
        if method.is_compressed() {
            assert!(compressed.len() < data.len(), "{} did not shrink", method.name());
        }
    }

    #[test]
    fn test_compression_tag_conversion() {
        assert_eq!(Compression::from_u8(0), Some(Compression::Default));
        assert_eq!(Compression::from_u8(2), Some(Compression::Zip));
        assert_eq!(Compression::from_u8(5), Some(Compression::Zstd));
        assert_eq!(Compression::from_u8(99), None);
    }

    #[test]
    fn test_identity() {
        round_trip(Compression::None);
        round_trip(Compression::Default);
    }

    #[test]
    fn test_zip() {
        round_trip(Compression::Zip);
    }

    #[test]
    fn test_bzip2() {
        round_trip(Compression::Bzip2);
    }

    #[test]
    fn test_lzma() {
        round_trip(Compression::Lzma);
    }

    #[test]
    fn test_zstd() {
        round_trip(Compression::Zstd);
    }

    #[test]
    fn test_unknown_tag_refused() {
        assert_eq!(
            decompress(42, b"whatever", LIMIT).unwrap_err(),
            CodecError::Unsupported(42)
        );
    }

    #[test]
    fn test_decompressor_for_reports_method() {
        for method in [
            Compression::Default,
            Compression::None,
            Compression::Zip,
            Compression::Bzip2,
            Compression::Lzma,
            Compression::Zstd,
        ] {
            let (parsed, _) = decompressor_for(method as u8).unwrap();
            assert_eq!(parsed, method);
        }
        assert!(matches!(
            decompressor_for(7),
            Err(CodecError::Unsupported(7))
        ));
    }

    #[test]
    fn test_garbage_stream_is_corrupt() {
        for tag in [2u8, 3, 4, 5] {
            let err = decompress(tag, b"definitely not compressed", LIMIT).unwrap_err();
            assert!(matches!(err, CodecError::Corrupt(_)), "tag {}", tag);
        }
    }

    #[test]
    fn test_output_bound_enforced() {
        let data = vec![0u8; 4096];
        for method in [Compression::None, Compression::Zip, Compression::Zstd] {
            let compressed = compress(&data, method).unwrap();
            let err = decompress(method as u8, &compressed, 1024).unwrap_err();
            assert!(matches!(err, CodecError::Corrupt(_)), "{}", method.name());
        }
    }
}
