//! # zimfile-rs - Reader for Compressed, Indexed Article Archives
//!
//! `zimfile-rs` opens ZIM-style archives: a single immutable file packing
//! many named articles into compressed clusters, with a sorted directory so
//! any article can be found without decompressing the rest.
//!
//! - **Lazy decoding**: dirents and clusters are decoded on first touch
//! - **Pluggable codecs**: none, zlib, bzip2, xz/lzma and zstd clusters
//! - **Shared caches**: byte-bounded cluster cache and dirent LRU, safe to
//!   use from many threads at once
//! - **Integrity**: optional trailing SHA-256 checked at open
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zimfile_rs::{Archive, ArticleSearch, Result};
//!
//! # fn main() -> Result<()> {
//! let archive = Archive::open("wikipedia_en_simple.zim")?;
//!
//! // Title lookup (binary search over the title table)
//! let cat = archive.lookup('A', "Cat")?;
//! let html = archive.content(&cat)?;
//! println!("{} bytes of {}", html.len(), cat.title());
//!
//! // Linear substring search over titles
//! for dirent in ArticleSearch::new(&archive).search("Cat")? {
//!     println!("{}", dirent.long_url());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use zimfile_rs::{Archive, ReaderConfig, Result};
//!
//! # fn main() -> Result<()> {
//! let config = ReaderConfig::default()
//!     .with_cluster_cache_bytes(64 << 20)
//!     .with_verify_checksum(false);
//! let archive = Archive::open_with_config("archive.zim", &config)?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    archive::{Archive, ArchiveInfo, Entries, NamespaceInfo},
    builder::ArchiveBuilder,
    cache::CacheStats,
    cluster::Blob,
    compression::Compression,
    config::{ConfigProvider, EnvConfig, MapConfig, ReaderConfig},
    dirent::{Dirent, DirentKind},
    error::{ArchiveError, Result},
    header::Header,
    search::{ArticleSearch, SearchReport, SkippedEntry},
    varint::VarIntError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
