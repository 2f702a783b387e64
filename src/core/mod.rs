//! Archive reader internals
//!
//! Leaf-first: [`varint`] and [`compression`] decode raw bytes,
//! [`cluster`] and [`index`] decode the two halves of the file, and
//! [`archive`] ties them together behind one read-only handle.

pub mod archive;
pub mod builder;
pub mod cache;
pub mod cluster;
pub mod compression;
pub mod config;
pub mod dirent;
pub mod error;
pub mod header;
pub mod index;
pub mod io;
pub mod search;
pub mod varint;


pub use archive::{Archive, ArchiveInfo, Entries, NamespaceInfo};
pub use builder::ArchiveBuilder;
pub use cluster::{Blob, Cluster, ClusterStore};
pub use index::DirentIndex;
pub use search::{ArticleSearch, SearchReport, SkippedEntry};
