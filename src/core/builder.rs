//! Archive builder
//!
//! Assembles a complete archive image from articles and redirects. Used to
//! produce fixtures and small archives from tooling; an archive is never
//! modified after it is built.
//!
//! # Examples
//!
//! ```rust
//! use zimfile_rs::{Archive, ArchiveBuilder, Compression};
//!
//! # fn main() -> zimfile_rs::Result<()> {
//! let bytes = ArchiveBuilder::new()
//!     .compression(Compression::Zstd)
//!     .add_article('A', "Cat", "Cat", "text/html", b"<p>meow</p>".to_vec())
//!     .add_redirect('A', "Kitty", "", 'A', "Cat")
//!     .build()?;
//!
//! let archive = Archive::from_bytes(bytes)?;
//! let kitty = archive.lookup_url('A', "Kitty")?;
//! assert_eq!(&*archive.content(&kitty)?, b"<p>meow</p>");
//! # Ok(())
//! # }
//! ```

use crate::core::cluster::Cluster;
use crate::core::compression::{self, Compression};
use crate::core::dirent::{Dirent, REDIRECT_MIME};
use crate::core::error::{ArchiveError, Result};
use crate::core::header::{Header, HEADER_SIZE};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

enum Payload {
    Article { mime: String, data: Vec<u8> },
    Redirect { namespace: char, url: String },
}

struct Pending {
    namespace: char,
    url: String,
    title: String,
    parameter: Vec<u8>,
    payload: Payload,
}

/// Builder for archive images
pub struct ArchiveBuilder {
    entries: Vec<Pending>,
    compression: Compression,
    blobs_per_cluster: usize,
    main_page: Option<(char, String)>,
    layout_page: Option<(char, String)>,
    uuid: Option<[u8; 16]>,
    checksum: bool,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        ArchiveBuilder {
            entries: Vec::new(),
            compression: Compression::Zip,
            blobs_per_cluster: 16,
            main_page: None,
            layout_page: None,
            uuid: None,
            checksum: true,
        }
    }

    /// Add an article. An empty title means "same as the URL".
    pub fn add_article(
        mut self,
        namespace: char,
        url: impl Into<String>,
        title: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.entries.push(Pending {
            namespace,
            url: url.into(),
            title: title.into(),
            parameter: Vec::new(),
            payload: Payload::Article {
                mime: mime.into(),
                data,
            },
        });
        self
    }

    /// Add a redirect to the entry `target_namespace/target_url`
    pub fn add_redirect(
        mut self,
        namespace: char,
        url: impl Into<String>,
        title: impl Into<String>,
        target_namespace: char,
        target_url: impl Into<String>,
    ) -> Self {
        self.entries.push(Pending {
            namespace,
            url: url.into(),
            title: title.into(),
            parameter: Vec::new(),
            payload: Payload::Redirect {
                namespace: target_namespace,
                url: target_url.into(),
            },
        });
        self
    }

    /// Attach parameter bytes to the most recently added entry
    pub fn parameter(mut self, parameter: Vec<u8>) -> Self {
        if let Some(last) = self.entries.last_mut() {
            last.parameter = parameter;
        }
        self
    }

    /// Codec for every cluster
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Articles packed into each cluster (at least one)
    pub fn blobs_per_cluster(mut self, count: usize) -> Self {
        self.blobs_per_cluster = count.max(1);
        self
    }

    pub fn main_page(mut self, namespace: char, url: impl Into<String>) -> Self {
        self.main_page = Some((namespace, url.into()));
        self
    }

    pub fn layout_page(mut self, namespace: char, url: impl Into<String>) -> Self {
        self.layout_page = Some((namespace, url.into()));
        self
    }

    /// Fixed archive UUID (random by default)
    pub fn uuid(mut self, uuid: [u8; 16]) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Append a SHA-256 checksum (on by default)
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    /// Build the archive image
    pub fn build(self) -> Result<Vec<u8>> {
        let mut entries = self.entries;
        for entry in &entries {
            if !entry.namespace.is_ascii() {
                return Err(ArchiveError::InvalidInput(format!(
                    "namespace {:?} is not a single ASCII character",
                    entry.namespace
                )));
            }
        }

        // Position order: (namespace, url)
        entries.sort_by(|a, b| (a.namespace, &a.url).cmp(&(b.namespace, &b.url)));
        if entries.len() > u32::MAX as usize {
            return Err(ArchiveError::InvalidInput("too many entries".into()));
        }

        let mut positions = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let key = (entry.namespace, entry.url.as_str());
            if positions.insert(key, position as u32).is_some() {
                return Err(ArchiveError::InvalidInput(format!(
                    "duplicate entry {}/{}",
                    entry.namespace, entry.url
                )));
            }
        }
        let locate = |namespace: char, url: &str, what: &str| {
            positions.get(&(namespace, url)).copied().ok_or_else(|| {
                ArchiveError::InvalidInput(format!("{} {}/{} does not exist", what, namespace, url))
            })
        };

        // MIME table and cluster packing, in position order
        let mut mime_types: Vec<&str> = Vec::new();
        let mut clusters: Vec<Vec<&[u8]>> = Vec::new();
        let mut dirents = Vec::with_capacity(entries.len());

        for (position, entry) in entries.iter().enumerate() {
            let position = position as u32;
            let dirent = match &entry.payload {
                Payload::Article { mime, data } => {
                    let mime_index = match mime_types.iter().position(|m| *m == mime.as_str()) {
                        Some(i) => i,
                        None => {
                            mime_types.push(mime);
                            mime_types.len() - 1
                        }
                    };
                    if mime_index >= usize::from(REDIRECT_MIME) {
                        return Err(ArchiveError::InvalidInput("too many MIME types".into()));
                    }

                    if clusters.last().map_or(true, |c| c.len() >= self.blobs_per_cluster) {
                        clusters.push(Vec::new());
                    }
                    let cluster = clusters.len() - 1;
                    let blobs = &mut clusters[cluster];
                    blobs.push(data.as_slice());

                    Dirent::content(
                        position,
                        entry.namespace,
                        entry.url.as_str(),
                        entry.title.as_str(),
                        mime_index as u16,
                        cluster as u32,
                        (blobs.len() - 1) as u32,
                    )
                }
                Payload::Redirect { namespace, url } => Dirent::redirect(
                    position,
                    entry.namespace,
                    entry.url.as_str(),
                    entry.title.as_str(),
                    locate(*namespace, url, "redirect target")?,
                ),
            };
            dirents.push(dirent.with_parameter(entry.parameter.clone()));
        }

        // Title order: (namespace, title) over position order, stable
        let mut title_order: Vec<u32> = (0..dirents.len() as u32).collect();
        title_order.sort_by(|&a, &b| {
            let (a, b) = (&dirents[a as usize], &dirents[b as usize]);
            (a.namespace(), a.title()).cmp(&(b.namespace(), b.title()))
        });

        let mut header = Header::new();
        header.uuid = self
            .uuid
            .unwrap_or_else(|| *Uuid::new_v4().as_bytes());
        header.entry_count = dirents.len() as u32;
        header.cluster_count = clusters.len() as u32;
        header.main_page = match &self.main_page {
            Some((namespace, url)) => locate(*namespace, url, "main page")?,
            None => header.main_page,
        };
        header.layout_page = match &self.layout_page {
            Some((namespace, url)) => locate(*namespace, url, "layout page")?,
            None => header.layout_page,
        };

        let mut out = vec![0u8; HEADER_SIZE];

        header.mime_list_pos = out.len() as u64;
        for mime in &mime_types {
            out.extend_from_slice(mime.as_bytes());
            out.push(0);
        }
        out.push(0);

        header.dirent_pos = out.len() as u64;
        let mut offsets = Vec::with_capacity(dirents.len());
        for dirent in &dirents {
            offsets.push(out.len() as u64);
            dirent.encode(&mut out);
        }

        header.url_ptr_pos = out.len() as u64;
        for offset in offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }

        header.title_ptr_pos = out.len() as u64;
        for position in title_order {
            out.extend_from_slice(&position.to_le_bytes());
        }

        let mut encoded = Vec::with_capacity(clusters.len());
        for blobs in &clusters {
            let body = Cluster::encode_body(blobs);
            let mut raw = vec![self.compression as u8];
            raw.extend(
                compression::compress(&body, self.compression)
                    .map_err(|e| ArchiveError::InvalidInput(e.to_string()))?,
            );
            debug!(
                "cluster {}: {} blobs, {} -> {} bytes",
                encoded.len(),
                blobs.len(),
                body.len(),
                raw.len()
            );
            encoded.push(raw);
        }

        header.cluster_ptr_pos = out.len() as u64;
        let mut cluster_offset = out.len() as u64 + 8 * encoded.len() as u64;
        for raw in &encoded {
            out.extend_from_slice(&cluster_offset.to_le_bytes());
            cluster_offset += raw.len() as u64;
        }
        for raw in &encoded {
            out.extend_from_slice(raw);
        }

        if self.checksum {
            header.checksum_pos = out.len() as u64;
        }
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        if self.checksum {
            let digest = Sha256::digest(&out);
            out.extend_from_slice(&digest);
        }

        info!(
            "Built archive: {} entries, {} clusters, {} bytes",
            header.entry_count,
            header.cluster_count,
            out.len()
        );
        Ok(out)
    }

    /// Build the archive and write it to `path`
    pub fn write_to<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let bytes = self.build()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
