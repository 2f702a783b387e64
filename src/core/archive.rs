//! Open archive
//!
//! [`Archive`] ties the dirent index and the cluster store to one immutable
//! backing buffer. Everything it owns is either read-only after open or
//! guarded internally, so an `Archive` can be shared across threads behind
//! an `Arc` with no external locking.

use crate::core::cache::CacheStats;
use crate::core::cluster::{Blob, ClusterStore};
use crate::core::config::ReaderConfig;
use crate::core::dirent::Dirent;
use crate::core::error::{ArchiveError, Result};
use crate::core::header::{Header, CHECKSUM_LEN};
use crate::core::index::DirentIndex;
use crate::core::io::ArchiveSource;
use serde::Serialize;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Read-only view of an archive file
pub struct Archive {
    source: Arc<ArchiveSource>,
    header: Header,
    index: DirentIndex,
    clusters: ClusterStore,
}

/// Summary of an open archive
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub path: Option<String>,
    pub file_size: u64,
    pub uuid: String,
    pub version: String,
    pub entry_count: u32,
    pub cluster_count: u32,
    pub checksum: Option<String>,
    pub main_page: Option<String>,
    pub layout_page: Option<String>,
    pub mime_types: Vec<String>,
    pub namespaces: Vec<NamespaceInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceInfo {
    pub namespace: char,
    pub entries: u32,
}

impl Archive {
    /// Open an archive file with settings from the environment
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, &ReaderConfig::from_env())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self> {
        info!("Opening archive at {:?}", path.as_ref());
        let (source, header) = ArchiveSource::open(path)?;
        Self::assemble(source, header, config)
    }

    /// Open an archive image held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_config(bytes, &ReaderConfig::default())
    }

    pub fn from_bytes_with_config(bytes: Vec<u8>, config: &ReaderConfig) -> Result<Self> {
        let (source, header) = ArchiveSource::from_bytes(bytes)?;
        Self::assemble(source, header, config)
    }

    fn assemble(source: ArchiveSource, header: Header, config: &ReaderConfig) -> Result<Self> {
        header.validate_layout(source.len())?;

        let source = Arc::new(source);
        let index = DirentIndex::new(
            Arc::clone(&source),
            &header,
            config.dirent_cache_entries,
            config.max_redirect_hops,
        )?;
        let clusters = ClusterStore::new(
            Arc::clone(&source),
            &header,
            config.cluster_cache_bytes,
            config.max_cluster_size,
        )?;

        let archive = Archive {
            source,
            header,
            index,
            clusters,
        };

        if config.verify_checksum {
            archive.verify()?;
        }

        info!(
            "Opened archive {} (v{}.{}): {} entries, {} clusters, {} bytes",
            archive.uuid(),
            header.version_major,
            header.version_minor,
            header.entry_count,
            header.cluster_count,
            archive.source.len()
        );

        Ok(archive)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::from_bytes(self.header.uuid)
    }

    /// File path (None for in-memory archives)
    pub fn path(&self) -> Option<&Path> {
        self.source.path()
    }

    pub fn file_size(&self) -> u64 {
        self.source.len()
    }

    pub fn entry_count(&self) -> u32 {
        self.index.entry_count()
    }

    pub fn cluster_count(&self) -> u32 {
        self.clusters.cluster_count()
    }

    /// Dirent at `position` in dirent-table order
    pub fn entry_at(&self, position: u32) -> Result<Dirent> {
        self.index.entry_at(position)
    }

    /// Dirent at `index` in title order
    pub fn entry_by_title_index(&self, index: u32) -> Result<Dirent> {
        self.index.entry_by_title_index(index)
    }

    /// Iterate every dirent in dirent-table order
    ///
    /// Each call starts from the beginning. A record that fails to decode
    /// yields an `Err` and iteration continues with the next position.
    pub fn iter(&self) -> Entries<'_> {
        Entries::new(self, Order::Position, 0..self.entry_count())
    }

    /// Iterate every dirent in title order
    pub fn iter_by_title(&self) -> Entries<'_> {
        Entries::new(self, Order::Title, 0..self.entry_count())
    }

    /// Iterate the dirents of one namespace in dirent-table order
    pub fn iter_namespace(&self, namespace: char) -> Result<Entries<'_>> {
        let range = self.index.namespace_range(namespace)?;
        Ok(Entries::new(self, Order::Position, range))
    }

    /// Content bytes of `dirent`, following redirects
    pub fn content(&self, dirent: &Dirent) -> Result<Blob> {
        let target;
        let dirent = if dirent.is_redirect() {
            let position = self.index.resolve_redirect(dirent.position())?;
            target = self.index.entry_at(position)?;
            debug!("{} redirects to {}", dirent.long_url(), target.long_url());
            &target
        } else {
            dirent
        };

        match dirent.cluster_blob() {
            Some((cluster, blob)) => self.clusters.read_blob(cluster, blob),
            None => Err(ArchiveError::BrokenRedirect {
                position: dirent.position(),
                reason: "resolved to another redirect".into(),
            }),
        }
    }

    /// Read blob `blob` of cluster `cluster` directly
    pub fn read_blob(&self, cluster: u32, blob: u32) -> Result<Blob> {
        self.clusters.read_blob(cluster, blob)
    }

    /// Position following the redirect chain from `position`
    pub fn resolve_redirect(&self, position: u32) -> Result<u32> {
        self.index.resolve_redirect(position)
    }

    /// Dirent titled `title` in `namespace`
    pub fn lookup(&self, namespace: char, title: &str) -> Result<Dirent> {
        match self.index.find_by_title(namespace, title)? {
            Some(position) => self.index.entry_at(position),
            None => Err(ArchiveError::NotFound {
                namespace,
                key: title.to_string(),
            }),
        }
    }

    /// Dirent with `url` in `namespace`
    pub fn lookup_url(&self, namespace: char, url: &str) -> Result<Dirent> {
        match self.index.find_by_url(namespace, url)? {
            Some(position) => self.index.entry_at(position),
            None => Err(ArchiveError::NotFound {
                namespace,
                key: url.to_string(),
            }),
        }
    }

    /// Value of the metadata entry `M/<name>`, such as `Title` or `Language`
    pub fn metadata(&self, name: &str) -> Result<String> {
        let dirent = self.lookup_url('M', name)?;
        let blob = self.content(&dirent)?;
        String::from_utf8(blob.to_vec()).map_err(|_| {
            ArchiveError::InvalidFormat(format!("metadata {} is not valid UTF-8", name))
        })
    }

    /// Up to `limit` entries in `namespace` whose title starts with `prefix`,
    /// in title order
    pub fn suggest(&self, namespace: char, prefix: &str, limit: usize) -> Result<Vec<Dirent>> {
        self.index.suggest(namespace, prefix, limit)
    }

    /// Look up `namespace/url`
    pub fn lookup_long_url(&self, long_url: &str) -> Result<Dirent> {
        let mut chars = long_url.chars();
        match (chars.next(), chars.next()) {
            (Some(namespace), Some('/')) => self.lookup_url(namespace, chars.as_str()),
            _ => Err(ArchiveError::InvalidInput(format!(
                "expected namespace/url, got {:?}",
                long_url
            ))),
        }
    }

    pub fn find_by_title(&self, namespace: char, title: &str) -> Result<Option<u32>> {
        self.index.find_by_title(namespace, title)
    }

    pub fn find_by_url(&self, namespace: char, url: &str) -> Result<Option<u32>> {
        self.index.find_by_url(namespace, url)
    }

    pub fn mime_types(&self) -> &[String] {
        self.index.mime_types()
    }

    pub fn mime_type(&self, index: u16) -> Result<&str> {
        self.index.mime_type(index)
    }

    /// MIME type of a content dirent (None for redirects)
    pub fn mime_type_of(&self, dirent: &Dirent) -> Result<Option<&str>> {
        dirent.mime_type().map(|m| self.mime_type(m)).transpose()
    }

    pub fn main_page(&self) -> Result<Option<Dirent>> {
        self.header.main_page().map(|p| self.entry_at(p)).transpose()
    }

    pub fn layout_page(&self) -> Result<Option<Dirent>> {
        self.header.layout_page().map(|p| self.entry_at(p)).transpose()
    }

    pub fn namespace_range(&self, namespace: char) -> Result<Range<u32>> {
        self.index.namespace_range(namespace)
    }

    pub fn namespace_count(&self, namespace: char) -> Result<u32> {
        self.index.namespace_count(namespace)
    }

    pub fn has_namespace(&self, namespace: char) -> Result<bool> {
        self.index.has_namespace(namespace)
    }

    pub fn namespaces(&self) -> Result<Vec<char>> {
        self.index.namespaces()
    }

    pub fn has_checksum(&self) -> bool {
        self.header.has_checksum()
    }

    /// Stored checksum as lowercase hex
    pub fn checksum(&self) -> Option<String> {
        if !self.header.has_checksum() {
            return None;
        }
        self.source
            .slice(self.header.checksum_pos, CHECKSUM_LEN)
            .ok()
            .map(hex::encode)
    }

    /// Recompute the SHA-256 of the archive and compare it with the stored one
    ///
    /// Archives without a checksum pass trivially.
    pub fn verify(&self) -> Result<()> {
        if !self.header.has_checksum() {
            debug!("archive carries no checksum, skipping verification");
            return Ok(());
        }

        let stored = self.source.slice(self.header.checksum_pos, CHECKSUM_LEN)?;
        let computed = self.source.digest(self.header.checksum_pos)?;
        if stored != computed.as_slice() {
            warn!(
                "checksum mismatch: stored {}, computed {}",
                hex::encode(stored),
                hex::encode(computed)
            );
            return Err(ArchiveError::ChecksumMismatch);
        }

        debug!("checksum verified");
        Ok(())
    }

    pub fn dirent_cache_stats(&self) -> CacheStats {
        self.index.cache_stats()
    }

    pub fn cluster_cache_stats(&self) -> CacheStats {
        self.clusters.cache_stats()
    }

    /// Drop every cached dirent and cluster
    pub fn clear_caches(&self) {
        self.index.clear_cache();
        self.clusters.clear_cache();
    }

    /// Collect a summary of the archive
    pub fn info(&self) -> Result<ArchiveInfo> {
        let namespaces = self
            .namespaces()?
            .into_iter()
            .map(|namespace| {
                Ok(NamespaceInfo {
                    namespace,
                    entries: self.namespace_count(namespace)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ArchiveInfo {
            path: self.path().map(|p| p.display().to_string()),
            file_size: self.file_size(),
            uuid: self.uuid().to_string(),
            version: format!("{}.{}", self.header.version_major, self.header.version_minor),
            entry_count: self.entry_count(),
            cluster_count: self.cluster_count(),
            checksum: self.checksum(),
            main_page: self.main_page()?.map(|d| d.long_url()),
            layout_page: self.layout_page()?.map(|d| d.long_url()),
            mime_types: self.mime_types().to_vec(),
            namespaces,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Order {
    Position,
    Title,
}

/// Lazy iterator over dirents
pub struct Entries<'a> {
    archive: &'a Archive,
    order: Order,
    range: Range<u32>,
}

impl<'a> Entries<'a> {
    fn new(archive: &'a Archive, order: Order, range: Range<u32>) -> Self {
        Entries {
            archive,
            order,
            range,
        }
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<Dirent>;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.range.next()?;
        Some(match self.order {
            Order::Position => self.archive.entry_at(i),
            Order::Title => self.archive.entry_by_title_index(i),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl ExactSizeIterator for Entries<'_> {}

impl<'a> IntoIterator for &'a Archive {
    type Item = Result<Dirent>;
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Entries<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::ArchiveBuilder;
    use crate::core::compression::Compression;

    fn sample() -> Archive {
        let bytes = ArchiveBuilder::new()
            .compression(Compression::Zip)
            .add_article('A', "Cat", "Cat", "text/html", b"<p>meow</p>".to_vec())
            .add_article('A', "Dog", "Dog", "text/html", b"<p>woof</p>".to_vec())
            .add_redirect('A', "Kitty", "Kitty", 'A', "Cat")
            .add_article('I', "logo.png", "", "image/png", vec![0x89, b'P', b'N', b'G'])
            .add_article('M', "Title", "", "text/plain", b"Animals".to_vec())
            .main_page('A', "Dog")
            .build()
            .unwrap();
        Archive::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_archive_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Archive>();
    }

    #[test]
    fn test_lookup_and_content() {
        let archive = sample();
        let cat = archive.lookup('A', "Cat").unwrap();
        assert_eq!(&*archive.content(&cat).unwrap(), b"<p>meow</p>");
        assert_eq!(archive.mime_type_of(&cat).unwrap(), Some("text/html"));
    }

    #[test]
    fn test_metadata() {
        let archive = sample();
        assert_eq!(archive.metadata("Title").unwrap(), "Animals");
        assert!(matches!(
            archive.metadata("Language"),
            Err(ArchiveError::NotFound { namespace: 'M', .. })
        ));
    }

    #[test]
    fn test_metadata_must_be_utf8() {
        let bytes = ArchiveBuilder::new()
            .add_article('M', "Counter", "", "application/octet-stream", vec![0xff, 0xfe])
            .build()
            .unwrap();
        let archive = Archive::from_bytes(bytes).unwrap();
        assert!(matches!(
            archive.metadata("Counter"),
            Err(ArchiveError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_suggest() {
        let archive = sample();
        let titles: Vec<_> = archive
            .suggest('A', "", 10)
            .unwrap()
            .iter()
            .map(|d| d.title().to_string())
            .collect();
        // Stops before the I and M namespaces
        assert_eq!(titles, ["Cat", "Dog", "Kitty"]);
        assert!(archive.suggest('A', "Ca", 0).unwrap().is_empty());
        assert!(archive.suggest('M', "Cat", 5).unwrap().is_empty());
    }

    #[test]
    fn test_redirect_content() {
        let archive = sample();
        let kitty = archive.lookup_url('A', "Kitty").unwrap();
        assert!(kitty.is_redirect());
        assert_eq!(archive.content(&kitty).unwrap().as_str(), Some("<p>meow</p>"));
        assert_eq!(archive.mime_type_of(&kitty).unwrap(), None);
    }

    #[test]
    fn test_not_found() {
        let archive = sample();
        assert!(matches!(
            archive.lookup('A', "Cow"),
            Err(ArchiveError::NotFound { namespace: 'A', .. })
        ));
        assert!(matches!(
            archive.lookup_long_url("A/Cow"),
            Err(ArchiveError::NotFound { .. })
        ));
        assert!(matches!(
            archive.lookup_long_url("nope"),
            Err(ArchiveError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let archive = sample();
        let first: Vec<String> = archive.iter().map(|d| d.unwrap().long_url()).collect();
        let second: Vec<String> = archive.iter().map(|d| d.unwrap().long_url()).collect();

        assert_eq!(first, ["A/Cat", "A/Dog", "A/Kitty", "I/logo.png", "M/Title"]);
        assert_eq!(first, second);
        assert_eq!(archive.iter().len(), 5);
    }

    #[test]
    fn test_iter_namespace() {
        let archive = sample();
        let urls: Vec<String> = archive
            .iter_namespace('A')
            .unwrap()
            .map(|d| d.unwrap().url().to_string())
            .collect();
        assert_eq!(urls, ["Cat", "Dog", "Kitty"]);
        assert_eq!(archive.iter_namespace('X').unwrap().count(), 0);
    }

    #[test]
    fn test_main_page_and_info() {
        let archive = sample();
        assert_eq!(archive.main_page().unwrap().unwrap().url(), "Dog");
        assert!(archive.layout_page().unwrap().is_none());

        let info = archive.info().unwrap();
        assert_eq!(info.entry_count, 5);
        assert_eq!(info.main_page.as_deref(), Some("A/Dog"));
        assert_eq!(info.namespaces.len(), 3);
        assert_eq!(info.checksum.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_checksum_mismatch_rejected_at_open() {
        let mut bytes = ArchiveBuilder::new()
            .add_article('A', "Cat", "", "text/plain", b"meow".to_vec())
            .build()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(
            Archive::from_bytes(bytes.clone()),
            Err(ArchiveError::ChecksumMismatch)
        ));

        let relaxed = ReaderConfig::default().with_verify_checksum(false);
        let archive = Archive::from_bytes_with_config(bytes, &relaxed).unwrap();
        assert!(matches!(archive.verify(), Err(ArchiveError::ChecksumMismatch)));
    }

    #[test]
    fn test_uncached_archive_reads_same_bytes() {
        let bytes = ArchiveBuilder::new()
            .add_article('A', "Cat", "", "text/plain", b"meow".to_vec())
            .build()
            .unwrap();
        let config = ReaderConfig::default()
            .with_cluster_cache_bytes(0)
            .with_dirent_cache_entries(0);
        let archive = Archive::from_bytes_with_config(bytes, &config).unwrap();

        let cat = archive.lookup('A', "Cat").unwrap();
        assert_eq!(archive.content(&cat).unwrap().to_vec(), b"meow");
        assert_eq!(archive.content(&cat).unwrap().to_vec(), b"meow");
        assert_eq!(archive.cluster_cache_stats().entries, 0);
    }
}
