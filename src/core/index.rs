//! Dirent index
//!
//! Dirents are decoded lazily from the file on first access. Two pointer
//! tables give ordered access without reading every record:
//!
//! - URL pointers: `u64` record offsets in position order, which is sorted
//!   by `(namespace, url)`
//! - Title pointers: `u32` positions sorted by `(namespace, title)`
//!
//! Lookups are lower-bound binary searches over one of these orders, so a
//! duplicate key resolves to the first match in table order. Each probe
//! decodes one dirent (through the dirent cache).

use crate::core::cache::{CacheStats, DirentCache};
use crate::core::dirent::Dirent;
use crate::core::error::{ArchiveError, Result};
use crate::core::header::Header;
use crate::core::io::ArchiveSource;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered table of directory entries
pub struct DirentIndex {
    source: Arc<ArchiveSource>,
    entry_count: u32,
    url_ptr_pos: u64,
    title_ptr_pos: u64,
    mime_types: Vec<String>,
    max_redirect_hops: u32,
    cache: DirentCache,
    namespace_ranges: Mutex<HashMap<char, Range<u32>>>,
    namespaces: Mutex<Option<Vec<char>>>,
}

impl DirentIndex {
    /// Set up the index and load the MIME-type list
    pub fn new(
        source: Arc<ArchiveSource>,
        header: &Header,
        cache_entries: usize,
        max_redirect_hops: u32,
    ) -> Result<Self> {
        let mime_types = read_mime_list(source.tail(header.mime_list_pos).map_err(|_| {
            ArchiveError::InvalidFormat("MIME list position outside file".into())
        })?)?;

        Ok(DirentIndex {
            source,
            entry_count: header.entry_count,
            url_ptr_pos: header.url_ptr_pos,
            title_ptr_pos: header.title_ptr_pos,
            mime_types,
            max_redirect_hops,
            cache: DirentCache::new(cache_entries),
            namespace_ranges: Mutex::new(HashMap::new()),
            namespaces: Mutex::new(None),
        })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    fn check_position(&self, what: &'static str, position: u32) -> Result<()> {
        if position >= self.entry_count {
            return Err(ArchiveError::OutOfRange {
                what,
                index: u64::from(position),
                len: u64::from(self.entry_count),
            });
        }
        Ok(())
    }

    /// File offset of the record at `position`
    pub fn entry_offset(&self, position: u32) -> Result<u64> {
        self.check_position("entry", position)?;
        self.source
            .read_u64(self.url_ptr_pos + 8 * u64::from(position))
    }

    /// Dirent at `position` (position order)
    pub fn entry_at(&self, position: u32) -> Result<Dirent> {
        self.check_position("entry", position)?;

        if let Some(dirent) = self.cache.get(position) {
            return Ok(dirent);
        }

        let offset = self.entry_offset(position)?;
        let dirent = Dirent::decode(self.source.tail(offset)?, offset, position)?;
        self.cache.put(position, dirent.clone());
        Ok(dirent)
    }

    /// Position stored at `index` in the title-ordered table
    pub fn title_position(&self, index: u32) -> Result<u32> {
        self.check_position("title index", index)?;

        let at = self.title_ptr_pos + 4 * u64::from(index);
        let position = self.source.read_u32(at)?;
        if position >= self.entry_count {
            return Err(ArchiveError::corrupt_index(
                at,
                format!("title pointer {} past {} entries", position, self.entry_count),
            ));
        }
        Ok(position)
    }

    /// Dirent at `index` in title order
    pub fn entry_by_title_index(&self, index: u32) -> Result<Dirent> {
        self.entry_at(self.title_position(index)?)
    }

    /// Position of the first dirent titled `title` in `namespace`
    pub fn find_by_title(&self, namespace: char, title: &str) -> Result<Option<u32>> {
        let key = (namespace, title.as_bytes());
        let index = self.lower_bound(|i| {
            let dirent = self.entry_by_title_index(i)?;
            Ok((dirent.namespace(), dirent.title().as_bytes()).cmp(&key))
        })?;

        if index == self.entry_count {
            return Ok(None);
        }
        let dirent = self.entry_by_title_index(index)?;
        let found = (dirent.namespace() == namespace && dirent.title() == title)
            .then_some(dirent.position());

        debug!("title lookup {}/{} -> {:?}", namespace, title, found);
        Ok(found)
    }

    /// Position of the dirent with `url` in `namespace`
    pub fn find_by_url(&self, namespace: char, url: &str) -> Result<Option<u32>> {
        let key = (namespace, url.as_bytes());
        let position = self.lower_bound(|p| {
            let dirent = self.entry_at(p)?;
            Ok((dirent.namespace(), dirent.url().as_bytes()).cmp(&key))
        })?;

        if position == self.entry_count {
            return Ok(None);
        }
        let dirent = self.entry_at(position)?;
        let found = (dirent.namespace() == namespace && dirent.url() == url).then_some(position);

        debug!("URL lookup {}/{} -> {:?}", namespace, url, found);
        Ok(found)
    }

    /// Up to `limit` dirents in `namespace` whose title starts with `prefix`,
    /// in title order
    pub fn suggest(&self, namespace: char, prefix: &str, limit: usize) -> Result<Vec<Dirent>> {
        let mut found = Vec::new();
        if limit == 0 {
            return Ok(found);
        }

        let key = (namespace, prefix.as_bytes());
        let mut index = self.lower_bound(|i| {
            let dirent = self.entry_by_title_index(i)?;
            Ok((dirent.namespace(), dirent.title().as_bytes()).cmp(&key))
        })?;

        while index < self.entry_count && found.len() < limit {
            let dirent = self.entry_by_title_index(index)?;
            if dirent.namespace() != namespace || !dirent.title().starts_with(prefix) {
                break;
            }
            found.push(dirent);
            index += 1;
        }

        debug!("suggest {}/{:?} -> {} titles", namespace, prefix, found.len());
        Ok(found)
    }

    /// First index in `[0, entry_count)` whose key is not less than the
    /// search key
    fn lower_bound<F>(&self, mut compare: F) -> Result<u32>
    where
        F: FnMut(u32) -> Result<Ordering>,
    {
        let mut low = 0u32;
        let mut high = self.entry_count;
        while low < high {
            let mid = low + (high - low) / 2;
            if compare(mid)? == Ordering::Less {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }

    /// Follow a redirect chain to the first non-redirect dirent
    ///
    /// A non-redirect position resolves to itself. Dangling targets, cycles
    /// and chains longer than the configured hop limit fail with
    /// [`ArchiveError::BrokenRedirect`].
    pub fn resolve_redirect(&self, position: u32) -> Result<u32> {
        let mut current = position;
        let mut visited = Vec::new();

        loop {
            let dirent = self.entry_at(current)?;
            let Some(target) = dirent.redirect_target() else {
                return Ok(current);
            };

            let broken = |reason: String| {
                warn!("broken redirect at entry {}: {}", position, reason);
                Err(ArchiveError::BrokenRedirect { position, reason })
            };

            if visited.len() as u32 >= self.max_redirect_hops {
                return broken(format!(
                    "more than {} hops",
                    self.max_redirect_hops
                ));
            }
            visited.push(current);

            if target >= self.entry_count {
                return broken(format!(
                    "entry {} redirects to {} past {} entries",
                    current, target, self.entry_count
                ));
            }
            if visited.contains(&target) {
                return broken(format!("cycle through entry {}", target));
            }
            current = target;
        }
    }

    /// Positions `[start, end)` holding namespace `namespace`
    pub fn namespace_range(&self, namespace: char) -> Result<Range<u32>> {
        if let Some(range) = self.namespace_ranges.lock().get(&namespace) {
            return Ok(range.clone());
        }

        let start = self.lower_bound(|p| Ok(self.entry_at(p)?.namespace().cmp(&namespace)))?;
        let end = self.lower_bound(|p| {
            Ok(match self.entry_at(p)?.namespace().cmp(&namespace) {
                Ordering::Greater => Ordering::Greater,
                Ordering::Less | Ordering::Equal => Ordering::Less,
            })
        })?;

        let range = start..end;
        self.namespace_ranges
            .lock()
            .insert(namespace, range.clone());
        Ok(range)
    }

    pub fn namespace_count(&self, namespace: char) -> Result<u32> {
        Ok(self.namespace_range(namespace)?.len() as u32)
    }

    pub fn has_namespace(&self, namespace: char) -> Result<bool> {
        Ok(!self.namespace_range(namespace)?.is_empty())
    }

    /// Distinct namespaces in position order
    pub fn namespaces(&self) -> Result<Vec<char>> {
        if let Some(namespaces) = self.namespaces.lock().as_ref() {
            return Ok(namespaces.clone());
        }

        let mut namespaces = Vec::new();
        let mut position = 0;
        while position < self.entry_count {
            let namespace = self.entry_at(position)?.namespace();
            let range = self.namespace_range(namespace)?;
            namespaces.push(namespace);
            // An unsorted table could yield an empty range here
            position = range.end.max(position + 1);
        }

        *self.namespaces.lock() = Some(namespaces.clone());
        Ok(namespaces)
    }

    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    pub fn mime_type(&self, index: u16) -> Result<&str> {
        self.mime_types
            .get(usize::from(index))
            .map(String::as_str)
            .ok_or(ArchiveError::UnknownMimeType(index))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Parse NUL-terminated strings up to the empty terminator
fn read_mime_list(bytes: &[u8]) -> Result<Vec<String>> {
    let mut types = Vec::new();
    let mut rest = bytes;

    loop {
        let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            ArchiveError::InvalidFormat("MIME list runs past end of file".into())
        })?;
        if nul == 0 {
            return Ok(types);
        }

        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ArchiveError::InvalidFormat("MIME type is not valid UTF-8".into()))?;
        types.push(name.to_string());
        rest = &rest[nul + 1..];
    }
}
