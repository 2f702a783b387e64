//! Title search
//!
//! A linear scan over the dirent table testing each title for a literal,
//! case-sensitive substring. Results come back in dirent-table order with no
//! ranking. Cost grows with the number of entries times title length; there
//! is no secondary index.

use crate::core::archive::Archive;
use crate::core::dirent::Dirent;
use crate::core::error::{ArchiveError, Result};
use tracing::{debug, warn};

/// Entry skipped during a scan
#[derive(Debug)]
pub struct SkippedEntry {
    pub position: u32,
    pub error: ArchiveError,
}

/// Matches plus the entries that could not be read
#[derive(Debug, Default)]
pub struct SearchReport {
    pub matches: Vec<Dirent>,
    pub skipped: Vec<SkippedEntry>,
}

/// Substring search over titles
pub struct ArticleSearch<'a> {
    archive: &'a Archive,
    namespace: Option<char>,
}

impl<'a> ArticleSearch<'a> {
    pub fn new(archive: &'a Archive) -> Self {
        ArticleSearch {
            archive,
            namespace: None,
        }
    }

    /// Only consider entries in `namespace`
    pub fn in_namespace(mut self, namespace: char) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Dirents whose title contains `query`, in dirent-table order
    ///
    /// Entries that fail to decode are logged and skipped.
    pub fn search(&self, query: &str) -> Result<Vec<Dirent>> {
        Ok(self.search_report(query)?.matches)
    }

    /// Like [`search`](Self::search), also returning the skipped entries
    ///
    /// Fails only when the namespace range itself cannot be determined.
    pub fn search_report(&self, query: &str) -> Result<SearchReport> {
        let entries = match self.namespace {
            Some(namespace) => self.archive.iter_namespace(namespace)?,
            None => self.archive.iter(),
        };
        let start = match self.namespace {
            Some(namespace) => self.archive.namespace_range(namespace)?.start,
            None => 0,
        };

        let mut report = SearchReport::default();
        for (offset, entry) in entries.enumerate() {
            match entry {
                Ok(dirent) => {
                    if dirent.title().contains(query) {
                        report.matches.push(dirent);
                    }
                }
                Err(error) => {
                    let position = start + offset as u32;
                    warn!("search skipped entry {}: {}", position, error);
                    report.skipped.push(SkippedEntry { position, error });
                }
            }
        }

        debug!(
            "search {:?}: {} matches, {} skipped",
            query,
            report.matches.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}
