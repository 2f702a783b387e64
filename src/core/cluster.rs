//! Clusters and the cluster store
//!
//! A cluster is the unit of compression: one tag byte followed by a
//! compressed body that, once decompressed, holds a blob-end table and the
//! concatenated blobs.
//!
//! ```text
//! ┌─────┬───────────────────────────────────────────────┐
//! │ tag │ compressed body                               │
//! └─────┴───────────────────────────────────────────────┘
//!          │ decompress
//!          ▼
//! ┌───────────┬──────────────────────┬──────────────────┐
//! │ count (v) │ end[0] .. end[n-1] (v)│ blob0 blob1 ...  │
//! └───────────┴──────────────────────┴──────────────────┘
//! ```
//!
//! Blob ends are relative to the first blob byte; blob `i` spans
//! `end[i-1]..end[i]` with `end[-1] = 0`.

use crate::core::cache::{CacheStats, ClusterCache};
use crate::core::compression::{self, CodecError, Compression};
use crate::core::error::{ArchiveError, Result};
use crate::core::header::Header;
use crate::core::io::ArchiveSource;
use crate::core::varint;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// A decompressed cluster
pub struct Cluster {
    compression: Compression,
    /// End offset of each blob within `data`
    ends: Vec<usize>,
    data: Vec<u8>,
}

impl Cluster {
    /// Parse a decompressed cluster body
    pub fn parse(compression: Compression, body: Vec<u8>) -> std::result::Result<Self, CodecError> {
        let corrupt = |what: &str| CodecError::Corrupt(format!("blob table: {}", what));

        let (count, mut pos) = varint::decode(&body).map_err(|e| corrupt(&e.to_string()))?;
        // Each end takes at least one byte, which bounds a forged count
        if count > (body.len() - pos) as u64 {
            return Err(corrupt("blob count exceeds cluster size"));
        }

        let mut ends = Vec::with_capacity(count as usize);
        let mut previous = 0u64;
        for _ in 0..count {
            let (end, used) = varint::decode(&body[pos..]).map_err(|e| corrupt(&e.to_string()))?;
            if end < previous {
                return Err(corrupt("blob ends not increasing"));
            }
            previous = end;
            ends.push(end);
            pos += used;
        }

        if previous != (body.len() - pos) as u64 {
            return Err(corrupt(&format!(
                "blob data is {} bytes, table covers {}",
                body.len() - pos,
                previous
            )));
        }

        let mut data = body;
        data.drain(..pos);

        Ok(Cluster {
            compression,
            ends: ends.into_iter().map(|end| end as usize).collect(),
            data,
        })
    }

    /// Build a decompressed cluster body from blobs
    pub fn encode_body(blobs: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        varint::encode(blobs.len() as u64, &mut body);

        let mut end = 0u64;
        for blob in blobs {
            end += blob.len() as u64;
            varint::encode(end, &mut body);
        }
        for blob in blobs {
            body.extend_from_slice(blob);
        }
        body
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn blob_count(&self) -> u32 {
        self.ends.len() as u32
    }

    /// Bytes of blob `n`
    pub fn blob(&self, n: u32) -> Option<&[u8]> {
        let n = n as usize;
        let end = *self.ends.get(n)?;
        let start = if n == 0 { 0 } else { self.ends[n - 1] };
        Some(&self.data[start..end])
    }

    pub fn blob_size(&self, n: u32) -> Option<usize> {
        self.blob(n).map(<[u8]>::len)
    }

    /// Approximate heap footprint, used as cache weight
    pub fn memory_size(&self) -> usize {
        self.data.len() + self.ends.len() * std::mem::size_of::<usize>()
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("compression", &self.compression)
            .field("blobs", &self.ends.len())
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Content bytes of one article
///
/// Keeps its cluster alive, so it stays valid after the cluster is evicted
/// from the cache.
#[derive(Clone)]
pub struct Blob {
    cluster: Arc<Cluster>,
    index: u32,
}

impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        self.cluster.blob(self.index).unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Blob contents as UTF-8, if valid
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("index", &self.index)
            .field("len", &self.as_bytes().len())
            .finish()
    }
}

/// Maps cluster numbers to decompressed clusters
pub struct ClusterStore {
    source: Arc<ArchiveSource>,
    /// Start offset of each cluster
    pointers: Vec<u64>,
    /// End of the last cluster (checksum position or EOF)
    region_end: u64,
    max_cluster_size: usize,
    cache: ClusterCache,
}

impl ClusterStore {
    /// Load and validate the cluster pointer table
    pub fn new(
        source: Arc<ArchiveSource>,
        header: &Header,
        cache_bytes: usize,
        max_cluster_size: usize,
    ) -> Result<Self> {
        let region_end = if header.has_checksum() {
            header.checksum_pos
        } else {
            source.len()
        };

        let table = source
            .slice(header.cluster_ptr_pos, u64::from(header.cluster_count) * 8)
            .map_err(|_| ArchiveError::InvalidFormat("cluster pointer table truncated".into()))?;

        let mut pointers = Vec::with_capacity(header.cluster_count as usize);
        for (i, chunk) in table.chunks_exact(8).enumerate() {
            let offset = u64::from_le_bytes([
                chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
            ]);

            if let Some(&previous) = pointers.last() {
                if offset <= previous {
                    return Err(ArchiveError::InvalidFormat(format!(
                        "cluster pointer {} ({}) not after previous ({})",
                        i, offset, previous
                    )));
                }
            }
            if offset >= region_end {
                return Err(ArchiveError::InvalidFormat(format!(
                    "cluster pointer {} ({}) outside cluster region ending at {}",
                    i, offset, region_end
                )));
            }
            pointers.push(offset);
        }

        Ok(ClusterStore {
            source,
            pointers,
            region_end,
            max_cluster_size,
            cache: ClusterCache::new(cache_bytes),
        })
    }

    pub fn cluster_count(&self) -> u32 {
        self.pointers.len() as u32
    }

    /// Byte range `[start, end)` of cluster `index` in the file
    pub fn cluster_range(&self, index: u32) -> Result<(u64, u64)> {
        let i = index as usize;
        let start = *self.pointers.get(i).ok_or(ArchiveError::OutOfRange {
            what: "cluster",
            index: u64::from(index),
            len: self.pointers.len() as u64,
        })?;
        let end = self.pointers.get(i + 1).copied().unwrap_or(self.region_end);
        Ok((start, end))
    }

    /// Get a decompressed cluster, decompressing it on first touch
    pub fn open_cluster(&self, index: u32) -> Result<Arc<Cluster>> {
        let (start, end) = self.cluster_range(index)?;

        if let Some(cluster) = self.cache.get(index) {
            debug!("cluster {} found in cache", index);
            return Ok(cluster);
        }

        let raw = self.source.slice(start, end - start)?;
        let (&tag, body) = raw.split_first().ok_or(ArchiveError::CorruptStream {
            cluster: index,
            reason: "empty cluster".into(),
        })?;

        let (compression, codec) =
            compression::decompressor_for(tag).map_err(|e| ArchiveError::codec(index, e))?;
        let decompressed = codec
            .decompress(body, self.max_cluster_size)
            .map_err(|e| ArchiveError::codec(index, e))?;
        let cluster = Cluster::parse(compression, decompressed)
            .map_err(|e| ArchiveError::codec(index, e))?;

        debug!(
            "decompressed cluster {} ({}, {} -> {} bytes, {} blobs)",
            index,
            compression.name(),
            body.len(),
            cluster.memory_size(),
            cluster.blob_count()
        );

        Ok(self.cache.insert_if_absent(index, Arc::new(cluster)))
    }

    /// Read blob `blob` of cluster `cluster`
    pub fn read_blob(&self, cluster: u32, blob: u32) -> Result<Blob> {
        let decoded = self.open_cluster(cluster)?;
        if blob >= decoded.blob_count() {
            return Err(ArchiveError::OutOfRange {
                what: "blob",
                index: u64::from(blob),
                len: u64::from(decoded.blob_count()),
            });
        }
        Ok(Blob {
            cluster: decoded,
            index: blob,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
