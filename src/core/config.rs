//! Reader configuration
//!
//! Tunables come from a [`ConfigProvider`]: the process environment by
//! default, or any key/value source the embedder supplies. [`ReaderConfig`]
//! can also be deserialized from TOML.
//!
//! ```toml
//! dirent_cache_entries = 1024
//! cluster_cache_bytes = 33554432
//! max_redirect_hops = 16
//! ```

use crate::core::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Source of named integer options
pub trait ConfigProvider {
    /// Raw string value of option `name`, if set
    fn raw(&self, name: &str) -> Option<String>;

    /// Integer option, or `default` when unset or unparseable
    fn integer_option(&self, name: &str, default: u64) -> u64 {
        match self.raw(name) {
            Some(value) => parse_integer(&value).unwrap_or_else(|| {
                warn!("ignoring {}={:?}: not an integer", name, value);
                default
            }),
            None => default,
        }
    }

    /// Byte size option accepting `k`/`m`/`g` suffixes, or `default`
    fn memory_size_option(&self, name: &str, default: u64) -> u64 {
        match self.raw(name) {
            Some(value) => parse_memory_size(&value).unwrap_or_else(|| {
                warn!("ignoring {}={:?}: not a memory size", name, value);
                default
            }),
            None => default,
        }
    }
}

/// Options read from environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigProvider for EnvConfig {
    fn raw(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Options held in memory
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl ConfigProvider for MapConfig {
    fn raw(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

pub fn parse_integer(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Parse a byte count such as `512`, `64k`, `16M` or `2g`
///
/// Suffixes multiply by powers of 1024.
pub fn parse_memory_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, shift) = match value.as_bytes().last()? {
        b'k' | b'K' => (&value[..value.len() - 1], 10),
        b'm' | b'M' => (&value[..value.len() - 1], 20),
        b'g' | b'G' => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()?.checked_mul(1u64 << shift)
}

pub const ENV_DIRENT_CACHE: &str = "ZIM_DIRENTCACHE";
pub const ENV_CLUSTER_CACHE: &str = "ZIM_CLUSTERCACHE";
pub const ENV_MAX_CLUSTER_SIZE: &str = "ZIM_MAXCLUSTERSIZE";
pub const ENV_REDIRECT_HOPS: &str = "ZIM_REDIRECTHOPS";

/// Settings for an open archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Decoded dirents kept in memory (0 disables the cache)
    pub dirent_cache_entries: usize,

    /// Bytes of decompressed clusters kept in memory (0 disables the cache)
    pub cluster_cache_bytes: usize,

    /// Upper bound on a single decompressed cluster
    pub max_cluster_size: usize,

    /// Redirect hops followed before giving up
    pub max_redirect_hops: u32,

    /// Recompute the trailing checksum at open
    pub verify_checksum: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            dirent_cache_entries: 512,
            cluster_cache_bytes: 16 << 20,
            max_cluster_size: 64 << 20,
            max_redirect_hops: 32,
            verify_checksum: true,
        }
    }
}

impl ReaderConfig {
    /// Defaults overridden by whatever `provider` sets
    pub fn from_provider(provider: &dyn ConfigProvider) -> Self {
        let defaults = Self::default();
        ReaderConfig {
            dirent_cache_entries: provider
                .integer_option(ENV_DIRENT_CACHE, defaults.dirent_cache_entries as u64)
                as usize,
            cluster_cache_bytes: provider
                .memory_size_option(ENV_CLUSTER_CACHE, defaults.cluster_cache_bytes as u64)
                as usize,
            max_cluster_size: provider
                .memory_size_option(ENV_MAX_CLUSTER_SIZE, defaults.max_cluster_size as u64)
                as usize,
            max_redirect_hops: provider
                .integer_option(ENV_REDIRECT_HOPS, u64::from(defaults.max_redirect_hops))
                .min(u64::from(u32::MAX)) as u32,
            verify_checksum: defaults.verify_checksum,
        }
    }

    pub fn from_env() -> Self {
        Self::from_provider(&EnvConfig)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ArchiveError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_cluster_cache_bytes(mut self, bytes: usize) -> Self {
        self.cluster_cache_bytes = bytes;
        self
    }

    pub fn with_dirent_cache_entries(mut self, entries: usize) -> Self {
        self.dirent_cache_entries = entries;
        self
    }

    pub fn with_max_redirect_hops(mut self, hops: u32) -> Self {
        self.max_redirect_hops = hops;
        self
    }

    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }
}
