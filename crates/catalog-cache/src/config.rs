//! Cache service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Persisted layout version - increment when `CatalogEntry` or the envelope change shape.
/// Version 3: zstd-compressed postcard payloads with leveled subcategory refs.
pub const CATALOG_CACHE_SCHEMA_VERSION: u32 = 3;

/// Maximum age of a cached catalog before it is treated as absent.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Largest encoded catalog stored inline in the envelope.
pub const DEFAULT_INLINE_BUDGET_BYTES: usize = 512 * 1024;

/// Per-chunk encoded size budget.
pub const DEFAULT_MAX_CHUNK_SIZE_BYTES: usize = 512 * 1024;

/// Maximum number of chunks a catalog may be split into.
pub const DEFAULT_MAX_CHUNKS: u32 = 20;

/// Delay used to coalesce bursts of filter requests.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Catalog size at which facet filtering switches to rayon.
pub const DEFAULT_PARALLEL_FILTER_THRESHOLD: usize = 20_000;

pub const DEFAULT_KEY_PREFIX: &str = "catalog-cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub inline_budget: usize,
    pub max_chunk_size: usize,
    pub max_chunks: u32,
    pub schema_version: u32,
    pub key_prefix: String,
    pub debounce_window: Duration,
    pub parallel_filter_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            inline_budget: DEFAULT_INLINE_BUDGET_BYTES,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE_BYTES,
            max_chunks: DEFAULT_MAX_CHUNKS,
            schema_version: CATALOG_CACHE_SCHEMA_VERSION,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            parallel_filter_threshold: DEFAULT_PARALLEL_FILTER_THRESHOLD,
        }
    }
}

impl CacheConfig {
    /// Rejects budgets the store cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(CatalogError::InvalidInput(
                "cache ttl must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_size == 0 {
            return Err(CatalogError::InvalidInput(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_chunks == 0 {
            return Err(CatalogError::InvalidInput(
                "max_chunks must be greater than zero".to_string(),
            ));
        }
        let prefix = self.key_prefix.trim();
        if prefix.is_empty() || prefix.contains('/') || prefix.contains('\\') {
            return Err(CatalogError::InvalidInput(format!(
                "invalid cache key prefix {:?}",
                self.key_prefix
            )));
        }
        Ok(())
    }

    pub fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    /// Key holding the envelope (inline entries or chunk manifest).
    pub fn envelope_key(&self) -> String {
        format!("{}:envelope", self.key_prefix)
    }

    /// Key holding the chunk at `index`.
    pub fn chunk_key(&self, index: u32) -> String {
        format!("{}:chunk:{index}", self.key_prefix)
    }
}
