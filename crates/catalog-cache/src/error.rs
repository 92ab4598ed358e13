#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog cache is absent")]
    CacheAbsent,

    #[error("catalog cache expired: age {age_ms} ms >= ttl {ttl_ms} ms")]
    CacheExpired { age_ms: u64, ttl_ms: u64 },

    #[error("catalog cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("catalog cache schema stale: {0}")]
    CacheSchemaStale(String),

    #[error("catalog cache chunk {index} missing")]
    ChunkMissing { index: u32 },

    #[error("storage quota exceeded on partition {partition} writing {key} ({size} bytes)")]
    StorageQuotaExceeded {
        partition: String,
        key: String,
        size: usize,
    },

    #[error("catalog needs {required} chunks but at most {max} are allowed")]
    CapacityExceeded { required: usize, max: u32 },

    #[error("origin fetch failed: {0}")]
    NetworkFetchFailed(String),

    #[error("category hierarchy integrity violation: {0}")]
    StructuralIntegrityError(String),

    #[error("category not found: {0}")]
    CategoryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Returns true for errors that mean "this partition is full", which the
    /// store answers by retrying on the overflow partition.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::StorageQuotaExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
