//! Client-side catalog cache with faceted filtering and search.
//!
//! This crate provides:
//! - A size-budgeted persistent cache that splits large catalogs into chunks
//!   across a primary and an overflow storage partition
//! - Cache-first catalog loading with origin fallback
//! - Category hierarchy reconstruction from flat parent pointers
//! - Faceted filtering, sorting and progressive (degrading) text search
//! - Debounced, last-request-wins filter sessions

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod index;
pub mod query;
pub mod search;
pub mod storage;
pub mod types;

// Re-export main types
pub use cancel::{CancellationToken, SearchVersionTracker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CatalogError, Result};
pub use hierarchy::{Ancestry, HierarchyResolver};
pub use index::{CatalogIndex, OriginFetcher, StaticOrigin};
pub use query::{
    CandidateTerms, FacetFilterEngine, FilterSpec, ProgressiveSearchResolver, SearchOutcome,
    SortKey, StockPredicates,
};
pub use search::{CacheService, FilterDebouncer, FilterSession};
pub use storage::{CacheStore, FilePartition, MemoryPartition, SharedPartition, StoragePartition};
pub use types::{CacheStats, CatalogEntry, CategoryNode, Ref, StockStatus};
