//! CacheService - main API for the catalog cache.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::debounce::FilterDebouncer;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::hierarchy::{Ancestry, HierarchyResolver};
use crate::index::{CatalogIndex, OriginFetcher};
use crate::query::{FacetFilterEngine, FilterSpec, ProgressiveSearchResolver, SearchOutcome};
use crate::storage::{CacheStore, MemoryPartition, SharedPartition};
use crate::types::{CacheStats, CatalogEntry, CategoryNode};

/// The catalog cache with filtering, hierarchy lookup and progressive search.
pub struct CacheService {
    config: CacheConfig,
    index: CatalogIndex,
    resolver: ProgressiveSearchResolver,
    debouncer: FilterDebouncer,
    hierarchy: Mutex<Option<Arc<HierarchyResolver>>>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("config", &self.config)
            .field("index", &self.index)
            .finish()
    }
}

impl CacheService {
    pub fn new(
        config: CacheConfig,
        primary: SharedPartition,
        overflow: Option<SharedPartition>,
        clock: Arc<dyn Clock>,
        origin: Arc<dyn OriginFetcher>,
    ) -> Result<Self> {
        let store = CacheStore::new(config.clone(), primary, overflow, clock.clone())?;
        let engine = FacetFilterEngine::new(config.parallel_filter_threshold);
        Ok(Self {
            index: CatalogIndex::new(store, origin, clock),
            resolver: ProgressiveSearchResolver::new(engine),
            debouncer: FilterDebouncer::new(config.debounce_window),
            hierarchy: Mutex::new(None),
            config,
        })
    }

    /// A service backed by unbounded in-memory partitions and the wall clock.
    pub fn in_memory(config: CacheConfig, origin: Arc<dyn OriginFetcher>) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryPartition::new("primary")),
            Some(Arc::new(MemoryPartition::new("overflow"))),
            Arc::new(SystemClock),
            origin,
        )
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    pub fn get_entries(&self) -> Result<Arc<Vec<CatalogEntry>>> {
        self.index.get_entries()
    }

    /// Refetches the catalog and drops the category tree so it is refetched too.
    pub fn force_refresh(&self) -> Result<Arc<Vec<CatalogEntry>>> {
        *self.hierarchy.lock() = None;
        self.index.force_refresh()
    }

    pub fn clear(&self) -> Result<()> {
        *self.hierarchy.lock() = None;
        self.index.clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.index.stats()
    }

    pub fn origin_fetches(&self) -> u64 {
        self.index.origin_fetches()
    }

    // -----------------------------------------------------------------------
    // Filtering and search
    // -----------------------------------------------------------------------

    /// Applies `spec` as-is; the search term, if any, is matched exactly.
    pub fn apply(&self, entries: &[CatalogEntry], spec: &FilterSpec) -> Vec<CatalogEntry> {
        self.resolver.engine().apply(entries, spec)
    }

    pub fn search(&self, entries: &[CatalogEntry], term: &str, spec: &FilterSpec) -> SearchOutcome {
        self.resolver.search(entries, term, spec)
    }

    /// Loads the catalog and filters it, relaxing the search term when it
    /// matches nothing.
    pub fn filter(&self, spec: &FilterSpec) -> Result<SearchOutcome> {
        let entries = self.get_entries()?;
        let started = Instant::now();
        let term = spec.active_search_term().unwrap_or_default();
        let outcome = self.resolver.search(&entries, term, spec);
        log::debug!(
            "filtered {} entries to {} (term {:?}, filter_ms={})",
            entries.len(),
            outcome.results.len(),
            outcome.actual_term,
            started.elapsed().as_millis()
        );
        Ok(outcome)
    }

    /// Snapshots the catalog for debounced interactive filtering.
    pub fn filter_session(&self) -> Result<FilterSession> {
        Ok(FilterSession {
            entries: self.get_entries()?,
            resolver: self.resolver,
            debouncer: self.debouncer.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Category hierarchy
    // -----------------------------------------------------------------------

    /// The resolver over the session's category tree, built on first use.
    pub fn hierarchy(&self) -> Result<Arc<HierarchyResolver>> {
        let mut hierarchy = self.hierarchy.lock();
        if let Some(resolver) = hierarchy.as_ref() {
            return Ok(resolver.clone());
        }
        let nodes = self.index.get_category_nodes()?;
        let resolver = Arc::new(HierarchyResolver::new(nodes.iter().cloned()));
        *hierarchy = Some(resolver.clone());
        Ok(resolver)
    }

    pub fn resolve_ancestry(&self, node_id: &str) -> Result<Ancestry> {
        self.hierarchy()?.resolve_ancestry(node_id)
    }

    pub fn find_node(&self, token: &str, scope_parent_id: Option<&str>) -> Result<Option<CategoryNode>> {
        Ok(self.hierarchy()?.find_node(token, scope_parent_id).cloned())
    }

    pub fn resolve_path<S: AsRef<str>>(&self, segments: &[S]) -> Result<Vec<CategoryNode>> {
        Ok(self
            .hierarchy()?
            .resolve_path(segments)
            .into_iter()
            .cloned()
            .collect())
    }
}

/// A catalog snapshot filtered through the shared debouncer.
///
/// Requests from every session of one service supersede each other.
#[derive(Debug, Clone)]
pub struct FilterSession {
    entries: Arc<Vec<CatalogEntry>>,
    resolver: ProgressiveSearchResolver,
    debouncer: FilterDebouncer,
}

impl FilterSession {
    pub fn entries(&self) -> &Arc<Vec<CatalogEntry>> {
        &self.entries
    }

    /// Filters the snapshot once the debounce window passes.
    ///
    /// Returns `None` when a newer request superseded this one.
    pub async fn request(&self, spec: FilterSpec) -> Option<SearchOutcome> {
        let entries = self.entries.clone();
        let resolver = self.resolver;
        self.debouncer
            .run(move |token| {
                let term = spec.active_search_term().unwrap_or_default();
                resolver.search_cancellable(&entries, term, &spec, token)
            })
            .await
    }
}
