//! CatalogIndex - cache-first catalog loading.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::origin::OriginFetcher;
use crate::clock::{elapsed_millis, Clock};
use crate::error::{CatalogError, Result};
use crate::storage::{CacheStore, WriteOutcome};
use crate::types::{CacheStats, CatalogEntry, CategoryNode};

/// A catalog fetched during this session.
///
/// Kept so that a fetch whose persistence failed is not repeated on every
/// call while it is still fresh.
#[derive(Debug)]
struct SessionCatalog {
    fetched_at: i64,
    entries: Arc<Vec<CatalogEntry>>,
}

pub struct CatalogIndex {
    store: CacheStore,
    origin: Arc<dyn OriginFetcher>,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<SessionCatalog>>,
    categories: Mutex<Option<Arc<Vec<CategoryNode>>>>,
    origin_fetches: AtomicU64,
}

impl std::fmt::Debug for CatalogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogIndex")
            .field("store", &self.store)
            .field("origin", &"<origin>")
            .field("origin_fetches", &self.origin_fetches())
            .finish()
    }
}

impl CatalogIndex {
    pub fn new(store: CacheStore, origin: Arc<dyn OriginFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            origin,
            clock,
            session: Mutex::new(None),
            categories: Mutex::new(None),
            origin_fetches: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Returns the catalog, preferring the persistent cache.
    ///
    /// Cache read failures never surface here; they fall through to the
    /// origin. Only a catalog fetch failure is returned as an error. A fetch
    /// also loads the category tree when it is not held yet; a tree failure
    /// is logged and retried by the next hierarchy lookup.
    pub fn get_entries(&self) -> Result<Arc<Vec<CatalogEntry>>> {
        if let Some(cached) = self.store.read_envelope() {
            return Ok(Arc::new(cached.entries));
        }
        if let Some(entries) = self.fresh_session_entries() {
            log::debug!("serving session catalog ({} entries)", entries.len());
            return Ok(entries);
        }
        self.fetch_and_persist()
    }

    /// Discards every cached copy and fetches the catalog again.
    pub fn force_refresh(&self) -> Result<Arc<Vec<CatalogEntry>>> {
        self.clear()?;
        self.fetch_and_persist()
    }

    /// Clears the persistent cache and all session copies.
    pub fn clear(&self) -> Result<()> {
        *self.session.lock() = None;
        *self.categories.lock() = None;
        self.store.clear()
    }

    /// Returns the category tree, fetched once per session.
    pub fn get_category_nodes(&self) -> Result<Arc<Vec<CategoryNode>>> {
        let mut categories = self.categories.lock();
        if let Some(nodes) = categories.as_ref() {
            return Ok(nodes.clone());
        }

        let started = Instant::now();
        let nodes: Vec<CategoryNode> = self
            .origin
            .fetch_category_tree()
            .map_err(as_network_failure)?
            .into_iter()
            .map(CategoryNode::from)
            .collect();
        log::info!(
            "fetched category tree ({} nodes, fetch_ms={})",
            nodes.len(),
            started.elapsed().as_millis()
        );

        let nodes = Arc::new(nodes);
        *categories = Some(nodes.clone());
        Ok(nodes)
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Number of catalog fetches issued to the origin so far.
    pub fn origin_fetches(&self) -> u64 {
        self.origin_fetches.load(Ordering::Relaxed)
    }

    fn fresh_session_entries(&self) -> Option<Arc<Vec<CatalogEntry>>> {
        let session = self.session.lock();
        let catalog = session.as_ref()?;
        let age_ms = elapsed_millis(self.clock.now_millis(), catalog.fetched_at);
        (age_ms < self.store.config().ttl_ms()).then(|| catalog.entries.clone())
    }

    fn fetch_and_persist(&self) -> Result<Arc<Vec<CatalogEntry>>> {
        let started = Instant::now();
        self.origin_fetches.fetch_add(1, Ordering::Relaxed);
        let products = self.origin.fetch_catalog().map_err(as_network_failure)?;
        let fetch_ms = started.elapsed().as_millis();

        let entries: Vec<CatalogEntry> = products.into_iter().map(CatalogEntry::from).collect();
        match self.store.write_entries(&entries) {
            Ok(WriteOutcome::Inline { size }) => log::info!(
                "fetched catalog ({} entries, fetch_ms={fetch_ms}), cached inline ({size} bytes)",
                entries.len()
            ),
            Ok(WriteOutcome::Chunked { chunk_count, size }) => log::info!(
                "fetched catalog ({} entries, fetch_ms={fetch_ms}), cached in {chunk_count} chunks ({size} bytes)",
                entries.len()
            ),
            Err(error) => log::warn!(
                "fetched catalog ({} entries) but could not cache it: {error}",
                entries.len()
            ),
        }

        let entries = Arc::new(entries);
        *self.session.lock() = Some(SessionCatalog {
            fetched_at: self.clock.now_millis(),
            entries: entries.clone(),
        });

        if let Err(error) = self.get_category_nodes() {
            log::warn!("fetched catalog but not the category tree: {error}");
        }
        Ok(entries)
    }
}

fn as_network_failure(error: CatalogError) -> CatalogError {
    match error {
        CatalogError::NetworkFetchFailed(_) => error,
        other => CatalogError::NetworkFetchFailed(other.to_string()),
    }
}
