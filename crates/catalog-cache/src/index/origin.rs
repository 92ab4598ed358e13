//! Origin fetcher seam.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{CatalogError, Result};
use crate::types::{OriginCategory, OriginProduct};

/// Source of truth for the catalog and category tree.
///
/// Implementations report transport failures as `NetworkFetchFailed`.
pub trait OriginFetcher: Send + Sync {
    fn fetch_catalog(&self) -> Result<Vec<OriginProduct>>;
    fn fetch_category_tree(&self) -> Result<Vec<OriginCategory>>;
}

/// An origin serving fixed payloads from memory.
///
/// Counts requests and can be switched offline, which makes it useful for
/// embedding a catalog snapshot and for exercising fallback paths.
#[derive(Debug, Default)]
pub struct StaticOrigin {
    products: Mutex<Vec<OriginProduct>>,
    categories: Mutex<Vec<OriginCategory>>,
    offline: AtomicBool,
    catalog_requests: AtomicUsize,
    category_requests: AtomicUsize,
}

impl StaticOrigin {
    pub fn new(products: Vec<OriginProduct>, categories: Vec<OriginCategory>) -> Self {
        Self {
            products: Mutex::new(products),
            categories: Mutex::new(categories),
            ..Self::default()
        }
    }

    pub fn set_products(&self, products: Vec<OriginProduct>) {
        *self.products.lock() = products;
    }

    /// While offline every fetch fails with `NetworkFetchFailed`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn catalog_requests(&self) -> usize {
        self.catalog_requests.load(Ordering::SeqCst)
    }

    pub fn category_requests(&self) -> usize {
        self.category_requests.load(Ordering::SeqCst)
    }

    fn check_online(&self, what: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CatalogError::NetworkFetchFailed(format!(
                "{what} request failed: origin offline"
            )));
        }
        Ok(())
    }
}

impl OriginFetcher for StaticOrigin {
    fn fetch_catalog(&self) -> Result<Vec<OriginProduct>> {
        self.catalog_requests.fetch_add(1, Ordering::SeqCst);
        self.check_online("catalog")?;
        Ok(self.products.lock().clone())
    }

    fn fetch_category_tree(&self) -> Result<Vec<OriginCategory>> {
        self.category_requests.fetch_add(1, Ordering::SeqCst);
        self.check_online("category tree")?;
        Ok(self.categories.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_origin_reports_network_failure() {
        let origin = StaticOrigin::new(
            vec![OriginProduct {
                id: "p1".to_string(),
                ..OriginProduct::default()
            }],
            Vec::new(),
        );
        assert_eq!(origin.fetch_catalog().expect("online").len(), 1);

        origin.set_offline(true);
        let err = origin.fetch_catalog().expect_err("offline");
        assert!(matches!(err, CatalogError::NetworkFetchFailed(_)));
        assert!(origin.fetch_category_tree().is_err());
        assert_eq!(origin.catalog_requests(), 2);
        assert_eq!(origin.category_requests(), 1);
    }
}
