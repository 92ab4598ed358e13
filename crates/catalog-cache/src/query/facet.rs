//! Facet filtering and sorting over catalog entries.

use std::cmp::Ordering;

use fnv::FnvHashSet;
use memchr::memmem::Finder;
use rayon::prelude::*;

use super::filter_spec::{FilterSpec, SortKey, StockPredicates};
use super::normalize::normalize_token;
use crate::cancel::CancellationToken;
use crate::config::DEFAULT_PARALLEL_FILTER_THRESHOLD;
use crate::types::{CatalogEntry, Ref, StockStatus, SUB_CATEGORY_LEVELS};

/// True when the entry can be bought now.
pub fn is_in_stock(entry: &CatalogEntry) -> bool {
    entry.stock_status == Some(StockStatus::Available) || entry.count_in_stock > 0
}

/// True only when the origin explicitly marked the entry out of stock and
/// none are left. An entry with no status and zero stock is neither in nor
/// out of stock.
pub fn is_out_of_stock(entry: &CatalogEntry) -> bool {
    entry.stock_status == Some(StockStatus::OutOfStock) && entry.count_in_stock == 0
}

pub fn is_on_sale(entry: &CatalogEntry) -> bool {
    entry.discount_percent > 0.0 || (entry.offer_price > 0.0 && entry.offer_price < entry.price)
}

/// A subcategory filter value in both raw and normalized form.
#[derive(Debug, Clone)]
struct CategoryToken {
    raw: String,
    normalized: String,
}

impl CategoryToken {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            normalized: normalize_token(raw),
        }
    }

    /// Checks the ref's `{id, normalized slug, normalized name}` set.
    fn matches(&self, value: &Ref) -> bool {
        let id = value.id.as_deref().map(str::to_string);
        let slug = value.slug.as_deref().map(normalize_token);
        let name = value.name.as_deref().map(normalize_token);
        [id, slug, name]
            .into_iter()
            .flatten()
            .filter(|candidate| !candidate.is_empty())
            .any(|candidate| candidate == self.raw || candidate == self.normalized)
    }
}

/// A [`FilterSpec`] prepared for repeated evaluation.
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    top_category: Option<&'a str>,
    levels: [Option<CategoryToken>; SUB_CATEGORY_LEVELS],
    brand_ids: &'a FnvHashSet<String>,
    term: Option<Finder<'static>>,
    price_range: Option<(f64, f64)>,
    stock: StockPredicates,
}

impl<'a> CompiledFilter<'a> {
    pub fn compile(spec: &'a FilterSpec) -> Self {
        let levels = std::array::from_fn(|slot| {
            spec.sub_category_levels[slot]
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(CategoryToken::new)
        });
        let term = spec
            .active_search_term()
            .map(|term| Finder::new(term.to_lowercase().as_bytes()).into_owned());

        Self {
            top_category: spec.top_category.as_deref().filter(|id| !id.is_empty()),
            levels,
            brand_ids: &spec.brand_ids,
            term,
            price_range: spec.price_range,
            stock: spec.stock,
        }
    }

    /// Facets AND together.
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        self.matches_top_category(entry)
            && self.matches_sub_categories(entry)
            && self.matches_brand(entry)
            && self.matches_price(entry)
            && self.matches_stock(entry)
            && self.matches_term(entry)
    }

    fn matches_top_category(&self, entry: &CatalogEntry) -> bool {
        let Some(top) = self.top_category else {
            return true;
        };
        entry.category.as_ref().and_then(Ref::id) == Some(top)
    }

    fn matches_sub_categories(&self, entry: &CatalogEntry) -> bool {
        self.levels.iter().enumerate().all(|(slot, token)| {
            let Some(token) = token else {
                return true;
            };
            let leveled = entry.sub_categories[slot].as_ref();
            // Level 1 also accepts the pre-level single subcategory pointer.
            let legacy = if slot == 0 {
                entry.legacy_sub_category.as_ref()
            } else {
                None
            };
            leveled.into_iter().chain(legacy).any(|value| token.matches(value))
        })
    }

    fn matches_brand(&self, entry: &CatalogEntry) -> bool {
        if self.brand_ids.is_empty() {
            return true;
        }
        entry
            .brand
            .as_ref()
            .and_then(Ref::id)
            .is_some_and(|id| self.brand_ids.contains(id))
    }

    fn matches_price(&self, entry: &CatalogEntry) -> bool {
        match self.price_range {
            Some((min, max)) => min <= entry.price && entry.price <= max,
            None => true,
        }
    }

    /// Set predicates are ORed.
    fn matches_stock(&self, entry: &CatalogEntry) -> bool {
        if self.stock.is_empty() {
            return true;
        }
        (self.stock.contains(StockPredicates::IN_STOCK) && is_in_stock(entry))
            || (self.stock.contains(StockPredicates::OUT_OF_STOCK) && is_out_of_stock(entry))
            || (self.stock.contains(StockPredicates::ON_SALE) && is_on_sale(entry))
    }

    fn matches_term(&self, entry: &CatalogEntry) -> bool {
        let Some(finder) = self.term.as_ref() else {
            return true;
        };
        let contains = |field: &str| finder.find(field.to_lowercase().as_bytes()).is_some();
        contains(&entry.name)
            || contains(&entry.description)
            || entry.brand_name().is_some_and(contains)
            || contains(&entry.sku)
    }
}

/// Stable ordering: in-stock entries first, then by `sort`.
pub fn sort_entries(entries: &mut [CatalogEntry], sort: SortKey) {
    entries.sort_by(|a, b| {
        is_in_stock(b)
            .cmp(&is_in_stock(a))
            .then_with(|| compare_by_key(a, b, sort))
    });
}

fn compare_by_key(a: &CatalogEntry, b: &CatalogEntry, sort: SortKey) -> Ordering {
    match sort {
        SortKey::PriceLow => a.price.total_cmp(&b.price),
        SortKey::PriceHigh => b.price.total_cmp(&a.price),
        SortKey::Name => a
            .name
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.name.chars().flat_map(char::to_lowercase)),
        SortKey::Newest => b.created_at.cmp(&a.created_at),
    }
}

/// Applies a [`FilterSpec`] to an in-memory catalog.
#[derive(Debug, Clone, Copy)]
pub struct FacetFilterEngine {
    parallel_threshold: usize,
}

impl Default for FacetFilterEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_FILTER_THRESHOLD)
    }
}

impl FacetFilterEngine {
    /// Catalogs with at least `parallel_threshold` entries are scanned on the
    /// rayon pool.
    pub fn new(parallel_threshold: usize) -> Self {
        Self {
            parallel_threshold: parallel_threshold.max(1),
        }
    }

    pub fn apply(&self, entries: &[CatalogEntry], spec: &FilterSpec) -> Vec<CatalogEntry> {
        self.apply_cancellable(entries, spec, &CancellationToken::noop())
            .unwrap_or_default()
    }

    /// Like [`apply`](Self::apply), but returns `None` once `token` is superseded.
    pub fn apply_cancellable(
        &self,
        entries: &[CatalogEntry],
        spec: &FilterSpec,
        token: &CancellationToken,
    ) -> Option<Vec<CatalogEntry>> {
        let filter = CompiledFilter::compile(spec);

        let mut matched: Vec<CatalogEntry> = if entries.len() >= self.parallel_threshold {
            token.is_cancelled()?;
            entries
                .par_iter()
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect()
        } else {
            let mut matched = Vec::new();
            for (i, entry) in entries.iter().enumerate() {
                token.is_cancelled_sparse(i)?;
                if filter.matches(entry) {
                    matched.push(entry.clone());
                }
            }
            matched
        };

        token.is_cancelled()?;
        sort_entries(&mut matched, spec.sort);
        Some(matched)
    }
}
