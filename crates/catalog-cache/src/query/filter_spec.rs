//! Filter requests.

use bitflags::bitflags;
use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::types::SUB_CATEGORY_LEVELS;

bitflags! {
    /// Stock facet. Set flags are ORed; an empty set means no constraint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StockPredicates: u8 {
        const IN_STOCK = 1 << 0;
        const OUT_OF_STOCK = 1 << 1;
        const ON_SALE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    PriceLow,
    PriceHigh,
    Name,
    #[default]
    Newest,
}

impl SortKey {
    /// Parses the storefront's sort parameter; unknown values sort newest first.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "price-low" | "price_low" | "price-asc" => Self::PriceLow,
            "price-high" | "price_high" | "price-desc" => Self::PriceHigh,
            "name" | "name-asc" => Self::Name,
            _ => Self::Newest,
        }
    }
}

/// A multi-facet filter request. Every facet left unset is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Top-level category id.
    pub top_category: Option<String>,
    /// Subcategory filters for levels 1 through 4, matched by id, slug or name.
    pub sub_category_levels: [Option<String>; SUB_CATEGORY_LEVELS],
    pub brand_ids: FnvHashSet<String>,
    pub search_term: Option<String>,
    /// Inclusive `(min, max)` price bounds.
    pub price_range: Option<(f64, f64)>,
    pub stock: StockPredicates,
    pub sort: SortKey,
}

impl FilterSpec {
    pub fn with_top_category(mut self, id: impl Into<String>) -> Self {
        self.top_category = Some(id.into());
        self
    }

    /// Sets the subcategory filter for `level` (1..=4); other levels are ignored.
    pub fn with_sub_category(mut self, level: usize, value: impl Into<String>) -> Self {
        if let Some(slot) = level
            .checked_sub(1)
            .and_then(|slot| self.sub_category_levels.get_mut(slot))
        {
            *slot = Some(value.into());
        }
        self
    }

    pub fn with_brand(mut self, id: impl Into<String>) -> Self {
        self.brand_ids.insert(id.into());
        self
    }

    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn with_price_range(mut self, min: f64, max: f64) -> Self {
        self.price_range = Some((min, max));
        self
    }

    pub fn with_stock(mut self, stock: StockPredicates) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// The search term, or `None` when it is missing or blank.
    pub fn active_search_term(&self) -> Option<&str> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_term_is_inactive() {
        assert_eq!(FilterSpec::default().active_search_term(), None);
        assert_eq!(
            FilterSpec::default().with_search_term("   ").active_search_term(),
            None
        );
        assert_eq!(
            FilterSpec::default().with_search_term(" bag ").active_search_term(),
            Some("bag")
        );
    }

    #[test]
    fn sub_category_levels_outside_range_are_ignored() {
        let spec = FilterSpec::default()
            .with_sub_category(0, "x")
            .with_sub_category(2, "laptops")
            .with_sub_category(5, "y");
        assert_eq!(
            spec.sub_category_levels,
            [None, Some("laptops".to_string()), None, None]
        );
    }

    #[test]
    fn sort_key_parsing_defaults_to_newest() {
        assert_eq!(SortKey::parse("price-low"), SortKey::PriceLow);
        assert_eq!(SortKey::parse("PRICE-HIGH"), SortKey::PriceHigh);
        assert_eq!(SortKey::parse("name"), SortKey::Name);
        assert_eq!(SortKey::parse("relevance"), SortKey::Newest);
    }

    #[test]
    fn filter_spec_deserializes_with_defaults() {
        let spec: FilterSpec = serde_json::from_str(
            r#"{ "top_category": "c1", "brand_ids": ["b1"], "sort": "price-high" }"#,
        )
        .expect("parse");
        assert_eq!(spec.top_category.as_deref(), Some("c1"));
        assert!(spec.brand_ids.contains("b1"));
        assert_eq!(spec.sort, SortKey::PriceHigh);
        assert!(spec.stock.is_empty());
    }
}
