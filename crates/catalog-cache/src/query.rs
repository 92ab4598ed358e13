//! Catalog filtering and search.
//!
//! This module provides:
//! - Token normalization for slugs, names and URL segments
//! - Filter requests (`FilterSpec`) with stock predicates and sort keys
//! - The facet engine, which compiles a request once and scans the catalog
//! - Progressive search, which relaxes a term until something matches

mod facet;
mod filter_spec;
mod normalize;
mod progressive;

pub use facet::{
    is_in_stock, is_on_sale, is_out_of_stock, sort_entries, CompiledFilter, FacetFilterEngine,
};
pub use filter_spec::{FilterSpec, SortKey, StockPredicates};
pub use normalize::{normalize_token, normalize_whitespace};
pub use progressive::{
    CandidateTerms, ProgressiveSearchResolver, SearchOutcome, MIN_CHAR_CANDIDATE_LEN,
};
