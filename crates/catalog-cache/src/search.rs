//! Catalog service and request coalescing.
//!
//! This module provides:
//! - `FilterDebouncer`, which coalesces bursts of filter requests and drops
//!   superseded results
//! - `CacheService`, the entry point tying cache, hierarchy and search together
//! - `FilterSession`, a catalog snapshot paired with the debouncer

mod debounce;
mod service;

pub use debounce::FilterDebouncer;
pub use service::{CacheService, FilterSession};
