//! Catalog index module.
//!
//! The index answers "give me the catalog" from the persistent cache when it
//! can and from the origin when it must.
//!
//! ## Module Structure
//!
//! - `origin` - The `OriginFetcher` seam and an in-memory origin
//! - `catalog` - `CatalogIndex`: cache-first loading, refresh and diagnostics

mod catalog;
mod origin;

pub use catalog::CatalogIndex;
pub use origin::{OriginFetcher, StaticOrigin};
