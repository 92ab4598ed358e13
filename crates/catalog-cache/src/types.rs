//! Catalog data model.
//!
//! Origin payloads (`OriginProduct`, `OriginCategory`) reference brands and
//! categories either by bare id or by populated object. Both shapes are folded
//! into [`Ref`] here, at ingestion, so nothing downstream looks at raw shapes.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thin_vec::ThinVec;

/// Number of nested subcategory levels below a top-level category.
pub const SUB_CATEGORY_LEVELS: usize = 4;

/// Product availability as reported by the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    Available,
    OutOfStock,
    PreOrder,
}

impl StockStatus {
    /// Parses the origin's free-form status strings.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "available" | "instock" => Some(Self::Available),
            "outofstock" | "soldout" | "unavailable" => Some(Self::OutOfStock),
            "preorder" => Some(Self::PreOrder),
            _ => None,
        }
    }
}

/// Normalized pointer to a brand, category or subcategory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub id: Option<String>,
    pub slug: Option<String>,
    pub name: Option<String>,
}

impl Ref {
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            slug: None,
            name: None,
        }
    }

    pub fn new(id: impl Into<String>, slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            slug: Some(slug.into()),
            name: Some(name.into()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.slug.is_none() && self.name.is_none()
    }
}

/// One product's cached projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price: f64,
    pub offer_price: f64,
    pub brand: Option<Ref>,
    /// Top-level category.
    pub category: Option<Ref>,
    /// Single subcategory pointer used before leveled subcategories existed.
    pub legacy_sub_category: Option<Ref>,
    /// Subcategory refs for levels 1 through 4.
    pub sub_categories: [Option<Ref>; SUB_CATEGORY_LEVELS],
    pub count_in_stock: u32,
    pub stock_status: Option<StockStatus>,
    pub discount_percent: f64,
    pub featured: bool,
    pub slug: String,
    pub image: Option<String>,
    pub gallery_images: ThinVec<String>,
    pub rating: f32,
    pub num_reviews: u32,
    /// Unix millis; drives the `newest` sort.
    pub created_at: i64,
}

impl CatalogEntry {
    /// Returns true when every field the current reader relies on is populated.
    ///
    /// Entries written by an older build that predates a field decode with it
    /// empty, which is how schema drift shows up without a version bump.
    pub fn has_required_fields(&self) -> bool {
        !self.id.is_empty() && !self.sku.is_empty()
    }

    pub fn brand_name(&self) -> Option<&str> {
        self.brand.as_ref().and_then(|brand| brand.name.as_deref())
    }

    /// Returns the ref stored for subcategory `level` (1..=4).
    pub fn sub_category(&self, level: usize) -> Option<&Ref> {
        level
            .checked_sub(1)
            .and_then(|slot| self.sub_categories.get(slot))
            .and_then(Option::as_ref)
    }
}

/// A category (level 0) or nested subcategory (levels 1-4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub parent_category_id: Option<String>,
    pub parent_sub_category_id: Option<String>,
    pub level: u8,
}

impl CategoryNode {
    /// Next node up: the subcategory parent wins over the category parent.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_sub_category_id
            .as_deref()
            .or(self.parent_category_id.as_deref())
    }

    pub fn is_child_of(&self, parent_id: &str) -> bool {
        self.parent_sub_category_id.as_deref() == Some(parent_id)
            || self.parent_category_id.as_deref() == Some(parent_id)
    }

    pub fn to_ref(&self) -> Ref {
        Ref::new(self.id.clone(), self.slug.clone(), self.name.clone())
    }
}

/// Diagnostics snapshot of the persistent cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub has_cache: bool,
    pub item_count: usize,
    pub age_ms: Option<u64>,
    pub is_valid: bool,
    pub is_chunked: bool,
    pub chunk_count: u32,
}

// ---------------------------------------------------------------------------
// Origin wire shapes
// ---------------------------------------------------------------------------

/// A reference as the origin sends it: a bare id or a populated object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRef {
    Id(String),
    Object(RawRefObject),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRefObject {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<RawRef> for Ref {
    fn from(raw: RawRef) -> Self {
        match raw {
            RawRef::Id(id) => Ref::from_id(id),
            RawRef::Object(object) => Ref {
                id: object.id,
                slug: object.slug,
                name: object.name,
            },
        }
    }
}

fn normalize_ref(raw: Option<RawRef>) -> Option<Ref> {
    let value = Ref::from(raw?);
    (!value.is_empty()).then_some(value)
}

fn normalize_ref_id(raw: Option<RawRef>) -> Option<String> {
    normalize_ref(raw).and_then(|value| value.id)
}

/// Origin timestamps arrive either as unix millis or as RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            Self::Millis(value) => Some(*value),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|value| value.timestamp_millis()),
        }
    }
}

/// A product as served by the origin catalog endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OriginProduct {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price: f64,
    pub offer_price: f64,
    pub brand: Option<RawRef>,
    pub category: Option<RawRef>,
    pub sub_category: Option<RawRef>,
    pub sub_category_level1: Option<RawRef>,
    pub sub_category_level2: Option<RawRef>,
    pub sub_category_level3: Option<RawRef>,
    pub sub_category_level4: Option<RawRef>,
    pub count_in_stock: i64,
    pub stock_status: Option<String>,
    pub discount: f64,
    pub featured: bool,
    pub slug: String,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub rating: f32,
    pub num_reviews: u32,
    pub created_at: Option<RawTimestamp>,
}

impl From<OriginProduct> for CatalogEntry {
    fn from(product: OriginProduct) -> Self {
        let stock_status = product.stock_status.as_deref().and_then(StockStatus::parse);
        let created_at = product
            .created_at
            .as_ref()
            .and_then(RawTimestamp::to_millis)
            .unwrap_or(0);
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            sku: product.sku,
            price: product.price,
            offer_price: product.offer_price,
            brand: normalize_ref(product.brand),
            category: normalize_ref(product.category),
            legacy_sub_category: normalize_ref(product.sub_category),
            sub_categories: [
                normalize_ref(product.sub_category_level1),
                normalize_ref(product.sub_category_level2),
                normalize_ref(product.sub_category_level3),
                normalize_ref(product.sub_category_level4),
            ],
            count_in_stock: u32::try_from(product.count_in_stock.max(0)).unwrap_or(u32::MAX),
            stock_status,
            discount_percent: product.discount,
            featured: product.featured,
            slug: product.slug,
            image: product.image,
            gallery_images: product.images.into_iter().collect(),
            rating: product.rating,
            num_reviews: product.num_reviews,
            created_at,
        }
    }
}

/// A category or subcategory as served by the origin category tree endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OriginCategory {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub slug: String,
    pub parent_category: Option<RawRef>,
    pub parent_sub_category: Option<RawRef>,
    pub level: u8,
}

impl From<OriginCategory> for CategoryNode {
    fn from(category: OriginCategory) -> Self {
        Self {
            id: category.id,
            name: category.name,
            slug: category.slug,
            parent_category_id: normalize_ref_id(category.parent_category),
            parent_sub_category_id: normalize_ref_id(category.parent_sub_category),
            level: category.level,
        }
    }
}
