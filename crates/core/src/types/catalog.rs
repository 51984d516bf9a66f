//! Catalog types: categories, products and pagination.
//!
//! These are the canonical shapes every backend envelope is normalized into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CategoryId, ProductId, UserId};
use super::price::Price;

// =============================================================================
// Category
// =============================================================================

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category id, stringified.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Optional blurb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Category {
    /// Create a category without a description.
    #[must_use]
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// The account that listed a product.
///
/// The backend embeds whatever user columns it likes here, so every field
/// is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Seller {
    /// Seller user id.
    pub id: Option<UserId>,
    /// Seller display name.
    pub username: Option<String>,
}

/// A marketplace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product id, stringified.
    pub id: ProductId,
    /// Listing title.
    pub title: String,
    /// Listing description (empty when absent).
    pub description: String,
    /// Asking price.
    pub price: Price,
    /// All image URLs, in display order.
    pub images: Vec<String>,
    /// Primary image to show in grids.
    pub image_url: String,
    /// Whether the current user has favorited this listing.
    ///
    /// Server truth as of the last fetch or confirmed toggle.
    pub is_favorite: bool,
    /// Category the listing belongs to.
    pub category: Option<Category>,
    /// Who listed it.
    pub user: Option<Seller>,
    /// When it was listed.
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Pagination
// =============================================================================

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// 1-indexed page number.
    pub current_page: u32,
    /// Last available page.
    pub last_page: u32,
    /// Page size.
    pub per_page: u32,
    /// Total number of items across all pages.
    pub total: u64,
}

impl PageMeta {
    /// Metadata for a response that is not paginated at all.
    #[must_use]
    pub fn single(len: usize) -> Self {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        Self {
            current_page: 1,
            last_page: 1,
            per_page: len,
            total: u64::from(len),
        }
    }

    /// Whether another page follows this one.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.current_page < self.last_page
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

impl<T> Page<T> {
    /// Wrap an unpaginated list.
    #[must_use]
    pub fn single(data: Vec<T>) -> Self {
        let meta = PageMeta::single(data.len());
        Self { data, meta }
    }

    /// Whether the page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::single(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_page_meta() {
        let page = Page::single(vec![1, 2, 3]);
        assert_eq!(page.meta.current_page, 1);
        assert_eq!(page.meta.last_page, 1);
        assert_eq!(page.meta.total, 3);
        assert!(!page.meta.has_next());
    }

    #[test]
    fn test_has_next() {
        let meta = PageMeta {
            current_page: 1,
            last_page: 4,
            per_page: 10,
            total: 35,
        };
        assert!(meta.has_next());
    }

    #[test]
    fn test_default_page_is_empty() {
        let page: Page<Category> = Page::default();
        assert!(page.is_empty());
    }
}
