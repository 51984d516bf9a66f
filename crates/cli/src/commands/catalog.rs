//! Catalog and favorites commands.

use bazaar_client::Marketplace;
use bazaar_client::api::ProductQuery;
use bazaar_core::{CategoryId, ProductId};
use serde_json::json;

use super::{CliError, print_json};

/// List categories.
pub async fn categories(market: &Marketplace) -> Result<(), CliError> {
    print_json(&market.catalog.categories().await?)
}

/// List one page of products.
pub async fn products(
    market: &Marketplace,
    page: Option<u32>,
    limit: Option<u32>,
    category: Option<String>,
    query: Option<String>,
) -> Result<(), CliError> {
    let query = ProductQuery {
        page,
        limit,
        category_id: category.map(CategoryId::new),
        query,
    };
    print_json(&market.catalog.products(&query).await?)
}

/// Show one product.
pub async fn product(market: &Marketplace, id: &str) -> Result<(), CliError> {
    let id = product_id(id)?;
    print_json(&market.catalog.product(&id).await?)
}

/// Trending products.
pub async fn trending(market: &Marketplace) -> Result<(), CliError> {
    print_json(&market.catalog.trending().await?)
}

/// List favorites.
pub async fn favorites(market: &Marketplace, page: Option<u32>) -> Result<(), CliError> {
    print_json(&market.favorites.list(page).await?)
}

/// Toggle a favorite and print the state the server ended up with.
pub async fn toggle_favorite(market: &Marketplace, id: &str) -> Result<(), CliError> {
    let id = product_id(id)?;
    let is_favorite = market.favorites.toggle(&id).await?;
    print_json(&json!({ "product_id": id, "is_favorite": is_favorite }))
}

fn product_id(raw: &str) -> Result<ProductId, CliError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CliError::InvalidArgument("product id must not be empty".to_string()));
    }
    Ok(ProductId::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_trims_and_rejects_blank() {
        assert!(matches!(product_id("  "), Err(CliError::InvalidArgument(_))));
        assert!(matches!(product_id(" 42 "), Ok(id) if id.as_str() == "42"));
    }
}
