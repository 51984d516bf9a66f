//! Favorites endpoints.

use bazaar_core::{Page, Product, ProductId};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::catalog::CatalogApi;
use super::envelope::{PageEnvelope, WireProduct, decode, truthy};
use super::path_segment;
use crate::error::ApiError;
use crate::http::{ApiClient, TimeoutClass};

/// Keys the backend has used to report the resulting favorite state.
const STATE_KEYS: [&str; 4] = ["is_favorite", "isFavorite", "favorited", "attached"];

/// Upper bound on pages read when confirming a toggle.
const MAX_CONFIRM_PAGES: u32 = 20;

/// Favorites API.
#[derive(Debug, Clone)]
pub struct FavoritesApi {
    client: ApiClient,
    catalog: CatalogApi,
}

impl FavoritesApi {
    /// Create the service. `catalog` is used to evict stale products.
    #[must_use]
    pub const fn new(client: ApiClient, catalog: CatalogApi) -> Self {
        Self { client, catalog }
    }

    /// Toggle a product's favorite state.
    ///
    /// Returns the state the server ended up with, not the state the caller
    /// hoped for: read from the response when it says, otherwise confirmed
    /// against the favorites list.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn toggle(&self, product_id: &ProductId) -> Result<bool, ApiError> {
        let path = format!(
            "{}/{}",
            self.client.config().paths.favorites.trim_end_matches('/'),
            path_segment(product_id.as_str())?
        );
        let response: Value = self.client.post_empty(&path, TimeoutClass::Standard).await?;
        self.catalog.invalidate_product(product_id).await;

        if let Some(state) = reported_state(&response) {
            debug!(is_favorite = state, "Server reported favorite state");
            return Ok(state);
        }

        warn!("Toggle response did not report a state, confirming against favorites");
        self.contains(product_id).await
    }

    /// One page of the user's favorites.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self))]
    pub async fn list(&self, page: Option<u32>) -> Result<Page<Product>, ApiError> {
        let path = &self.client.config().paths.favorites;
        let response: Value = match page {
            Some(page) => {
                self.client
                    .get_query(path, &[("page", page)], TimeoutClass::Standard)
                    .await?
            }
            None => self.client.get(path, TimeoutClass::Standard).await?,
        };

        let mut favorites: Page<Product> =
            decode::<PageEnvelope<WireProduct>>(response, "favorites")?.into_page(page);
        for product in &mut favorites.data {
            product.is_favorite = true;
        }
        Ok(favorites)
    }

    async fn contains(&self, product_id: &ProductId) -> Result<bool, ApiError> {
        let mut page = 1;
        loop {
            let favorites = self.list(Some(page)).await?;
            if favorites.data.iter().any(|p| &p.id == product_id) {
                return Ok(true);
            }
            if !favorites.meta.has_next() || page >= MAX_CONFIRM_PAGES {
                return Ok(false);
            }
            page += 1;
        }
    }
}

/// The favorite state in a toggle response, at the top level or under `data`.
fn reported_state(response: &Value) -> Option<bool> {
    let candidates = [Some(response), response.get("data")];
    candidates.into_iter().flatten().find_map(|object| {
        STATE_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(truthy))
    })
}
