//! Catalog endpoints: categories, products, listing creation.
//!
//! Single products are cached for 60 seconds via `moka`; favorite toggles
//! evict the affected entry.

use std::time::Duration;

use bazaar_core::{Category, CategoryId, Page, Price, Product, ProductId};
use moka::future::Cache;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::envelope::{ItemEnvelope, ListEnvelope, PageEnvelope, WireCategory, WireProduct, decode};
use super::path_segment;
use crate::error::ApiError;
use crate::http::{ApiClient, TimeoutClass};

const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Filters for product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(rename = "categoryId", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    /// Free-text search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// An image attached to a new listing.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A listing to publish.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: Price,
    pub category_id: CategoryId,
    pub images: Vec<ImageUpload>,
}

impl NewProduct {
    fn into_form(self) -> Result<Form, ApiError> {
        let mut form = Form::new()
            .text("title", self.title)
            .text("description", self.description)
            .text("price", self.price.amount().to_string())
            .text("category_id", self.category_id.to_string());

        for image in self.images {
            let part = Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.mime_type)
                .map_err(|e| ApiError::InvalidRequest(format!("invalid image type: {e}")))?;
            form = form.part("images[]", part);
        }

        Ok(form)
    }
}

/// Catalog API.
#[derive(Clone)]
pub struct CatalogApi {
    client: ApiClient,
    products: Cache<ProductId, Product>,
}

impl CatalogApi {
    /// Create the service over a shared client.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let products = Cache::builder()
            .max_capacity(1000)
            .time_to_live(PRODUCT_CACHE_TTL)
            .build();

        Self { client, products }
    }

    /// All categories.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let response: Value = self
            .client
            .get(&self.client.config().paths.categories, TimeoutClass::Standard)
            .await?;

        let categories: Vec<Category> = decode::<ListEnvelope<WireCategory>>(response, "categories")?
            .into_vec()
            .into_iter()
            .map(Category::from)
            .collect();
        debug!(count = categories.len(), "Fetched categories");
        Ok(categories)
    }

    /// One page of products.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Page<Product>, ApiError> {
        let response: Value = self
            .client
            .get_query(&self.client.config().paths.products, query, TimeoutClass::Standard)
            .await?;

        let page = decode::<PageEnvelope<WireProduct>>(response, "products")?.into_page(query.page);
        debug!(
            count = page.data.len(),
            page = page.meta.current_page,
            last_page = page.meta.last_page,
            "Fetched products"
        );
        Ok(page)
    }

    /// One product, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Product, ApiError> {
        if let Some(product) = self.products.get(id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let path = format!(
            "{}/{}",
            self.client.config().paths.products.trim_end_matches('/'),
            path_segment(id.as_str())?
        );
        let response: Value = self.client.get(&path, TimeoutClass::Standard).await?;
        let product: Product = decode::<ItemEnvelope<WireProduct>>(response, "product")?
            .into_inner()
            .into();

        self.products.insert(id.clone(), product.clone()).await;
        Ok(product)
    }

    /// Currently trending products.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self))]
    pub async fn trending(&self) -> Result<Vec<Product>, ApiError> {
        let response: Value = self
            .client
            .get(&self.client.config().paths.trending, TimeoutClass::Standard)
            .await?;

        Ok(decode::<ListEnvelope<WireProduct>>(response, "trending")?
            .into_vec()
            .into_iter()
            .map(Product::from)
            .collect())
    }

    /// Publish a listing with its images.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` for an unusable image type, or the
    /// normalized error for the failed request.
    #[instrument(skip(self, product), fields(title = %product.title, images = product.images.len()))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, ApiError> {
        let form = product.into_form()?;
        let response: Value = self
            .client
            .post_multipart(&self.client.config().paths.products, form, TimeoutClass::Standard)
            .await?;

        let created: Product = decode::<ItemEnvelope<WireProduct>>(response, "created product")?
            .into_inner()
            .into();
        self.products.insert(created.id.clone(), created.clone()).await;
        Ok(created)
    }

    /// Drop a cached product so the next read goes to the server.
    pub async fn invalidate_product(&self, id: &ProductId) {
        self.products.invalidate(id).await;
    }
}

impl std::fmt::Debug for CatalogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogApi")
            .field("client", &self.client)
            .field("cached_products", &self.products.entry_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::SessionVault;
    use rust_decimal::Decimal;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog_for(server: &MockServer) -> CatalogApi {
        let config = ClientConfig::new(Url::parse(&server.uri()).unwrap());
        CatalogApi::new(ApiClient::new(&config, SessionVault::in_memory()).unwrap())
    }

    #[tokio::test]
    async fn test_categories_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": 1, "name": "Shoes"}]})),
            )
            .mount(&server)
            .await;

        let categories = catalog_for(&server).categories().await.unwrap();
        assert_eq!(categories, vec![Category::new("1", "Shoes")]);
    }

    #[tokio::test]
    async fn test_products_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "10"))
            .and(query_param("categoryId", "3"))
            .and(query_param("query", "red shoes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": 11, "title": "Red shoes", "price": 25}],
                "page": 2,
                "totalPages": 3,
                "limit": 10,
                "total": 21
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = ProductQuery {
            page: Some(2),
            limit: Some(10),
            category_id: Some(CategoryId::new("3")),
            query: Some("red shoes".to_string()),
        };
        let page = catalog_for(&server).products(&query).await.unwrap();
        assert_eq!(page.data[0].title, "Red shoes");
        assert_eq!(page.meta.current_page, 2);
        assert!(page.meta.has_next());
    }

    #[tokio::test]
    async fn test_product_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": 42, "title": "Desk", "price": "120.00"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        let id = ProductId::new("42");

        let first = catalog.product(&id).await.unwrap();
        let second = catalog.product(&id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.price.amount(), Decimal::new(12000, 2));

        catalog.invalidate_product(&id).await;
        catalog.product(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_product_rejects_path_ids() {
        let server = MockServer::start().await;
        let err = catalog_for(&server)
            .product(&ProductId::new("../users"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_trending_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/trending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "Lamp", "images": ["https://cdn/lamp.jpg"]}
            ])))
            .mount(&server)
            .await;

        let trending = catalog_for(&server).trending().await.unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].image_url, "https://cdn/lamp.jpg");
    }

    #[tokio::test]
    async fn test_create_product_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {"id": 99, "title": "Bike", "price": 300}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = catalog_for(&server)
            .create_product(NewProduct {
                title: "Bike".to_string(),
                description: "Barely used".to_string(),
                price: Price::new(Decimal::new(300, 0)),
                category_id: CategoryId::new("4"),
                images: vec![ImageUpload {
                    file_name: "bike.jpg".to_string(),
                    mime_type: "image/jpeg".to_string(),
                    bytes: vec![0xFF, 0xD8, 0xFF],
                }],
            })
            .await
            .unwrap();
        assert_eq!(created.id.as_str(), "99");
    }

    #[test]
    fn test_query_serialization_skips_unset() {
        let query = ProductQuery {
            page: Some(1),
            ..ProductQuery::default()
        };
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"page": 1}));
    }
}
