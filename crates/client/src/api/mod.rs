//! Typed services over [`ApiClient`](crate::http::ApiClient).
//!
//! - [`AuthApi`]: CSRF handshake, login, register, logout, profile
//! - [`CatalogApi`]: categories, products, trending, listing creation
//! - [`FavoritesApi`]: toggle and list favorites
//!
//! Auth endpoints are configured as ordered path lists. A call moves on to
//! the next path only when the server says the endpoint does not exist
//! (404/405); any other failure is final.

mod auth;
mod catalog;
pub(crate) mod envelope;
mod favorites;

pub use auth::{AuthApi, AuthGrant, NewAccount};
pub use catalog::{CatalogApi, ImageUpload, NewProduct, ProductQuery};
pub use envelope::PLACEHOLDER_IMAGE;
pub use favorites::FavoritesApi;

use std::future::Future;

use tracing::debug;

use crate::error::ApiError;

/// Call `request` with each path in turn until one exists.
pub(crate) async fn with_fallback<T, F, Fut>(paths: &[String], mut request: F) -> Result<T, ApiError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut last_error = None;

    for path in paths {
        match request(path.clone()).await {
            Err(e) if e.is_missing_endpoint() => {
                debug!(path = %path, error = %e, "Endpoint missing, trying next path");
                last_error = Some(e);
            }
            result => return result,
        }
    }

    Err(last_error
        .unwrap_or_else(|| ApiError::InvalidRequest("no endpoint paths configured".to_string())))
}

/// Reject ids that would change the shape of a request path.
pub(crate) fn path_segment(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(ApiError::InvalidRequest(format!("invalid id {id:?}")));
    }
    Ok(id)
}
