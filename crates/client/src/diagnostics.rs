//! Server reachability and endpoint probes.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::api::{AuthApi, CatalogApi, FavoritesApi, ProductQuery};
use crate::error::ApiError;
use crate::http::{ApiClient, TimeoutClass};

/// Result of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// Which endpoint was called.
    pub endpoint: String,
    /// A short summary of the response, or the error message.
    pub outcome: Result<String, String>,
}

impl ProbeReport {
    fn new<T>(endpoint: &str, result: Result<T, ApiError>, summarize: impl FnOnce(T) -> String) -> Self {
        let outcome = match result {
            Ok(value) => Ok(summarize(value)),
            Err(e) => {
                warn!(endpoint, error = %e, "Probe failed");
                Err(e.to_string())
            }
        };
        Self {
            endpoint: endpoint.to_string(),
            outcome,
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Check that the backend answers.
///
/// Tries the health path first and falls back to the CSRF handshake path,
/// which every deployment serves. Returns the path that answered.
///
/// # Errors
///
/// Returns the error from the last path tried when neither answers.
#[instrument(skip(client))]
pub async fn check_server(client: &ApiClient) -> Result<String, ApiError> {
    let paths = &client.config().paths;

    match client.ping(&paths.health, TimeoutClass::Handshake).await {
        Ok(()) => {
            info!(path = %paths.health, "Server is reachable");
            return Ok(paths.health.clone());
        }
        Err(e) => warn!(error = %e, "Health check failed, trying handshake path"),
    }

    client.ping(&paths.handshake, TimeoutClass::Handshake).await?;
    info!(path = %paths.handshake, "Server is reachable");
    Ok(paths.handshake.clone())
}

/// Call each read endpoint once and report how it went.
///
/// The profile endpoint is included only when a token is stored, since it
/// can only answer 401 otherwise.
pub async fn probe_endpoints(
    auth: &AuthApi,
    catalog: &CatalogApi,
    favorites: &FavoritesApi,
) -> Vec<ProbeReport> {
    let mut reports = vec![
        ProbeReport::new("categories", catalog.categories().await, |c| {
            format!("{} categories", c.len())
        }),
        ProbeReport::new(
            "products",
            catalog.products(&ProductQuery::default()).await,
            |page| {
                format!(
                    "{} products (page {} of {}, {} total)",
                    page.data.len(),
                    page.meta.current_page,
                    page.meta.last_page,
                    page.meta.total
                )
            },
        ),
        ProbeReport::new("trending", catalog.trending().await, |p| {
            format!("{} products", p.len())
        }),
        ProbeReport::new("favorites", favorites.list(None).await, |page| {
            format!("{} favorites", page.data.len())
        }),
    ];

    match auth.client().vault().token().await {
        Ok(Some(_)) => reports.push(ProbeReport::new("profile", auth.profile().await, |u| {
            format!("signed in as {}", u.username)
        })),
        Ok(None) => {}
        Err(e) => reports.push(ProbeReport::new::<()>("profile", Err(e.into()), |()| String::new())),
    }

    reports
}
