//! Bazaar client library.
//!
//! Everything a marketplace front end needs below the UI:
//!
//! - [`http`] - `reqwest` wrapper with bearer injection, timeouts and error
//!   normalization
//! - [`storage`] - Persisted token and cached user
//! - [`session`] - Observable authentication state
//! - [`api`] - Typed auth, catalog and favorites services
//! - [`guard`] - Route guard driven by the session
//! - [`resource`] - Async values with loading and error state
//! - [`diagnostics`] - Reachability checks
//!
//! [`Marketplace`] wires the pieces together over one shared client.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod guard;
pub mod http;
pub mod resource;
pub mod session;
pub mod storage;

pub use api::{AuthApi, CatalogApi, FavoritesApi};
pub use config::{ClientConfig, ConfigError};
pub use error::ApiError;
pub use guard::RouteGuard;
pub use http::{ApiClient, TimeoutClass};
pub use resource::{Readiness, Resource};
pub use session::{SessionSnapshot, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, SessionVault};

use std::sync::Arc;

/// The client, session and services, sharing one connection pool and vault.
#[derive(Debug, Clone)]
pub struct Marketplace {
    pub client: ApiClient,
    pub session: SessionStore,
    pub auth: AuthApi,
    pub catalog: CatalogApi,
    pub favorites: FavoritesApi,
}

impl Marketplace {
    /// Build everything over `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: &ClientConfig, storage: Arc<dyn SessionStorage>) -> Result<Self, ApiError> {
        let client = ApiClient::new(config, SessionVault::new(storage))?;
        let catalog = CatalogApi::new(client.clone());

        Ok(Self {
            session: SessionStore::create(client.clone(), config),
            auth: AuthApi::new(client.clone()),
            favorites: FavoritesApi::new(client.clone(), catalog.clone()),
            catalog,
            client,
        })
    }

    /// A resource that waits for the initial session check.
    pub fn resource<T, F, Fut>(&self, initial: T, fetch: F) -> Resource<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Resource::new(Arc::new(self.session.clone()), initial, fetch)
    }
}
