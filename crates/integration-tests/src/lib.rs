//! Integration tests for the Bazaar client.
//!
//! Every scenario runs the real client stack (HTTP wrapper, session store,
//! services) against a `wiremock` backend, so no server or network access is
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - Login, registration, logout and session restore
//! - `http_errors` - 401 purge and validation messages
//! - `route_guard` - Guard decisions driven by a live session
//! - `catalog` - Envelope normalization and favorites

use std::sync::Arc;
use std::time::Duration;

use bazaar_client::{ClientConfig, Marketplace, MemoryStorage, SessionStorage, SessionSnapshot};
use bazaar_core::User;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Storage key of the persisted token.
pub const TOKEN_KEY: &str = "access_token";
/// Storage key of the cached user.
pub const USER_KEY: &str = "user";

/// A mock backend and a marketplace client pointed at it.
pub struct TestContext {
    pub server: MockServer,
    pub config: ClientConfig,
    pub storage: Arc<MemoryStorage>,
    pub market: Marketplace,
}

impl TestContext {
    /// Start a mock backend and a client with empty storage.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let base_url = Url::parse(&server.uri()).unwrap_or_else(|e| panic!("mock uri: {e}"));
        Self::with_base_url(server, base_url)
    }

    /// A client pointed at a port nothing listens on.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    pub async fn offline() -> Self {
        let server = MockServer::start().await;
        let base_url = Url::parse("http://127.0.0.1:1").unwrap_or_else(|e| panic!("url: {e}"));
        Self::with_base_url(server, base_url)
    }

    fn with_base_url(server: MockServer, base_url: Url) -> Self {
        let mut config = ClientConfig::new(base_url);
        config.timeouts.handshake = Duration::from_secs(2);
        config.timeouts.auth = Duration::from_secs(5);
        config.timeouts.default = Duration::from_secs(5);

        let storage = Arc::new(MemoryStorage::new());
        let market = Marketplace::new(&config, Arc::clone(&storage) as Arc<dyn SessionStorage>)
            .unwrap_or_else(|e| panic!("client: {e}"));

        Self {
            server,
            config,
            storage,
            market,
        }
    }

    /// Store a session as a previous run would have left it.
    ///
    /// # Panics
    ///
    /// Panics if storage fails.
    pub async fn seed_session(&self, token: &str, user: &User) {
        self.market
            .client
            .vault()
            .persist(&SecretString::from(token), user)
            .await
            .unwrap_or_else(|e| panic!("seed: {e}"));
    }

    /// The persisted token, raw.
    ///
    /// # Panics
    ///
    /// Panics if storage fails.
    pub async fn stored_token(&self) -> Option<String> {
        self.storage
            .get(TOKEN_KEY)
            .await
            .unwrap_or_else(|e| panic!("storage: {e}"))
    }

    /// The cached user, raw.
    ///
    /// # Panics
    ///
    /// Panics if storage fails.
    pub async fn stored_user(&self) -> Option<String> {
        self.storage
            .get(USER_KEY)
            .await
            .unwrap_or_else(|e| panic!("storage: {e}"))
    }

    /// Check that the published snapshot agrees with storage.
    ///
    /// # Panics
    ///
    /// Panics when the snapshot claims a user without a stored token, or the
    /// other way round.
    pub async fn assert_consistent(&self) -> SessionSnapshot {
        let snapshot = self.market.session.snapshot();
        assert_eq!(snapshot.is_authenticated(), snapshot.user().is_some());
        assert_eq!(
            snapshot.is_authenticated(),
            self.stored_token().await.is_some(),
            "snapshot {snapshot:?} disagrees with storage"
        );
        assert_eq!(self.stored_token().await.is_some(), self.stored_user().await.is_some());
        snapshot
    }

    /// Answer the CSRF handshake.
    pub async fn mount_handshake(&self) {
        Mock::given(method("GET"))
            .and(path("/sanctum/csrf-cookie"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    /// Answer login with `token` and `user`.
    pub async fn mount_login(&self, token: &str, user: &Value) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": token, "user": user })),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer logout.
    pub async fn mount_logout(&self) {
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }
}

/// A user as the backend sends it.
#[must_use]
pub fn user_json(id: i64, email: &str, username: &str) -> Value {
    json!({ "id": id, "email": email, "username": username })
}
