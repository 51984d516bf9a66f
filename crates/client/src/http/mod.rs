//! HTTP client wrapper for the marketplace REST API.
//!
//! [`ApiClient`] owns the `reqwest` client and is the only place raw HTTP
//! responses are seen. It:
//!
//! - resolves endpoint paths against the configured base URL and prefix
//! - reads the bearer token from session storage on every request
//! - applies a per-class timeout to every request
//! - normalizes failures into [`ApiError`]
//! - purges the stored session on 401 and signals subscribers

mod path;

pub use path::PathResolver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, watch};
use tracing::{Span, debug, error, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, Timeouts};
use crate::error::{ApiError, ErrorBody, flatten_validation_errors};
use crate::storage::SessionVault;

const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Which timeout applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// CSRF handshake and health probes.
    Handshake,
    /// Login, register, logout and profile.
    Auth,
    /// Everything else.
    Standard,
}

impl TimeoutClass {
    const fn duration(self, timeouts: &Timeouts) -> Duration {
        match self {
            Self::Handshake => timeouts.handshake,
            Self::Auth => timeouts.auth,
            Self::Standard => timeouts.default,
        }
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the marketplace REST API.
///
/// Cheap to clone; clones share the connection pool, the default bearer and
/// the invalidation channel.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    config: ClientConfig,
    paths: PathResolver,
    vault: SessionVault,
    /// Mirror of the stored token, refreshed from storage on every request.
    default_bearer: RwLock<Option<SecretString>>,
    /// Bumped after every 401 purge.
    invalidations: watch::Sender<u64>,
    handshake_done: AtomicBool,
}

impl ApiClient {
    /// Create a client for the configured backend, reading credentials from
    /// `vault`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the HTTP client fails to build.
    pub fn new(config: &ClientConfig, vault: SessionVault) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("bazaar-client/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.timeouts.handshake)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        let (invalidations, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                paths: PathResolver::new(&config.api_prefix, &config.unprefixed_paths),
                config: config.clone(),
                vault,
                default_bearer: RwLock::new(None),
                invalidations,
                handshake_done: AtomicBool::new(false),
            }),
        })
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The session storage this client reads its bearer from.
    #[must_use]
    pub fn vault(&self) -> &SessionVault {
        &self.inner.vault
    }

    /// Observe 401 purges.
    ///
    /// The value is a counter that increases after each purge; subscribers
    /// only need `changed()`.
    #[must_use]
    pub fn subscribe_invalidations(&self) -> watch::Receiver<u64> {
        self.inner.invalidations.subscribe()
    }

    /// Whether a default bearer is currently set.
    pub async fn has_default_bearer(&self) -> bool {
        self.inner.default_bearer.read().await.is_some()
    }

    /// Replace the default bearer.
    pub async fn set_default_bearer(&self, token: Option<SecretString>) {
        *self.inner.default_bearer.write().await = token;
    }

    pub(crate) fn handshake_done(&self) -> bool {
        self.inner.handshake_done.load(Ordering::Acquire)
    }

    pub(crate) fn mark_handshake_done(&self) {
        self.inner.handshake_done.store(true, Ordering::Release);
    }

    /// Absolute URL for an endpoint path.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        let resolved = self.inner.paths.resolve(path);
        let base = self.inner.config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{resolved}"))
            .map_err(|e| ApiError::InvalidRequest(format!("invalid path {path:?}: {e}")))
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    /// GET and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        class: TimeoutClass,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, class, |req| req).await?;
        Self::read_json(response).await
    }

    /// GET with query parameters and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn get_query<T, Q>(
        &self,
        path: &str,
        query: &Q,
        class: TimeoutClass,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + Sync + ?Sized,
    {
        let response = self
            .send(Method::GET, path, class, |req| req.query(query))
            .await?;
        Self::read_json(response).await
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn post<T, B>(&self, path: &str, body: &B, class: TimeoutClass) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .send(Method::POST, path, class, |req| req.json(body))
            .await?;
        Self::read_json(response).await
    }

    /// POST without a body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn post_empty<T: DeserializeOwned>(
        &self,
        path: &str,
        class: TimeoutClass,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::POST, path, class, |req| req).await?;
        Self::read_json(response).await
    }

    /// POST a multipart form and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        class: TimeoutClass,
    ) -> Result<T, ApiError> {
        let response = self
            .send(Method::POST, path, class, |req| req.multipart(form))
            .await?;
        Self::read_json(response).await
    }

    /// DELETE and decode the JSON response (if any).
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        class: TimeoutClass,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::DELETE, path, class, |req| req).await?;
        Self::read_json(response).await
    }

    /// GET and discard the body; succeeds on any 2xx.
    ///
    /// # Errors
    ///
    /// Returns the normalized `ApiError` for the failure.
    pub async fn ping(&self, path: &str, class: TimeoutClass) -> Result<(), ApiError> {
        self.send(Method::GET, path, class, |req| req).await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    #[instrument(
        skip(self, build),
        fields(
            method = %method,
            path = %path,
            request_id = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    )]
    async fn send(
        &self,
        method: Method,
        path: &str,
        class: TimeoutClass,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<Response, ApiError> {
        let url = self.url(path)?;

        // Storage is the source of truth; the default bearer just follows it.
        let token = self.inner.vault.token().await?;
        self.set_default_bearer(token.clone()).await;

        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());

        let mut request = self
            .inner
            .client
            .request(method, url)
            .timeout(class.duration(&self.inner.config.timeouts))
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = &token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = build(request).send().await.map_err(|e| {
            let err = ApiError::from_transport(&e);
            warn!(error = %e, "Request failed without a response");
            err
        })?;

        let status = response.status();
        Span::current().record("status", status.as_u16());

        if status.is_success() {
            debug!("Request succeeded");
            return Ok(response);
        }

        Err(self.error_for(response, token.as_ref()).await)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };

        serde_json::from_str(text).map_err(|e| {
            debug!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse response body"
            );
            ApiError::MalformedResponse(e.to_string())
        })
    }

    /// Map a non-success response to an `ApiError`.
    ///
    /// `sent` is the bearer the request carried.
    async fn error_for(&self, response: Response, sent: Option<&SecretString>) -> ApiError {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate(sent).await;
            return ApiError::Unauthorized;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            warn!(retry_after = ?retry_after, "Rate limited");
            return ApiError::RateLimited { retry_after };
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = ErrorBody::parse(&body);

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let mut messages = parsed
                .errors
                .as_ref()
                .map(flatten_validation_errors)
                .unwrap_or_default();
            if messages.is_empty()
                && let Some(message) = parsed.best_message()
            {
                messages.push(message);
            }
            return ApiError::ValidationFailed { messages };
        }

        let message = parsed
            .best_message()
            .unwrap_or_else(|| format!("Server error ({})", status.as_u16()));

        if status.is_server_error() {
            error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "API returned server error"
            );
        } else {
            debug!(status = %status, message = %message, "API returned error status");
        }

        ApiError::ServerError {
            status: status.as_u16(),
            message,
        }
    }

    /// Purge the stored session and tell subscribers.
    ///
    /// Only the session the rejected request was sent with is purged. A
    /// token stored after the request went out is left alone.
    async fn invalidate(&self, sent: Option<&SecretString>) {
        match self.inner.vault.token().await {
            Ok(current) if !same_token(current.as_ref(), sent) => {
                debug!("Ignoring 401 for a token that is no longer stored");
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read token after 401, purging anyway"),
        }

        if let Err(e) = self.inner.vault.purge().await {
            error!(error = %e, "Failed to purge session after 401");
        }
        self.set_default_bearer(None).await;
        self.inner.invalidations.send_modify(|n| *n += 1);
        warn!("Session rejected by server, local credentials purged");
    }
}

fn same_token(a: Option<&SecretString>, b: Option<&SecretString>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
        (None, None) => true,
        _ => false,
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("prefix", &self.inner.paths.prefix())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bazaar_core::User;
    use serde_json::{Value, json};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        let config = ClientConfig::new(Url::parse(&server.uri()).unwrap());
        ApiClient::new(&config, SessionVault::in_memory()).unwrap()
    }

    #[tokio::test]
    async fn test_url_resolution() {
        let config = ClientConfig::new(Url::parse("https://shop.example.com/").unwrap());
        let client = ApiClient::new(&config, SessionVault::in_memory()).unwrap();
        assert_eq!(
            client.url("/products").unwrap().as_str(),
            "https://shop.example.com/api/products"
        );
        assert_eq!(
            client.url("/sanctum/csrf-cookie").unwrap().as_str(),
            "https://shop.example.com/sanctum/csrf-cookie"
        );
    }

    #[tokio::test]
    async fn test_bearer_read_from_storage_per_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .and(header("Authorization", "Bearer tok1"))
            .and(header("Accept", "application/json"))
            .and(header_exists("X-Request-Id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.has_default_bearer().await);

        // Token written after construction is still picked up.
        client
            .vault()
            .persist(&SecretString::from("tok1"), &User::new(1, "a@b.com", "a"))
            .await
            .unwrap();

        let body: Value = client.get("/user", TimeoutClass::Auth).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert!(client.has_default_bearer().await);
    }

    #[tokio::test]
    async fn test_401_purges_before_returning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/favorites"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .vault()
            .persist(&SecretString::from("tok1"), &User::new(1, "a@b.com", "a"))
            .await
            .unwrap();
        let mut invalidations = client.subscribe_invalidations();

        let err = client
            .get::<Value>("/favorites", TimeoutClass::Standard)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
        assert!(client.vault().token().await.unwrap().is_none());
        assert!(client.vault().user().await.unwrap().is_none());
        assert!(!client.has_default_bearer().await);
        assert!(invalidations.has_changed().unwrap());
        assert_eq!(*invalidations.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn test_late_401_keeps_newer_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/favorites"))
            .and(header("Authorization", "Bearer old"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"message": "Unauthenticated."}))
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .vault()
            .persist(&SecretString::from("old"), &User::new(1, "a@b.com", "a"))
            .await
            .unwrap();
        let mut invalidations = client.subscribe_invalidations();

        let in_flight = tokio::spawn({
            let client = client.clone();
            async move { client.get::<Value>("/favorites", TimeoutClass::Standard).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // Signed in again while the old request is still out.
        client
            .vault()
            .persist(&SecretString::from("tok1"), &User::new(1, "a@b.com", "a"))
            .await
            .unwrap();

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(
            client.vault().token().await.unwrap().unwrap().expose_secret(),
            "tok1"
        );
        assert!(client.vault().user().await.unwrap().is_some());
        assert!(!invalidations.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_422_flattens_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(422).set_body_raw(
                r#"{"message":"invalid","errors":{"field1":["msg1"],"field2":["msg2","msg3"]}}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .post::<Value, _>("/auth/register", &json!({}), TimeoutClass::Auth)
            .await
            .unwrap_err();

        match err {
            ApiError::ValidationFailed { messages } => {
                assert_eq!(messages, vec!["msg1", "msg2", "msg3"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_429_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .post::<Value, _>("/auth/login", &json!({}), TimeoutClass::Auth)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after: Some(30) }));
    }

    #[tokio::test]
    async fn test_server_error_message_fallbacks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/a"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "db down"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/b"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get::<Value>("/a", TimeoutClass::Standard).await.unwrap_err();
        assert!(matches!(err, ApiError::ServerError { status: 500, ref message } if message == "db down"));

        let err = client.get::<Value>("/b", TimeoutClass::Standard).await.unwrap_err();
        assert!(
            matches!(err, ApiError::ServerError { status: 503, ref message } if message == "Server error (503)")
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health-check"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(Url::parse(&server.uri()).unwrap());
        config.api_prefix = String::new();
        config.timeouts.handshake = Duration::from_millis(200);
        let client = ApiClient::new(&config, SessionVault::in_memory()).unwrap();

        let err = client
            .ping("/health-check", TimeoutClass::Handshake)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:1").unwrap());
        let client = ApiClient::new(&config, SessionVault::in_memory()).unwrap();
        let err = client
            .get::<Value>("/categories", TimeoutClass::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NetworkUnreachable(_)));
    }

    #[tokio::test]
    async fn test_empty_success_body_decodes_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let body: Value = client
            .post_empty("/auth/logout", TimeoutClass::Auth)
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .get::<Value>("/categories", TimeoutClass::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }
}
