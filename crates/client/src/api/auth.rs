//! Authentication endpoints.

use bazaar_core::{Email, User};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::envelope::{AuthEnvelope, ItemEnvelope, WireUser, decode};
use super::with_fallback;
use crate::error::ApiError;
use crate::http::{ApiClient, TimeoutClass};

/// A token and the user it belongs to.
pub struct AuthGrant {
    /// Bearer token.
    pub token: SecretString,
    /// The authenticated user.
    pub user: User,
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGrant")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Registration details, already validated.
pub struct NewAccount {
    /// Login email.
    pub email: Email,
    /// Public display name.
    pub username: String,
    /// Password, also sent as its own confirmation.
    pub password: SecretString,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Authentication API.
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    /// Create the service over a shared client.
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Prime the backend's CSRF cookie.
    ///
    /// Runs at most once successfully per client. Failures are logged and
    /// swallowed: token auth works without it.
    #[instrument(skip(self))]
    pub async fn csrf_handshake(&self) {
        if self.client.handshake_done() {
            return;
        }

        let path = &self.client.config().paths.handshake;
        match self.client.ping(path, TimeoutClass::Handshake).await {
            Ok(()) => {
                self.client.mark_handshake_done();
                debug!("CSRF handshake complete");
            }
            Err(e) => warn!(error = %e, "CSRF handshake failed, continuing without it"),
        }
    }

    /// Exchange credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::MalformedResponse` if the response lacks a token
    /// or a user, or the normalized error for the failed request.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<AuthGrant, ApiError> {
        let body = json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "device_name": self.client.config().device_name,
        });

        let client = &self.client;
        let body = &body;
        let response: Value = with_fallback(&client.config().paths.login, |path| async move {
            client.post(&path, body, TimeoutClass::Auth).await
        })
        .await?;

        let payload = decode::<AuthEnvelope>(response, "login")?.into_payload();
        let token = payload
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::MalformedResponse("login response has no access token".into()))?;
        let user = payload
            .user
            .ok_or_else(|| ApiError::MalformedResponse("login response has no user".into()))?;

        Ok(AuthGrant {
            token: SecretString::from(token),
            user: user.into(),
        })
    }

    /// Create an account.
    ///
    /// Returns the created user when the server includes it. Registration
    /// never authenticates on its own; callers log in afterwards.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self, account), fields(email = %account.email, username = %account.username))]
    pub async fn register(&self, account: &NewAccount) -> Result<Option<User>, ApiError> {
        let body = json!({
            "email": account.email.as_str(),
            "username": account.username,
            "password": account.password.expose_secret(),
            "password_confirmation": account.password.expose_secret(),
            "device_name": self.client.config().device_name,
        });

        let client = &self.client;
        let body = &body;
        let response: Value = with_fallback(&client.config().paths.register, |path| async move {
            client.post(&path, body, TimeoutClass::Auth).await
        })
        .await?;

        let user = decode::<AuthEnvelope>(response, "register")
            .map(|envelope| envelope.into_payload().user.map(User::from))
            .unwrap_or_default();
        Ok(user)
    }

    /// Revoke the current token on the server.
    ///
    /// # Errors
    ///
    /// Returns the normalized error for the failed request.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let client = &self.client;
        let _: Value = with_fallback(&client.config().paths.logout, |path| async move {
            client.post_empty(&path, TimeoutClass::Auth).await
        })
        .await?;
        Ok(())
    }

    /// Fetch the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` (after purging the session) if the
    /// token was rejected, or the normalized error for the failed request.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<User, ApiError> {
        let client = &self.client;
        let response: Value = with_fallback(&client.config().paths.profile, |path| async move {
            client.get(&path, TimeoutClass::Auth).await
        })
        .await?;

        let user = decode::<ItemEnvelope<WireUser>>(response, "profile")?.into_inner();
        Ok(user.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::SessionVault;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_for(server: &MockServer) -> AuthApi {
        let mut config = ClientConfig::new(Url::parse(&server.uri()).unwrap());
        config.device_name = "test-device".to_string();
        AuthApi::new(ApiClient::new(&config, SessionVault::in_memory()).unwrap())
    }

    fn email() -> Email {
        Email::parse("a@b.com").unwrap()
    }

    #[tokio::test]
    async fn test_login_sends_device_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_partial_json(json!({
                "email": "a@b.com",
                "password": "pw",
                "device_name": "test-device"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok1",
                "user": {"id": 1, "email": "a@b.com", "username": "a"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = auth_for(&server)
            .login(&email(), &SecretString::from("pw"))
            .await
            .unwrap();
        assert_eq!(grant.token.expose_secret(), "tok1");
        assert_eq!(grant.user, User::new(1, "a@b.com", "a"));
    }

    #[tokio::test]
    async fn test_login_falls_back_to_unprefixed_token_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sanctum/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok2",
                "user": {"id": 2, "email": "a@b.com"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = auth_for(&server)
            .login(&email(), &SecretString::from("pw"))
            .await
            .unwrap();
        assert_eq!(grant.token.expose_secret(), "tok2");
        assert_eq!(grant.user.username, "a");
    }

    #[tokio::test]
    async fn test_login_without_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 1, "email": "a@b.com"}
            })))
            .mount(&server)
            .await;

        let err = auth_for(&server)
            .login(&email(), &SecretString::from("pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_handshake_once_and_non_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sanctum/csrf-cookie"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth_for(&server);
        auth.csrf_handshake().await;
        auth.csrf_handshake().await;

        let offline = AuthApi::new(
            ApiClient::new(
                &ClientConfig::new(Url::parse("http://127.0.0.1:1").unwrap()),
                SessionVault::in_memory(),
            )
            .unwrap(),
        );
        offline.csrf_handshake().await;
        assert!(!offline.client().handshake_done());
    }

    #[tokio::test]
    async fn test_profile_accepts_wrapped_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/profile"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "3", "email": "c@d.com", "username": "c"}
            })))
            .mount(&server)
            .await;

        let user = auth_for(&server).profile().await.unwrap();
        assert_eq!(user, User::new(3, "c@d.com", "c"));
    }

    #[tokio::test]
    async fn test_register_sends_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .and(body_partial_json(json!({
                "username": "a",
                "password_confirmation": "secret1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "created"})))
            .expect(1)
            .mount(&server)
            .await;

        let account = NewAccount {
            email: email(),
            username: "a".to_string(),
            password: SecretString::from("secret1"),
        };
        let user = auth_for(&server).register(&account).await.unwrap();
        assert!(user.is_none());
    }
}
