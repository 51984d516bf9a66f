//! Authentication session store.
//!
//! [`SessionStore`] owns the signed-in state and publishes it as a
//! [`SessionSnapshot`] through a `tokio::sync::watch` channel. It is the only
//! writer of the persisted token and cached user, apart from the HTTP
//! client's purge on 401, which it observes and mirrors.
//!
//! # Consistency
//!
//! - The signed-in user lives inside [`AuthStatus::Authenticated`], so a
//!   snapshot can never claim to be authenticated without a user.
//! - Token and user are persisted and purged together.
//! - Every change of session bumps an epoch counter. Work that started under
//!   an older epoch (the background profile refresh, a superseded check) does
//!   not apply its result.
//! - Storage writes and the snapshot they imply are committed under one
//!   short lock that is never held across a network call.

#[cfg(feature = "dev-bypass")]
pub mod dev;
mod error;
mod form;

pub use error::SessionError;
pub use form::{LoginForm, RegisterForm};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use bazaar_core::{AuthStatus, Email, User};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::AuthApi;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::storage::SessionVault;

/// What observers see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Where the session stands.
    pub status: AuthStatus,
    /// An operation is in flight.
    pub is_loading: bool,
    /// User-facing message from the last failed operation.
    pub error: Option<String>,
    /// The initial session check has completed.
    pub ready: bool,
}

impl SessionSnapshot {
    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.status.is_authenticated()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.status.user()
    }
}

/// Outcome of reading the persisted session.
enum Restored {
    Anonymous,
    Cached { user: User, refresh: bool },
    Fetched(User),
}

// =============================================================================
// SessionStore
// =============================================================================

/// Authentication state and the operations that change it.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: ApiClient,
    auth: AuthApi,
    vault: SessionVault,
    #[cfg(feature = "dev-bypass")]
    dev_bypass: bool,
    state: watch::Sender<SessionSnapshot>,
    epoch: AtomicU64,
    commit: Mutex<()>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
    refresh: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Create the store and start listening for 401 invalidations.
    ///
    /// The session is persisted in `client`'s vault. Nothing is read until
    /// [`check_auth`](Self::check_auth) runs.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn create(client: ApiClient, config: &ClientConfig) -> Self {
        #[cfg(not(feature = "dev-bypass"))]
        let _ = config;

        let (state, _) = watch::channel(SessionSnapshot::default());
        let inner = Arc::new(SessionInner {
            auth: AuthApi::new(client.clone()),
            vault: client.vault().clone(),
            #[cfg(feature = "dev-bypass")]
            dev_bypass: config.dev_bypass_active(),
            client,
            state,
            epoch: AtomicU64::new(0),
            commit: Mutex::new(()),
            listener: std::sync::Mutex::new(None),
            refresh: std::sync::Mutex::new(None),
        });

        #[cfg(feature = "dev-bypass")]
        if inner.dev_bypass {
            warn!("Developer session bypass is active; no credentials are checked");
        }

        let listener = tokio::spawn(listen_for_invalidations(
            Arc::downgrade(&inner),
            inner.client.subscribe_invalidations(),
        ));
        *lock(&inner.listener) = Some(listener);

        Self { inner }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Watch for snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Whether a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Whether the initial session check has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().ready
    }

    /// The client this store authenticates.
    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Dismiss the last error message.
    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|s| s.error.take().is_some());
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Restore the persisted session.
    ///
    /// With a cached user the session is adopted immediately and the profile
    /// is refreshed in the background; without one the profile is fetched
    /// before returning. A failed restore purges the stored session.
    #[instrument(skip(self))]
    pub async fn check_auth(&self) -> AuthStatus {
        let inner = &self.inner;
        let epoch = inner.bump_epoch();
        inner.publish(|s| {
            s.status = AuthStatus::Checking;
            s.is_loading = true;
            s.error = None;
        });

        let restored = self.restore().await;

        let _guard = inner.commit.lock().await;
        if inner.current_epoch() != epoch {
            debug!("Session changed during check, keeping the newer state");
            inner.publish(|s| s.ready = true);
            return self.snapshot().status;
        }

        match restored {
            Ok(Restored::Anonymous) => {
                inner.publish_settled(AuthStatus::Unauthenticated, None);
            }
            Ok(Restored::Cached { user, refresh }) => {
                info!(user_id = %user.id, "Restored cached session");
                inner.publish_settled(AuthStatus::Authenticated(user), None);
                if refresh {
                    self.spawn_refresh(epoch);
                }
            }
            Ok(Restored::Fetched(user)) => {
                if let Err(e) = inner.vault.update_user(&user).await {
                    warn!(error = %e, "Failed to cache user");
                }
                info!(user_id = %user.id, "Restored session from profile");
                inner.publish_settled(AuthStatus::Authenticated(user), None);
            }
            Err(e) => {
                warn!(error = %e, "Stored session could not be restored");
                inner.discard().await;
                inner.publish_settled(AuthStatus::Unauthenticated, Some(e.user_message()));
            }
        }

        self.snapshot().status
    }

    /// Sign in.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidInput` for a form that fails local
    /// validation, `SessionError::InvalidCredentials` when the server rejects
    /// the credentials, or `SessionError::Api` for a failed request. The session
    /// is left signed out in every case.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn login(&self, form: &LoginForm) -> Result<User, SessionError> {
        self.inner.begin();
        let result = match form.validate() {
            Ok(email) => self.authenticate(&email, &form.password, None).await,
            Err(e) => Err(e),
        };
        self.settle(result).await
    }

    /// Create an account, then sign in with it.
    ///
    /// # Errors
    ///
    /// As for [`login`](Self::login), covering both the registration and the
    /// sign-in request.
    #[instrument(skip(self, form), fields(email = %form.email, username = %form.username))]
    pub async fn register(&self, form: &RegisterForm) -> Result<User, SessionError> {
        self.inner.begin();
        let result = self.try_register(form).await;
        self.settle(result).await
    }

    /// Sign out.
    ///
    /// The server is told first, best-effort; local state is cleared whether
    /// or not that succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local session could not be purged.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        inner.bump_epoch();
        inner.publish(|s| {
            s.is_loading = true;
            s.error = None;
        });

        match inner.vault.token().await {
            Ok(Some(token)) if !inner.is_offline_token(&token) => {
                if let Err(e) = inner.auth.logout().await {
                    warn!(error = %e, "Remote logout failed, clearing local session anyway");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read token before logout"),
        }

        let _guard = inner.commit.lock().await;
        inner.bump_epoch();
        let purged = inner.vault.purge().await;
        inner.client.set_default_bearer(None).await;

        match purged {
            Ok(()) => {
                inner.publish_settled(AuthStatus::Unauthenticated, None);
                info!("Signed out");
                Ok(())
            }
            Err(e) => {
                let error = SessionError::from(e);
                inner.publish_settled(AuthStatus::Unauthenticated, Some(error.user_message()));
                Err(error)
            }
        }
    }

    /// Wait for a pending background profile refresh, if any.
    pub async fn wait_for_refresh(&self) {
        let handle = lock(&self.inner.refresh).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "Profile refresh task failed");
        }
    }

    /// Stop background work. The store stays readable.
    pub fn dispose(&self) {
        self.inner.abort_tasks();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn restore(&self) -> Result<Restored, SessionError> {
        let inner = &self.inner;

        let Some(token) = inner.vault.token().await? else {
            inner.client.set_default_bearer(None).await;
            if inner.vault.user().await?.is_some() {
                debug!("Removing cached user left without a token");
                inner.vault.purge().await?;
            }
            return Ok(Restored::Anonymous);
        };
        inner.client.set_default_bearer(Some(token.clone())).await;

        let cached = inner.vault.user().await?;

        #[cfg(feature = "dev-bypass")]
        if inner.is_offline_token(&token) {
            let user = match cached {
                Some(user) => user,
                None => {
                    let user = dev::default_user();
                    inner.vault.persist(&token, &user).await?;
                    user
                }
            };
            return Ok(Restored::Cached {
                user,
                refresh: false,
            });
        }

        if let Some(user) = cached {
            return Ok(Restored::Cached {
                user,
                refresh: true,
            });
        }

        Ok(Restored::Fetched(inner.auth.profile().await?))
    }

    async fn try_register(&self, form: &RegisterForm) -> Result<User, SessionError> {
        let account = form.validate()?;

        #[cfg(feature = "dev-bypass")]
        if self.inner.dev_bypass {
            return self
                .authenticate(&account.email, &account.password, Some(&account.username))
                .await;
        }

        self.inner.auth.csrf_handshake().await;
        let created = self.inner.auth.register(&account).await?;
        info!(created = created.is_some(), "Account registered, signing in");

        self.authenticate(&account.email, &account.password, Some(&account.username))
            .await
    }

    /// Obtain a token and commit it with its user.
    async fn authenticate(
        &self,
        email: &Email,
        password: &SecretString,
        username: Option<&str>,
    ) -> Result<User, SessionError> {
        let inner = &self.inner;

        #[cfg(feature = "dev-bypass")]
        if inner.dev_bypass {
            let user = dev::user_for(email, username);
            return inner.commit_session(dev::fake_token(), user).await;
        }
        #[cfg(not(feature = "dev-bypass"))]
        let _ = username;

        inner.auth.csrf_handshake().await;
        let grant = inner
            .auth
            .login(email, password)
            .await
            .map_err(SessionError::from_sign_in)?;
        inner.commit_session(grant.token, grant.user).await
    }

    /// Publish the outcome of login/register, rolling back on failure.
    async fn settle(&self, result: Result<User, SessionError>) -> Result<User, SessionError> {
        let error = match result {
            Ok(user) => {
                info!(user_id = %user.id, "Signed in");
                return Ok(user);
            }
            Err(error) => error,
        };

        let inner = &self.inner;
        let _guard = inner.commit.lock().await;
        inner.bump_epoch();
        inner.discard().await;
        warn!(error = %error, "Sign-in failed");
        inner.publish_settled(AuthStatus::Unauthenticated, Some(error.user_message()));
        Err(error)
    }

    fn spawn_refresh(&self, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.refresh_profile(epoch).await });
        if let Some(previous) = lock(&self.inner.refresh).replace(handle) {
            previous.abort();
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("snapshot", &*self.inner.state.borrow())
            .field("epoch", &self.inner.current_epoch())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn publish(&self, modify: impl FnOnce(&mut SessionSnapshot)) {
        self.state.send_modify(modify);
    }

    /// Publish a final state for an operation.
    fn publish_settled(&self, status: AuthStatus, error: Option<String>) {
        self.publish(|s| {
            s.status = status;
            s.is_loading = false;
            s.error = error;
            s.ready = true;
        });
    }

    /// Start a login or register: invalidate older work, show loading.
    fn begin(&self) {
        self.bump_epoch();
        self.publish(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    /// Persist a new session and publish it.
    async fn commit_session(&self, token: SecretString, user: User) -> Result<User, SessionError> {
        let _guard = self.commit.lock().await;
        self.bump_epoch();
        self.vault.persist(&token, &user).await?;
        self.client.set_default_bearer(Some(token)).await;
        self.publish_settled(AuthStatus::Authenticated(user.clone()), None);
        Ok(user)
    }

    /// Purge the stored session and default bearer. Failures are logged.
    async fn discard(&self) {
        if let Err(e) = self.vault.purge().await {
            warn!(error = %e, "Failed to purge stored session");
        }
        self.client.set_default_bearer(None).await;
    }

    /// Whether this token belongs to a developer session.
    #[cfg(feature = "dev-bypass")]
    fn is_offline_token(&self, token: &SecretString) -> bool {
        self.dev_bypass && dev::is_fake_token(token)
    }

    #[cfg(not(feature = "dev-bypass"))]
    #[allow(clippy::unused_self)]
    const fn is_offline_token(&self, _token: &SecretString) -> bool {
        false
    }

    async fn refresh_profile(&self, epoch: u64) {
        let result = self.auth.profile().await;

        let _guard = self.commit.lock().await;
        if self.current_epoch() != epoch {
            debug!("Discarding profile refresh for a superseded session");
            return;
        }

        let result = match result {
            // A concurrent 401 may have purged the token while we waited.
            Ok(user) => match self.vault.token().await {
                Ok(Some(_)) => Ok(user),
                Ok(None) => Err(SessionError::from(ApiError::Unauthorized)),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(user) => {
                if let Err(e) = self.vault.update_user(&user).await {
                    warn!(error = %e, "Failed to cache refreshed user");
                }
                debug!(user_id = %user.id, "Profile refreshed");
                self.publish(|s| s.status = AuthStatus::Authenticated(user));
            }
            Err(e) => {
                warn!(error = %e, "Profile refresh failed, signing out");
                self.bump_epoch();
                self.discard().await;
                self.publish(|s| s.status = AuthStatus::Unauthenticated);
            }
        }
    }

    /// Mirror a 401 purge done by the HTTP client.
    ///
    /// Storage is the reference: a session committed after the purge is
    /// left alone.
    async fn on_invalidated(&self) {
        let _guard = self.commit.lock().await;
        match self.vault.token().await {
            Ok(Some(_)) => {
                debug!("Ignoring invalidation, a newer session is stored");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not read token after invalidation"),
        }

        self.client.set_default_bearer(None).await;
        let was_authenticated = self.state.borrow().is_authenticated();
        self.publish(|s| s.status = AuthStatus::Unauthenticated);
        if was_authenticated {
            info!("Session invalidated by the server");
        }
    }

    fn abort_tasks(&self) {
        for slot in [&self.listener, &self.refresh] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn listen_for_invalidations(inner: Weak<SessionInner>, mut invalidations: watch::Receiver<u64>) {
    while invalidations.changed().await.is_ok() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_invalidated().await;
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
