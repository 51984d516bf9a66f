//! Data-fetch resource.
//!
//! A [`Resource`] wraps an async fetch with loading and error state. The
//! first load waits for a readiness gate (normally the session's initial
//! check) so screens do not fetch with a half-restored session.
//!
//! Fetches are sequenced: each takes a ticket, and only the most recently
//! started one may apply its result. A slow earlier response arriving after
//! a newer one is dropped.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ApiError;
use crate::session::SessionStore;

/// Something a resource waits on before its first fetch.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Resolve once ready.
    async fn ready(&self);
}

#[async_trait]
impl Readiness for SessionStore {
    async fn ready(&self) {
        let mut updates = self.subscribe();
        if updates.wait_for(|s| s.ready).await.is_err() {
            debug!("Session store dropped before becoming ready");
        }
    }
}

/// A gate that is always open.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

#[async_trait]
impl Readiness for AlwaysReady {
    async fn ready(&self) {}
}

/// Observable state of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState<T> {
    /// The last successfully fetched value, or the default.
    pub data: T,
    /// A fetch is in flight.
    pub is_loading: bool,
    /// User-facing message from the last failed fetch.
    pub error: Option<String>,
}

/// What happened to a fetch's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result was applied.
    Applied,
    /// A newer fetch started first; the result was dropped.
    Superseded,
}

type FetchFn<T> = dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync;

/// An async value with loading and error state.
pub struct Resource<T> {
    inner: Arc<ResourceInner<T>>,
}

struct ResourceInner<T> {
    fetch: Box<FetchFn<T>>,
    gate: Arc<dyn Readiness>,
    state: watch::Sender<ResourceState<T>>,
    ticket: AtomicU64,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `fetch`, starting from `initial` until the first fetch lands.
    pub fn new<F, Fut>(gate: Arc<dyn Readiness>, initial: T, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(ResourceState {
            data: initial,
            is_loading: false,
            error: None,
        });

        Self {
            inner: Arc::new(ResourceInner {
                fetch: Box::new(move || fetch().boxed()),
                gate,
                state,
                ticket: AtomicU64::new(0),
            }),
        }
    }

    /// Wait for the gate, then fetch.
    pub async fn load(&self) -> FetchOutcome {
        self.inner.gate.ready().await;
        self.refetch().await
    }

    /// Spawn [`load`](Self::load) in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_load(&self) -> tokio::task::JoinHandle<FetchOutcome> {
        let resource = self.clone();
        tokio::spawn(async move { resource.load().await })
    }

    /// Fetch now.
    pub async fn refetch(&self) -> FetchOutcome {
        let inner = &self.inner;
        let ticket = inner.ticket.fetch_add(1, Ordering::AcqRel) + 1;
        inner.state.send_modify(|s| s.is_loading = true);

        let result = (inner.fetch)().await;

        if inner.ticket.load(Ordering::Acquire) != ticket {
            debug!(ticket, "Dropping result of superseded fetch");
            return FetchOutcome::Superseded;
        }

        inner.state.send_modify(|s| {
            match result {
                Ok(data) => {
                    s.data = data;
                    s.error = None;
                }
                Err(e) => s.error = Some(e.user_message()),
            }
            s.is_loading = false;
        });
        FetchOutcome::Applied
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    /// The current value.
    #[must_use]
    pub fn data(&self) -> T {
        self.inner.state.borrow().data.clone()
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// Message from the last failed fetch.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Watch for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }
}

impl<T> std::fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("ticket", &self.inner.ticket.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
