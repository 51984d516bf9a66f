//! Route guard: keeps navigation consistent with the session.
//!
//! Signed-out users are kept inside the public area, signed-in users are
//! kept out of it. Decisions are only made once the session is ready.

/// Routes the guard knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRoutes {
    /// Prefix of the area reachable without a session.
    pub public_prefix: String,
    /// Where signed-out users are sent.
    pub login: String,
    /// Where signed-in users are sent.
    pub home: String,
}

impl Default for GuardRoutes {
    fn default() -> Self {
        Self {
            public_prefix: "/auth".to_string(),
            login: "/auth/login".to_string(),
            home: "/".to_string(),
        }
    }
}

impl GuardRoutes {
    fn is_public(&self, path: &str) -> bool {
        let prefix = self.public_prefix.trim_end_matches('/');
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Stateful guard, one per navigator.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    routes: GuardRoutes,
    last: Option<(bool, String)>,
}

impl RouteGuard {
    /// A guard for `routes` with no decision made yet.
    #[must_use]
    pub const fn new(routes: GuardRoutes) -> Self {
        Self { routes, last: None }
    }

    /// Decide whether navigation to `path` must be redirected.
    ///
    /// Returns the redirect target, or `None` to stay. Nothing is decided
    /// before the session is ready, and an input identical to the previous
    /// one never produces a second redirect.
    ///
    /// ```
    /// use bazaar_client::guard::RouteGuard;
    ///
    /// let mut guard = RouteGuard::default();
    /// assert_eq!(guard.evaluate(false, false, "/"), None);
    /// assert_eq!(guard.evaluate(true, false, "/").as_deref(), Some("/auth/login"));
    /// assert_eq!(guard.evaluate(true, false, "/"), None);
    /// ```
    pub fn evaluate(&mut self, ready: bool, is_authenticated: bool, path: &str) -> Option<String> {
        if !ready {
            return None;
        }

        if self
            .last
            .as_ref()
            .is_some_and(|(auth, last_path)| *auth == is_authenticated && last_path == path)
        {
            return None;
        }
        self.last = Some((is_authenticated, path.to_string()));

        let public = self.routes.is_public(path);
        match (is_authenticated, public) {
            (false, false) => Some(self.routes.login.clone()),
            (true, true) => Some(self.routes.home.clone()),
            _ => None,
        }
    }

    /// Forget the last decision, e.g. after the navigator is rebuilt.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// The configured routes.
    #[must_use]
    pub const fn routes(&self) -> &GuardRoutes {
        &self.routes
    }
}
