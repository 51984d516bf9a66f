//! API path normalization.

/// Maps endpoint paths onto the server's URL space.
///
/// Every path gets the API prefix except the auth-bootstrap paths, which the
/// backend serves at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    prefix: String,
    unprefixed: Vec<String>,
}

impl PathResolver {
    /// Create a resolver for `prefix` (e.g. `/api`, or empty for none).
    #[must_use]
    pub fn new(prefix: &str, unprefixed: &[String]) -> Self {
        let trimmed = prefix.trim().trim_end_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            with_leading_slash(trimmed)
        };

        Self {
            prefix,
            unprefixed: unprefixed.iter().map(|p| with_leading_slash(p.trim())).collect(),
        }
    }

    /// The normalized prefix (empty when disabled).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve an endpoint path to the path actually requested.
    ///
    /// ```
    /// use bazaar_client::http::PathResolver;
    ///
    /// let resolver = PathResolver::new("/api", &["/sanctum/csrf-cookie".to_string()]);
    /// assert_eq!(resolver.resolve("products"), "/api/products");
    /// assert_eq!(resolver.resolve("/api/products"), "/api/products");
    /// assert_eq!(resolver.resolve("/sanctum/csrf-cookie"), "/sanctum/csrf-cookie");
    /// ```
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        let path = with_leading_slash(path.trim());

        if self.prefix.is_empty() || self.is_prefixed(&path) || self.is_unprefixed(&path) {
            return path;
        }

        format!("{}{path}", self.prefix)
    }

    fn is_prefixed(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    fn is_unprefixed(&self, path: &str) -> bool {
        let bare = path.split('?').next().unwrap_or(path);
        self.unprefixed.iter().any(|p| p == bare)
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
