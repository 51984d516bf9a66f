//! Authentication status.

use serde::{Deserialize, Serialize};

use super::user::User;

/// Where the session currently stands.
///
/// The signed-in user lives inside [`AuthStatus::Authenticated`], so
/// "authenticated" and "has a user" cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum AuthStatus {
    /// Nothing is known yet; the first check has not started.
    #[default]
    Unknown,
    /// A check is in progress.
    Checking,
    /// Signed in as this user.
    Authenticated(User),
    /// Signed out, or the stored session turned out to be invalid.
    Unauthenticated,
}

impl AuthStatus {
    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Whether the state is settled (not `Unknown` or `Checking`).
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Unauthenticated)
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Checking => write!(f, "checking"),
            Self::Authenticated(user) => write!(f, "authenticated as {}", user.username),
            Self::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}
