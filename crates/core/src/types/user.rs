//! Authenticated user.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// The signed-in account.
///
/// This is also the shape persisted to local storage as the cached user,
/// so field names match the backend's JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend user id.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Public display name.
    pub username: String,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(id: i64, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            email: email.into(),
            username: username.into(),
        }
    }
}
