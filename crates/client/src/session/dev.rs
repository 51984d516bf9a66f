//! Offline developer sessions.
//!
//! Compiled only with the `dev-bypass` feature, and consulted only when
//! [`ClientConfig::dev_bypass_active`](crate::config::ClientConfig::dev_bypass_active)
//! holds. Nothing here touches the network.

use bazaar_core::{Email, User};
use secrecy::{ExposeSecret, SecretString};

/// Token stored for a developer session.
pub const FAKE_TOKEN: &str = "fake_dev_token";

const FAKE_USER_ID: i64 = 1;
const FAKE_EMAIL: &str = "dev@example.com";
const FAKE_USERNAME: &str = "DeveloperMode";

/// Whether `token` belongs to a developer session.
pub(crate) fn is_fake_token(token: &SecretString) -> bool {
    token.expose_secret() == FAKE_TOKEN
}

pub(crate) fn fake_token() -> SecretString {
    SecretString::from(FAKE_TOKEN)
}

/// The user adopted when no cached user exists.
pub(crate) fn default_user() -> User {
    User::new(FAKE_USER_ID, FAKE_EMAIL, FAKE_USERNAME)
}

/// A user for the typed credentials, named after the email's local part
/// unless a username is given.
pub(crate) fn user_for(email: &Email, username: Option<&str>) -> User {
    let username = username
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| email.local_part());
    User::new(FAKE_USER_ID, email.as_str(), username)
}
