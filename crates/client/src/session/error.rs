use thiserror::Error;

use crate::error::ApiError;
use crate::storage::StorageError;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The form failed local validation; nothing was sent.
    #[error("{0}")]
    InvalidInput(String),

    /// The server rejected the email and password.
    #[error("Invalid email or password.")]
    InvalidCredentials,

    /// The request or local storage failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    /// Text suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(message) => message.clone(),
            Self::InvalidCredentials => self.to_string(),
            Self::Api(e) => e.user_message(),
        }
    }

    /// Classify a failed sign-in request, where a 401 means bad credentials
    /// rather than an expired session.
    pub(crate) fn from_sign_in(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized => Self::InvalidCredentials,
            other => Self::Api(other),
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(e: StorageError) -> Self {
        Self::Api(ApiError::Storage(e))
    }
}
