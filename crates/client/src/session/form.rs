//! Login and registration forms with local validation.
//!
//! Only input that can never succeed is rejected here; the server remains
//! the authority and answers everything else with a 422.

use bazaar_core::{Email, EmailError};
use secrecy::{ExposeSecret, SecretString};

use super::SessionError;
use crate::api::NewAccount;

/// Credentials as typed by the user.
pub struct LoginForm {
    pub email: String,
    pub password: SecretString,
}

impl LoginForm {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Check the form and parse the email.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidInput` if a field is empty or the email
    /// is malformed.
    pub fn validate(&self) -> Result<Email, SessionError> {
        if self.email.trim().is_empty() || self.password.expose_secret().is_empty() {
            return Err(invalid("Email and password are required."));
        }
        parse_email(&self.email)
    }
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Registration details as typed by the user.
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub password: SecretString,
    pub password_confirmation: SecretString,
}

impl RegisterForm {
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        password_confirmation: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            password_confirmation: SecretString::from(password_confirmation.into()),
        }
    }

    /// Check the form and build the account request.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidInput` if a field is empty, the email
    /// is malformed, or the passwords differ.
    pub fn validate(&self) -> Result<NewAccount, SessionError> {
        let password = self.password.expose_secret();
        if self.email.trim().is_empty()
            || self.username.trim().is_empty()
            || password.is_empty()
            || self.password_confirmation.expose_secret().is_empty()
        {
            return Err(invalid("All fields are required."));
        }

        let email = parse_email(&self.email)?;

        if password != self.password_confirmation.expose_secret() {
            return Err(invalid("Passwords do not match."));
        }

        Ok(NewAccount {
            email,
            username: self.username.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

impl std::fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterForm")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn parse_email(raw: &str) -> Result<Email, SessionError> {
    Email::parse(raw).map_err(|e| match e {
        EmailError::Empty => invalid("Email is required."),
        EmailError::TooLong { .. } | EmailError::Malformed => {
            invalid("Please enter a valid email address.")
        }
    })
}

fn invalid(message: &str) -> SessionError {
    SessionError::InvalidInput(message.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(err: SessionError) -> String {
        err.user_message()
    }

    #[test]
    fn test_login_requires_both_fields() {
        let err = LoginForm::new("a@b.com", "").validate().unwrap_err();
        assert_eq!(message(err), "Email and password are required.");
        let err = LoginForm::new("   ", "pw").validate().unwrap_err();
        assert_eq!(message(err), "Email and password are required.");
    }

    #[test]
    fn test_login_rejects_malformed_email() {
        let err = LoginForm::new("not-an-email", "pw").validate().unwrap_err();
        assert_eq!(message(err), "Please enter a valid email address.");
    }

    #[test]
    fn test_login_trims_email() {
        let email = LoginForm::new(" a@b.com ", "pw").validate().unwrap();
        assert_eq!(email.as_str(), "a@b.com");
    }

    #[test]
    fn test_register_password_mismatch() {
        let err = RegisterForm::new("a@b.com", "a", "secret1", "secret2")
            .validate()
            .unwrap_err();
        assert_eq!(message(err), "Passwords do not match.");
    }

    #[test]
    fn test_register_requires_all_fields() {
        let err = RegisterForm::new("a@b.com", "", "secret1", "secret1")
            .validate()
            .unwrap_err();
        assert_eq!(message(err), "All fields are required.");
    }

    #[test]
    fn test_register_valid() {
        let account = RegisterForm::new("a@b.com", " a ", "secret1", "secret1")
            .validate()
            .unwrap();
        assert_eq!(account.username, "a");
        assert_eq!(account.password.expose_secret(), "secret1");
    }

    #[test]
    fn test_debug_redacts_password() {
        let form = LoginForm::new("a@b.com", "hunter2");
        assert!(!format!("{form:?}").contains("hunter2"));
    }
}
