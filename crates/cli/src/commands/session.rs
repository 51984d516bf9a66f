//! Sign in, sign up, sign out and whoami.

use bazaar_client::Marketplace;
use bazaar_client::session::{LoginForm, RegisterForm};
use serde_json::json;
use tracing::info;

use super::{CliError, print_json};

/// Sign in and print the user.
pub async fn login(market: &Marketplace, email: String, password: String) -> Result<(), CliError> {
    let user = market.session.login(&LoginForm::new(email, password)).await?;
    info!(user_id = %user.id, "Signed in");
    print_json(&user)
}

/// Create an account, sign in and print the user.
pub async fn register(
    market: &Marketplace,
    email: String,
    username: String,
    password: String,
    password_confirmation: String,
) -> Result<(), CliError> {
    let form = RegisterForm::new(email, username, password, password_confirmation);
    let user = market.session.register(&form).await?;
    info!(user_id = %user.id, "Account created");
    print_json(&user)
}

/// Sign out.
pub async fn logout(market: &Marketplace) -> Result<(), CliError> {
    market.session.logout().await?;
    print_json(&json!({ "signed_out": true }))
}

/// Restore the stored session, wait for the profile refresh and print the
/// resulting snapshot.
pub async fn whoami(market: &Marketplace) -> Result<(), CliError> {
    market.session.check_auth().await;
    market.session.wait_for_refresh().await;
    print_json(&market.session.snapshot())
}
