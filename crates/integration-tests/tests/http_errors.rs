//! Status normalization seen through the services and the session store.
//!
//! Run with: cargo test -p bazaar-integration-tests --test http_errors

use std::time::Duration;

use bazaar_client::ApiError;
use bazaar_client::api::ProductQuery;
use bazaar_core::{AuthStatus, User};
use bazaar_integration_tests::{TestContext, user_json};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_unauthorized_purges_before_returning() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(1, "a@x.io", "a")))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthenticated." })))
        .mount(&ctx.server)
        .await;
    ctx.seed_session("tok1", &User::new(1, "a@x.io", "a")).await;

    let session = &ctx.market.session;
    assert!(session.check_auth().await.is_authenticated());
    session.wait_for_refresh().await;
    assert!(ctx.market.client.has_default_bearer().await);

    let result = ctx.market.catalog.products(&ProductQuery::default()).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));

    // Storage and the default bearer are gone by the time the error arrives.
    assert!(ctx.stored_token().await.is_none());
    assert!(ctx.stored_user().await.is_none());
    assert!(!ctx.market.client.has_default_bearer().await);

    // The store follows.
    let mut updates = session.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        updates.wait_for(|s| s.status == AuthStatus::Unauthenticated),
    )
    .await
    .expect("store should observe the purge")
    .expect("store dropped");
    ctx.assert_consistent().await;
}

#[tokio::test]
async fn test_rate_limit_and_server_errors() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/api/categories"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/products/trending"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
        .mount(&ctx.server)
        .await;

    let err = ctx.market.catalog.categories().await.expect_err("429");
    assert!(matches!(err, ApiError::RateLimited { retry_after: Some(30) }));
    assert_eq!(
        err.user_message(),
        "Too many attempts. Please wait a few minutes and try again."
    );

    let err = ctx.market.catalog.trending().await.expect_err("503");
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.user_message(), "Server error (503)");
}

#[tokio::test]
async fn test_login_falls_back_to_token_endpoint() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sanctum/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok9",
            "user": user_json(9, "n@x.io", "n"),
        })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let user = ctx
        .market
        .session
        .login(&bazaar_client::session::LoginForm::new("n@x.io", "pw"))
        .await
        .expect("fallback login");
    assert_eq!(user.username, "n");
    assert_eq!(ctx.stored_token().await.as_deref(), Some("tok9"));
}
