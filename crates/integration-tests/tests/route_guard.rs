//! Route guard driven by a live session.
//!
//! Run with: cargo test -p bazaar-integration-tests --test route_guard

use bazaar_client::RouteGuard;
use bazaar_client::session::LoginForm;
use bazaar_integration_tests::{TestContext, user_json};

fn evaluate(guard: &mut RouteGuard, ctx: &TestContext, path: &str) -> Option<String> {
    let snapshot = ctx.market.session.snapshot();
    guard.evaluate(snapshot.ready, snapshot.is_authenticated(), path)
}

#[tokio::test]
async fn test_guard_redirects_once_per_change() {
    let ctx = TestContext::new().await;
    ctx.mount_login("tok1", &user_json(1, "a@x.io", "a")).await;
    let mut guard = RouteGuard::default();

    // Nothing is decided before the first check.
    assert_eq!(evaluate(&mut guard, &ctx, "/"), None);

    ctx.market.session.check_auth().await;
    assert_eq!(evaluate(&mut guard, &ctx, "/").as_deref(), Some("/auth/login"));
    assert_eq!(evaluate(&mut guard, &ctx, "/"), None);
    assert_eq!(evaluate(&mut guard, &ctx, "/"), None);

    assert_eq!(evaluate(&mut guard, &ctx, "/auth/login"), None);

    ctx.market
        .session
        .login(&LoginForm::new("a@x.io", "pw"))
        .await
        .expect("login");
    assert_eq!(evaluate(&mut guard, &ctx, "/auth/login").as_deref(), Some("/"));
    assert_eq!(evaluate(&mut guard, &ctx, "/auth/login"), None);
    assert_eq!(evaluate(&mut guard, &ctx, "/"), None);
}
