//! End-to-end tests for the governed router: the deployed limiter policies,
//! the 429 contract, and the budget-isolation decision between named
//! limiters.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use gatewarden::rate_limit::{LimitPolicy, LimiterSettings, RateLimiter};
use gatewarden::service::router_with_limiters;
use tower::util::ServiceExt;

fn request(path: &str, method: &str, client: &str) -> Request {
    Request::builder()
        .uri(path)
        .method(method)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

fn deployed_router() -> axum::Router {
    let settings = LimiterSettings::default();
    router_with_limiters(
        RateLimiter::with_policy(settings.general),
        RateLimiter::with_policy(settings.auth),
        RateLimiter::with_policy(settings.reporting),
    )
}

#[tokio::test]
async fn auth_allows_five_then_rejects_with_retry_hint() {
    let router = deployed_router();

    for i in 0..5 {
        let response = router
            .clone()
            .oneshot(request("/auth/login", "POST", "1.2.3.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {} denied", i + 1);
    }

    let response = router
        .oneshot(request("/auth/login", "POST", "1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("Retry-After header present");
    assert!(
        (59..=60).contains(&retry_after),
        "retryAfter {} outside expected band",
        retry_after
    );

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Too many requests");
    assert_eq!(json["retryAfter"].as_u64(), Some(retry_after));
}

#[tokio::test]
async fn general_api_allows_one_hundred_per_window() {
    let router = deployed_router();

    for _ in 0..100 {
        let response = router
            .clone()
            .oneshot(request("/api/equipment", "GET", "5.5.5.5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .oneshot(request("/api/equipment", "GET", "5.5.5.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn clients_are_throttled_independently() {
    let router = deployed_router();

    for _ in 0..5 {
        let response = router
            .clone()
            .oneshot(request("/auth/login", "POST", "1.1.1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // A different client still has its full budget.
    let response = router
        .oneshot(request("/auth/login", "POST", "2.2.2.2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Regression guard for the store-sharing decision: each named limiter owns
/// an isolated store, so exhausting the auth budget must not consume any of
/// the same client's general-API budget.
#[tokio::test]
async fn cross_limiter_budgets_are_isolated() {
    let router = deployed_router();

    for _ in 0..6 {
        let _ = router
            .clone()
            .oneshot(request("/auth/login", "POST", "7.7.7.7"))
            .await
            .unwrap();
    }

    let response = router
        .oneshot(request("/api/equipment", "GET", "7.7.7.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Deliberate sharing is still available by constructing limiters over the
/// same store.
#[tokio::test]
async fn shared_store_pools_budgets_across_limiters() {
    let store = gatewarden::rate_limit::WindowStore::new();
    let policy = LimitPolicy::new(3, 60_000);
    let router = router_with_limiters(
        RateLimiter::new(policy, store.clone()),
        RateLimiter::new(policy, store.clone()),
        RateLimiter::new(policy, store),
    );

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(request("/auth/login", "POST", "8.8.8.8"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = router
        .clone()
        .oneshot(request("/api/equipment", "GET", "8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Fourth request against the shared budget, via any route, is rejected.
    let response = router
        .oneshot(request("/reports/summary", "GET", "8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(start_paused = true)]
async fn window_expiry_restores_the_budget() {
    let router = deployed_router();

    for _ in 0..5 {
        let _ = router
            .clone()
            .oneshot(request("/auth/login", "POST", "3.3.3.3"))
            .await
            .unwrap();
    }
    let response = router
        .clone()
        .oneshot(request("/auth/login", "POST", "3.3.3.3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(std::time::Duration::from_secs(61)).await;

    let response = router
        .oneshot(request("/auth/login", "POST", "3.3.3.3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
