//! Rate limit middleware
//!
//! Axum layer placed ahead of the business handlers. Allowed requests flow
//! through untouched; rejected requests short-circuit with a 429 and a JSON
//! body carrying the retry hint. Rejection is an expected condition and is
//! never logged above debug.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::debug;

use super::limiter::{LimitDecision, RateLimiter};

/// Gate a request through the limiter carried in state.
pub async fn enforce_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match limiter.check(&key).await {
        LimitDecision::Allowed { .. } => next.run(request).await,
        LimitDecision::Rejected { retry_after_secs } => {
            debug!(
                "Rate limit exceeded for {} on {} (retry after {}s)",
                key,
                request.uri().path(),
                retry_after_secs
            );
            rejection(retry_after_secs)
        }
    }
}

/// Client identity used to bucket counters.
///
/// Prefers the first `X-Forwarded-For` entry (the service sits behind a
/// proxy in deployment), falling back to the peer address.
pub fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rejection(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after_secs.to_string())],
        Json(json!({
            "error": "Too many requests",
            "retryAfter": retry_after_secs,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_forwarded_for(value: &str) -> Request {
        Request::builder()
            .uri("/api/equipment")
            .header("x-forwarded-for", value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let request = request_with_forwarded_for("1.2.3.4, 10.0.0.1");
        assert_eq!(client_key(&request), "1.2.3.4");
    }

    #[test]
    fn test_client_key_falls_back_to_peer_addr() {
        let mut request = Request::builder()
            .uri("/api/equipment")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("5.6.7.8:1234".parse().unwrap()));

        assert_eq!(client_key(&request), "5.6.7.8");
    }

    #[test]
    fn test_client_key_unknown_without_identity() {
        let request = Request::builder()
            .uri("/api/equipment")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "unknown");
    }

    #[test]
    fn test_rejection_shape() {
        let response = rejection(42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }
}
