//! axum middleware enforcing the gateway guards.
//!
//! Mount with `axum::middleware::from_fn_with_state(gateway, guard)`.
//! Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
//! peer address is available as a fallback client identity.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use crate::Gateway;
use crate::circuit_breaker::CircuitOpen;
use crate::rate_limiter::{RateLimitInfo, RateLimited};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate-limit, then circuit-break, then forward to the inner service.
pub async fn guard(State(gateway): State<Arc<Gateway>>, req: Request, next: Next) -> Response {
    gateway.counters.total.fetch_add(1, Ordering::Relaxed);
    let client = client_id(&req);

    let quota = match gateway.limiter.check(&client) {
        Ok(quota) => quota,
        Err(limited) => {
            gateway
                .counters
                .rejected_by_limiter
                .fetch_add(1, Ordering::Relaxed);
            return rate_limited(limited);
        }
    };

    let admission = match gateway.breaker.admit() {
        Ok(admission) => admission,
        Err(open) => {
            gateway
                .counters
                .rejected_by_breaker
                .fetch_add(1, Ordering::Relaxed);
            return circuit_open(open);
        }
    };

    gateway.counters.admitted.fetch_add(1, Ordering::Relaxed);
    let mut response = next.run(req).await;

    let success = !response.status().is_server_error();
    gateway.breaker.record(admission, success);
    if !success {
        debug!(%client, status = %response.status(), "upstream failure recorded");
    }

    quota_headers(response.headers_mut(), &quota);
    response
}

/// First `x-forwarded-for` hop, else the peer address, else `"unknown"`.
pub fn client_id(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(first) = forwarded {
        return first.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn quota_headers(headers: &mut HeaderMap, quota: &RateLimitInfo) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(quota.reset_at / 1000));
}

fn rate_limited(limited: RateLimited) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate limit exceeded",
            "retryAfter": limited.retry_after_secs,
        })),
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(limited.retry_after_secs));
    quota_headers(
        headers,
        &RateLimitInfo {
            limit: limited.limit,
            remaining: 0,
            reset_at: limited.reset_at,
        },
    );
    response
}

fn circuit_open(open: CircuitOpen) -> Response {
    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "service temporarily unavailable",
            "retryAfter": open.retry_after_secs,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(open.retry_after_secs));
    response
}
