//! Rate-limit middleware for the `/api` routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hypha_ratelimit::{RateDecision, RateLimiter, RequestIdentity};
use serde_json::json;

/// Quota for the current window.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Requests left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Unix time at which the window resets.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Identity attributes of an incoming request.
pub fn request_identity(request: &Request) -> RequestIdentity {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    RequestIdentity {
        authorization: header(header::AUTHORIZATION.as_str()),
        forwarded_for: header("x-forwarded-for"),
        remote_addr: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}

/// Count the request; reject with 429 once the quota is spent.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = request_identity(&request);
    let method = request.method().as_str().to_owned();
    // Nested routers see a stripped path; quotas are keyed on the full one.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| request.uri().path(), |OriginalUri(uri)| uri.path())
        .to_owned();

    let decision = limiter.check_rate_limit(&identity, &method, &path).await;
    if !decision.allowed {
        return too_many_requests(&decision);
    }

    let mut response = next.run(request).await;
    set_quota_headers(response.headers_mut(), &decision);
    response
}

fn too_many_requests(decision: &RateDecision) -> Response {
    let body = json!({
        "error": "Too many requests",
        "retry_after": decision.reset_in_secs,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let _ = response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_in_secs));
    response
}

fn set_quota_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let reset_at = chrono::Utc::now()
        .timestamp()
        .saturating_add(i64::try_from(decision.reset_in_secs).unwrap_or(i64::MAX));
    let _ = headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    let _ = headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    let _ = headers.insert(RESET_HEADER, HeaderValue::from(reset_at));
}
