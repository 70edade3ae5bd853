//! Axum middleware applying [`RateLimitPolicy`] to every HTTP request.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use super::policy::{Limit, RateLimitPolicy, caller_key};
use crate::app_state::AppState;
use crate::auth::CallerIdentity;
use crate::error::GatewayError;

/// Admits or rejects the request before it reaches a handler.
///
/// # Errors
///
/// Returns [`GatewayError::RateLimited`] when the caller's window is full.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if RateLimitPolicy::is_excluded(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let caller = CallerIdentity::from_headers(request.headers());
    let policy = &state.rate_policy;
    let Limit::PerWindow(limit) = policy.limit_for(caller.user_id.as_ref(), caller.role) else {
        return Ok(next.run(request).await);
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = client_ip(request.headers()).or(peer);
    let key = caller_key(caller.user_id.as_ref(), ip);

    let admission = state.rate_limiter.check(&key, limit, policy.window);
    if !admission.admitted {
        tracing::debug!(
            key = %key,
            limit,
            retry_after_ms = admission.retry_after.as_millis(),
            "request rejected by rate limiter"
        );
        return Err(GatewayError::RateLimited {
            limit,
            window_secs: policy.window.as_secs(),
            retry_after_ms: u64::try_from(admission.retry_after.as_millis()).unwrap_or(u64::MAX),
        });
    }

    Ok(next.run(request).await)
}

/// Client address reported by a fronting proxy, if any.
///
/// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && let Ok(ip) = first.trim().parse()
    {
        return Some(ip);
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
