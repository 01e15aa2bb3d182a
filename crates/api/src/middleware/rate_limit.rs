//! Per-client rate limiting for build submission.
//!
//! Scoped to the two POST routes only; status polling and downloads are
//! never limited. Counters live in the queue backend so every API instance
//! shares one namespace.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use demo2apk_core::CoreError;
use demo2apk_queue::RateDecision;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Axum middleware enforcing the submission quota.
pub async fn enforce(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let key = client_key(&request);
    let limit = if bearer_matches(request.headers(), state.config.auth_token.as_deref()) {
        state.config.rate_limit_max_auth
    } else {
        state.config.rate_limit_max
    };

    match state
        .store
        .check_rate(&key, limit, state.config.rate_limit_window())
        .await?
    {
        RateDecision::Allowed { .. } => Ok(next.run(request).await),
        RateDecision::Limited { retry_after_secs } => {
            tracing::warn!(client = %key, retry_after_secs, "Rate limit exceeded");
            Err(ApiError::Core(CoreError::RateLimited { retry_after_secs }))
        }
    }
}

/// Client identity: first X-Forwarded-For hop when present, else the peer
/// address, else a shared bucket.
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
        {
            return first.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Whether the request carries the configured bearer token.
fn bearer_matches(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}
