//! Access gatekeeper middleware
//!
//! Runs once per inbound data-plane request. Every step is a hard gate:
//! credential extraction, key resolution + verification, endpoint
//! authorization, IP allow-list, rate-limit admission. Admitted requests get
//! their counters committed, rate-limit headers attached, and a usage record
//! enqueued after the downstream handler finishes.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::ApiKey;
use crate::domain::tier::{matches_endpoint, TierRegistry};
use crate::domain::usage::UsageRecord;
use crate::infrastructure::api_key::rate_limiter::{next_day_start, RateLimiter};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Literal used in rate-limit headers for tiers without a daily ceiling
pub const UNLIMITED: &str = "unlimited";

/// Validated key attached to admitted requests for downstream handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub ApiKey);

/// The orchestrating middleware for every `/v1` request
pub async fn gatekeeper(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();

    let (admitted, mut req) = match run_gates(&state, req).await {
        Ok(outcome) => outcome,
        Err(e) => return e.into_response(),
    };

    req.extensions_mut()
        .insert(AuthenticatedKey(admitted.api_key.clone()));

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT, admitted.limit_header.clone());
    headers.insert(RATE_LIMIT_REMAINING, admitted.remaining_header.clone());
    headers.insert(RATE_LIMIT_RESET, admitted.reset_header.clone());

    let latency_ms = started.elapsed().as_millis() as u64;
    record_usage(&state, &admitted, &response, latency_ms);

    response
}

struct Admitted {
    api_key: ApiKey,
    endpoint: String,
    method: String,
    user_agent: Option<String>,
    client_ip: Option<IpAddr>,
    limit_header: HeaderValue,
    remaining_header: HeaderValue,
    reset_header: HeaderValue,
}

async fn run_gates(state: &AppState, req: Request) -> Result<(Admitted, Request), ApiError> {
    // 1. Credential extraction
    let credential = extract_credential(req.headers()).ok_or_else(ApiError::unauthorized)?;

    // 2 + 3. Resolution and verification. Store failures surface as 500, not
    // as a credential problem.
    let api_key = state
        .api_key_service
        .authenticate(&credential)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(ApiError::unauthorized)?;

    // Nested routers see a prefix-stripped URI; the original one carries the
    // full request path the tier patterns are written against.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    // 4. Endpoint authorization
    if !endpoint_allowed(&api_key, &path) {
        return Err(forbidden_endpoint(&api_key, &path));
    }

    // 5. IP allow-list
    let client_ip = client_ip(&req);

    if api_key.ip_allowlist().is_some() {
        let permitted = client_ip.map(|addr| api_key.allows_ip(addr)).unwrap_or(false);

        if !permitted {
            debug!(key_id = %api_key.id(), "Request address not on key allow-list");
            return Err(ApiError::forbidden(
                "Request address is not on this key's IP allow-list",
            ));
        }
    }

    // 6. Rate-limit admission (read-only check)
    let now = Utc::now();
    let decision = RateLimiter::admit(&api_key, now);

    if !decision.allowed {
        let reason = decision
            .reason
            .map(|r| r.message())
            .unwrap_or("Rate limit exceeded");

        let mut err = ApiError::too_many_requests(reason);

        if let Some(reset_at) = decision.reset_at {
            err = err.with_reset_at(reset_at);
        }

        return Err(err);
    }

    // 7. Commit the admission: one atomic counter increment
    let counters = state
        .api_key_service
        .commit_usage(api_key.id(), now)
        .await
        .map_err(ApiError::from)?;

    let (limit_header, remaining_header) = match api_key.requests_per_day() {
        Some(limit) => (
            header_value(limit.to_string()),
            header_value(limit.saturating_sub(counters.requests_used_today).to_string()),
        ),
        None => (
            HeaderValue::from_static(UNLIMITED),
            HeaderValue::from_static(UNLIMITED),
        ),
    };

    let reset_header = header_value(next_day_start(now).timestamp().to_string());

    let method = req.method().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let admitted = Admitted {
        api_key,
        endpoint: path,
        method,
        user_agent,
        client_ip,
        limit_header,
        remaining_header,
        reset_header,
    };

    Ok((admitted, req))
}

/// Extract the bearer credential. The Authorization header wins over
/// X-API-Key when both are present.
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// A per-key allow-list replaces the tier list; otherwise the tier decides
fn endpoint_allowed(api_key: &ApiKey, path: &str) -> bool {
    match api_key.endpoint_allowlist() {
        Some(list) => list.iter().any(|pattern| matches_endpoint(pattern, path)),
        None => TierRegistry::global().is_endpoint_allowed(api_key.tier(), path),
    }
}

fn forbidden_endpoint(api_key: &ApiKey, path: &str) -> ApiError {
    debug!(key_id = %api_key.id(), path = %path, "Endpoint not authorized");

    if api_key.endpoint_allowlist().is_some() {
        return ApiError::forbidden("Endpoint is not on this key's allow-list");
    }

    let registry = TierRegistry::global();
    let current = registry.descriptor(api_key.tier()).display_name;

    match registry.minimum_tier_for(path) {
        Some(required) => {
            let required_name = registry.descriptor(required).display_name;

            ApiError::forbidden(format!(
                "Endpoint not available on the {} tier. Upgrade to {} or higher to access it.",
                current, required_name
            ))
        }
        None => ApiError::forbidden(format!(
            "Endpoint not available on the {} tier",
            current
        )),
    }
}

/// Caller address: X-Forwarded-For (first hop) ahead of the socket peer
fn client_ip(req: &Request) -> Option<IpAddr> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(addr) = first.trim().parse() {
                    return Some(addr);
                }
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

/// Enqueue the usage record off the critical path; failures are absorbed by
/// the recorder
fn record_usage(state: &AppState, admitted: &Admitted, response: &Response, latency_ms: u64) {
    let status = response.status();

    let mut record = UsageRecord::new(
        admitted.api_key.id().clone(),
        admitted.api_key.owner_id().clone(),
        admitted.endpoint.clone(),
        admitted.method.clone(),
        status.as_u16(),
    )
    .with_latency_ms(latency_ms);

    if let Some(ref user_agent) = admitted.user_agent {
        record = record.with_user_agent(user_agent.clone());
    }

    if let Some(client_ip) = admitted.client_ip {
        record = record.with_client_ip(client_ip.to_string());
    }

    if status.is_client_error() || status.is_server_error() {
        let reason = status.canonical_reason().unwrap_or("request failed");
        record = record.with_error(reason);
    }

    state.usage_recorder.record(record);
}

fn header_value(value: String) -> HeaderValue {
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("0"))
}
