//! Administrative HTTP facade over the wasp enforcement core.
//!
//! Localhost by default. The core stays synchronous; handlers call into it
//! through an `Arc`-shared [`AppState`]. Authentication policy:
//!
//! - `WASP_API_TOKEN` set: protected endpoints require an `Authorization`
//!   header carrying the token, either bare or as `Bearer <token>`,
//!   compared exactly.
//! - unset: protected endpoints accept loopback clients only.
//!
//! The client IP comes from the first comma-separated entry of
//! `X-Forwarded-For`, then `X-Real-IP`; with neither header present the
//! peer is a direct connection, which counts as loopback here because the
//! listener binds loopback unless an operator chooses otherwise.
//!
//! Error bodies are `{"error": "..."}` and never contain the configured
//! token or any filesystem path.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use wasp_core::config::{RateLimitConfig, API_TOKEN_ENV};
use wasp_core::{audit, contacts};
use wasp_core::{Decision, Platform, RateLimiter, Store, TrustLevel};

/// Shared state behind every handler.
pub struct AppState {
    store: Arc<Store>,
    token: Option<String>,
    limiter: RateLimiter,
    ratelimit: RateLimitConfig,
}

impl AppState {
    pub fn new(store: Arc<Store>, token: Option<String>, ratelimit: RateLimitConfig) -> Self {
        Self {
            store,
            token,
            limiter: RateLimiter::new(),
            ratelimit,
        }
    }

    /// Read the admin token from `WASP_API_TOKEN`.
    pub fn with_env_token(store: Arc<Store>, ratelimit: RateLimitConfig) -> Self {
        let token = std::env::var(API_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Self::new(store, token, ratelimit)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

/// Build the facade router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/check", post(check))
        .route("/contacts", get(list_contacts).post(upsert_contact))
        .route("/contacts/:identifier", axum::routing::delete(delete_contact))
        .route("/audit", get(query_audit))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `addr` and serve until the task is dropped.
pub async fn serve(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "admin facade listening");
    axum::serve(listener, router(state)).await
}

// ----------- Auth & client identity -----------

/// Client IP as reported by proxy headers; `None` means a direct
/// connection with no proxy in front.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real = real.trim();
        if !real.is_empty() {
            return Some(real.to_string());
        }
    }
    None
}

fn is_loopback(ip: &Option<String>) -> bool {
    match ip.as_deref() {
        None => true,
        Some("127.0.0.1") | Some("::1") => true,
        _ => false,
    }
}

/// Gate for protected endpoints. The failure body is fixed text so no
/// secret material can leak through it.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    match &state.token {
        Some(token) => {
            let supplied = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let bearer = format!("Bearer {token}");
            if supplied == token.as_str() || supplied == bearer {
                Ok(())
            } else {
                Err(error_response(StatusCode::UNAUTHORIZED, "unauthorized"))
            }
        }
        None => {
            if is_loopback(&client_ip(headers)) {
                Ok(())
            } else {
                Err(error_response(
                    StatusCode::UNAUTHORIZED,
                    "loopback only: set an API token for remote access",
                ))
            }
        }
    }
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

fn storage_error(e: wasp_core::Error) -> Response {
    tracing::error!(error = %e, "facade storage failure");
    // Detail stays in the log; the body must not expose paths.
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
}

// ----------- /check -----------

#[derive(Debug, Deserialize)]
struct CheckBody {
    identifier: String,
    #[serde(default)]
    platform: Option<String>,
}

async fn check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<CheckBody>>,
) -> Response {
    let Some(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "body must be JSON");
    };

    let ip = client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let rate = state.limiter.check(&ip, &state.ratelimit);
    let mut rl_headers = HeaderMap::new();
    rl_headers.insert(
        "x-ratelimit-limit",
        HeaderValue::from(state.ratelimit.max_requests),
    );
    rl_headers.insert("x-ratelimit-remaining", HeaderValue::from(rate.remaining));
    rl_headers.insert("x-ratelimit-reset-ms", HeaderValue::from(rate.reset_ms));
    if !rate.allowed {
        let mut resp = error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
        resp.headers_mut().extend(rl_headers);
        return resp;
    }

    if body.identifier.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "identifier must not be empty");
    }
    let platform = match parse_platform(body.platform.as_deref()) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let result = match contacts::check(&state.store, &body.identifier, platform) {
        Ok(result) => result,
        Err(e) => return storage_error(e),
    };
    // One audit row per check decision, same as the inbound pipeline.
    if let Err(e) = audit::log(
        &state.store,
        &body.identifier,
        platform.as_str(),
        contacts::decision_for(&result),
        &result.reason,
    ) {
        return storage_error(e);
    }
    let mut resp = (StatusCode::OK, Json(result)).into_response();
    resp.headers_mut().extend(rl_headers);
    resp
}

// ----------- /contacts -----------

#[derive(Debug, Deserialize)]
struct ContactFilter {
    platform: Option<String>,
    trust: Option<String>,
}

async fn list_contacts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<ContactFilter>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let platform = match filter.platform.as_deref().map(Platform::from_str).transpose() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let trust = match filter.trust.as_deref().map(TrustLevel::from_str).transpose() {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match contacts::list(&state.store, platform, trust) {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct UpsertBody {
    identifier: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    trust: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

async fn upsert_contact(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<UpsertBody>>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let Some(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "body must be JSON");
    };
    if body.identifier.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "identifier must not be empty");
    }
    let platform = match parse_platform(body.platform.as_deref()) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    // Absent trust defaults to the weakest whitelisted label.
    let trust = match body.trust.as_deref() {
        None => TrustLevel::Limited,
        Some(s) => match TrustLevel::from_str(s) {
            Ok(t) => t,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        },
    };
    match contacts::upsert(
        &state.store,
        &body.identifier,
        platform,
        trust,
        body.name.as_deref(),
        body.notes.as_deref(),
    ) {
        Ok(contact) => (StatusCode::OK, Json(contact)).into_response(),
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    platform: Option<String>,
}

async fn delete_contact(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    UrlPath(identifier): UrlPath<String>,
    Query(q): Query<DeleteQuery>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let platform = match parse_platform(q.platform.as_deref()) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match contacts::remove(&state.store, &identifier, platform) {
        Ok(removed) => (StatusCode::OK, Json(json!({ "removed": removed }))).into_response(),
        Err(wasp_core::Error::InvalidInput(msg)) => {
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
        Err(e) => storage_error(e),
    }
}

// ----------- /audit -----------

#[derive(Debug, Deserialize)]
struct AuditParams {
    limit: Option<usize>,
    decision: Option<String>,
}

async fn query_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AuditParams>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    if let Some(limit) = params.limit {
        if limit == 0 || limit > audit::MAX_QUERY_LIMIT {
            return error_response(
                StatusCode::BAD_REQUEST,
                "limit must lie between 1 and 1000",
            );
        }
    }
    let decision = match params.decision.as_deref().map(Decision::from_str).transpose() {
        Ok(d) => d,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let q = audit::AuditQuery {
        limit: params.limit,
        decision,
        since: None,
    };
    match audit::query(&state.store, &q) {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => storage_error(e),
    }
}

// ----------- /health -----------

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.store.schema_version() {
        Ok(v) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "schema_version": v })),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

// ----------- Helpers -----------

/// Platform from an optional request field; omitted means webchat.
fn parse_platform(s: Option<&str>) -> Result<Platform, Response> {
    match s {
        None => Ok(Platform::Webchat),
        Some(raw) => Platform::from_str(raw)
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string())),
    }
}
