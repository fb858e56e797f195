//! Avatar HTTP REST API
//!
//! Axum server used by the browser widget (transcript intake, session tokens)
//! and by operators (review queue). Runs alongside the optional Unix socket.
//!
//! Each endpoint is a thin axum handler over an `*_inner` function returning
//! `(StatusCode, Value)`, so the logic is testable without axum dispatch.
//!
//! Endpoints (nonce action in brackets, sent as `X-Avatar-Nonce`):
//! - GET  /health                      : store health
//! - GET  /version                     : server version info
//! - GET  /nonce?action=               : issue a nonce
//! - POST /session-token               : Anam session token [avatar_transcript]
//! - POST /transcripts                 : save a transcript [avatar_transcript]
//! - GET  /transcripts                 : unparsed transcripts [avatar_review]
//! - GET  /transcripts/:session_id     : fetch a transcript [avatar_review]
//! - POST /reviews/:session_id/parse   : extract + create review [avatar_review]
//! - GET  /reviews?status=             : list reviews [avatar_review]
//! - PUT  /reviews/:session_id         : manual field edit [avatar_review]
//! - POST /reviews/:session_id/forward : forward to Supabase [avatar_review]
//! - POST /extract                     : extraction preview [avatar_review]
//! - POST /admin/reset                 : delete everything [avatar_review]

use std::sync::Arc;

use anyhow::Result;
use avatar_core::ipc::{ReviewRequest, ReviewResponse};
use avatar_core::models::ReviewStatus;
use avatar_core::{NonceIssuer, REVIEW_ACTION, TRANSCRIPT_ACTION};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::context::AppContext;

pub const NONCE_HEADER: &str = "x-avatar-nonce";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub ctx: AppContext,
    pub nonces: NonceIssuer,
}

impl HttpState {
    pub fn new(ctx: AppContext) -> Self {
        let nonces = NonceIssuer::new(&ctx.config.nonce);
        Self { ctx, nonces }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/nonce", get(nonce_handler))
        .route("/session-token", post(session_token_handler))
        .route(
            "/transcripts",
            post(save_transcript_handler).get(list_unparsed_handler),
        )
        .route("/transcripts/:session_id", get(get_transcript_handler))
        .route("/reviews", get(list_reviews_handler))
        .route("/reviews/:session_id", put(update_review_handler))
        .route("/reviews/:session_id/parse", post(parse_handler))
        .route("/reviews/:session_id/forward", post(forward_handler))
        .route("/extract", post(extract_handler))
        .route("/admin/reset", post(reset_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(ctx: AppContext, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);
    let state = Arc::new(HttpState::new(ctx));

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Avatar HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct NonceQuery {
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SaveTranscriptBody {
    pub session_id: Option<String>,
    pub messages: Option<Value>,
    pub page_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExtractBody {
    #[serde(default)]
    pub text: Value,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

fn error_body(code: &str, msg: impl Into<String>) -> Value {
    json!({
        "error": msg.into(),
        "status": "error",
        "code": code,
    })
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, Value) {
    (StatusCode::BAD_REQUEST, error_body("validation", msg))
}

/// Bodies are decoded only after the nonce check, so a rejected caller
/// always sees the 403 envelope.
fn decode_body<T: DeserializeOwned>(raw: &[u8]) -> std::result::Result<T, (StatusCode, Value)> {
    serde_json::from_slice(raw).map_err(|e| bad_request(format!("Invalid JSON body: {}", e)))
}

/// `None` when the nonce is valid for `action`, otherwise the 403 to return.
pub fn check_nonce(
    nonces: &NonceIssuer,
    nonce: Option<&str>,
    action: &str,
) -> Option<(StatusCode, Value)> {
    match nonce {
        Some(token) if nonces.verify(action, token) => None,
        _ => {
            tracing::warn!(action, present = nonce.is_some(), "Rejected request: bad nonce");
            Some((
                StatusCode::FORBIDDEN,
                error_body("forbidden", "Invalid or expired nonce"),
            ))
        }
    }
}

/// Dispatch through the router after the nonce check.
async fn guarded(
    state: &HttpState,
    nonce: Option<&str>,
    action: &str,
    request: ReviewRequest,
) -> (StatusCode, Value) {
    if let Some(rejection) = check_nonce(&state.nonces, nonce, action) {
        return rejection;
    }
    response_to_http(crate::router::handle_request(request, &state.ctx).await)
}

pub async fn health_inner(ctx: &AppContext) -> (StatusCode, Value) {
    let response = crate::router::handle_request(ReviewRequest::Health, ctx).await;
    if !response.is_ok() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "error": response.error,
            }),
        );
    }

    let mut body = response.data.unwrap_or_else(|| json!({}));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
        obj.insert("socket".to_string(), json!(ctx.config.service.socket_path));
    }
    (StatusCode::OK, body)
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "avatar/1",
    })
}

pub fn nonce_inner(nonces: &NonceIssuer, query: NonceQuery) -> (StatusCode, Value) {
    let action = match query.action.as_deref() {
        Some(a @ (TRANSCRIPT_ACTION | REVIEW_ACTION)) => a,
        Some(other) => return bad_request(format!("unknown nonce action '{}'", other)),
        None => return bad_request("action query parameter is required"),
    };

    (
        StatusCode::OK,
        json!({
            "action": action,
            "nonce": nonces.issue(action),
            "lifetime_seconds": nonces.lifetime_seconds(),
        }),
    )
}

pub async fn session_token_inner(state: &HttpState, nonce: Option<&str>) -> (StatusCode, Value) {
    guarded(state, nonce, TRANSCRIPT_ACTION, ReviewRequest::SessionToken).await
}

pub async fn save_transcript_inner(
    state: &HttpState,
    nonce: Option<&str>,
    raw: &[u8],
) -> (StatusCode, Value) {
    if let Some(rejection) = check_nonce(&state.nonces, nonce, TRANSCRIPT_ACTION) {
        return rejection;
    }
    let body: SaveTranscriptBody = match decode_body(raw) {
        Ok(b) => b,
        Err(rejection) => return rejection,
    };
    let session_id = match body.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return bad_request("session_id field is required"),
    };
    let messages = match body.messages {
        Some(m) => m,
        None => return bad_request("messages field is required"),
    };

    let request = ReviewRequest::SaveTranscript {
        session_id,
        messages,
        page_url: body.page_url,
    };
    response_to_http(crate::router::handle_request(request, &state.ctx).await)
}

pub async fn get_transcript_inner(
    state: &HttpState,
    nonce: Option<&str>,
    session_id: String,
) -> (StatusCode, Value) {
    guarded(state, nonce, REVIEW_ACTION, ReviewRequest::GetTranscript { session_id }).await
}

pub async fn list_unparsed_inner(state: &HttpState, nonce: Option<&str>) -> (StatusCode, Value) {
    guarded(state, nonce, REVIEW_ACTION, ReviewRequest::ListUnparsed).await
}

pub async fn parse_inner(
    state: &HttpState,
    nonce: Option<&str>,
    session_id: String,
) -> (StatusCode, Value) {
    guarded(state, nonce, REVIEW_ACTION, ReviewRequest::Parse { session_id }).await
}

pub async fn list_reviews_inner(
    state: &HttpState,
    nonce: Option<&str>,
    query: ListQuery,
) -> (StatusCode, Value) {
    if let Some(rejection) = check_nonce(&state.nonces, nonce, REVIEW_ACTION) {
        return rejection;
    }
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => match s.parse::<ReviewStatus>() {
            Ok(status) => Some(status),
            Err(e) => return bad_request(e.to_string()),
        },
        None => None,
    };
    response_to_http(crate::router::handle_request(ReviewRequest::List { status }, &state.ctx).await)
}

pub async fn update_review_inner(
    state: &HttpState,
    nonce: Option<&str>,
    session_id: String,
    raw: &[u8],
) -> (StatusCode, Value) {
    if let Some(rejection) = check_nonce(&state.nonces, nonce, REVIEW_ACTION) {
        return rejection;
    }
    let fields: Value = match decode_body(raw) {
        Ok(f) => f,
        Err(rejection) => return rejection,
    };
    let request = ReviewRequest::UpdateFields { session_id, fields };
    response_to_http(crate::router::handle_request(request, &state.ctx).await)
}

pub async fn forward_inner(
    state: &HttpState,
    nonce: Option<&str>,
    session_id: String,
) -> (StatusCode, Value) {
    guarded(state, nonce, REVIEW_ACTION, ReviewRequest::Forward { session_id }).await
}

pub async fn extract_inner(
    state: &HttpState,
    nonce: Option<&str>,
    raw: &[u8],
) -> (StatusCode, Value) {
    if let Some(rejection) = check_nonce(&state.nonces, nonce, REVIEW_ACTION) {
        return rejection;
    }
    let body: ExtractBody = match decode_body(raw) {
        Ok(b) => b,
        Err(rejection) => return rejection,
    };
    let request = ReviewRequest::Extract { text: body.text };
    response_to_http(crate::router::handle_request(request, &state.ctx).await)
}

pub async fn reset_inner(state: &HttpState, nonce: Option<&str>) -> (StatusCode, Value) {
    guarded(state, nonce, REVIEW_ACTION, ReviewRequest::Reset).await
}

// ============================================================================
// Axum handler wrappers (thin, delegating to inner functions)
// ============================================================================

fn nonce_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(NONCE_HEADER).and_then(|v| v.to_str().ok())
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.ctx).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn nonce_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<NonceQuery>,
) -> impl IntoResponse {
    let (status, body) = nonce_inner(&state.nonces, query);
    (status, Json(body))
}

pub async fn session_token_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = session_token_inner(&state, nonce_header(&headers)).await;
    (status, Json(body))
}

pub async fn save_transcript_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    raw: Bytes,
) -> impl IntoResponse {
    let (status, body) = save_transcript_inner(&state, nonce_header(&headers), &raw).await;
    (status, Json(body))
}

pub async fn get_transcript_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = get_transcript_inner(&state, nonce_header(&headers), session_id).await;
    (status, Json(body))
}

pub async fn list_unparsed_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = list_unparsed_inner(&state, nonce_header(&headers)).await;
    (status, Json(body))
}

pub async fn parse_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = parse_inner(&state, nonce_header(&headers), session_id).await;
    (status, Json(body))
}

pub async fn list_reviews_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = list_reviews_inner(&state, nonce_header(&headers), query).await;
    (status, Json(body))
}

pub async fn update_review_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    raw: Bytes,
) -> impl IntoResponse {
    let (status, body) =
        update_review_inner(&state, nonce_header(&headers), session_id, &raw).await;
    (status, Json(body))
}

pub async fn forward_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = forward_inner(&state, nonce_header(&headers), session_id).await;
    (status, Json(body))
}

pub async fn extract_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    raw: Bytes,
) -> impl IntoResponse {
    let (status, body) = extract_inner(&state, nonce_header(&headers), &raw).await;
    (status, Json(body))
}

pub async fn reset_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = reset_inner(&state, nonce_header(&headers)).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// HTTP status for an envelope error code.
pub fn status_for_code(code: Option<&str>) -> StatusCode {
    match code {
        Some("validation") => StatusCode::BAD_REQUEST,
        Some("forbidden") => StatusCode::FORBIDDEN,
        Some("not_found") => StatusCode::NOT_FOUND,
        Some("already_sent") | Some("in_progress") => StatusCode::CONFLICT,
        Some("upstream") => StatusCode::BAD_GATEWAY,
        Some("not_configured") => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a router `ReviewResponse` into an HTTP status and body.
pub fn response_to_http(response: ReviewResponse) -> (StatusCode, Value) {
    if response.is_ok() {
        return (StatusCode::OK, response.data.unwrap_or_else(|| json!({})));
    }

    let code = response.code.as_deref().unwrap_or("internal");
    let status = status_for_code(Some(code));
    let msg = response.error.unwrap_or_else(|| "unknown error".to_string());
    if status.is_server_error() {
        tracing::error!(code, "Request failed: {}", msg);
    }
    (status, error_body(code, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::AvatarConfig;

    fn state() -> HttpState {
        HttpState::new(AppContext::in_memory(AvatarConfig::in_memory()))
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["protocol"], "avatar/1");
    }

    #[test]
    fn test_response_to_http_ok() {
        let (status, body) = response_to_http(ReviewResponse::ok(json!({"count": 0})));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[test]
    fn test_response_to_http_ok_no_data() {
        let mut resp = ReviewResponse::ok(json!({}));
        resp.data = None;
        let (_, body) = response_to_http(resp);
        assert!(body.is_object());
    }

    #[test]
    fn test_response_to_http_maps_codes() {
        let cases = [
            ("validation", StatusCode::BAD_REQUEST),
            ("not_found", StatusCode::NOT_FOUND),
            ("already_sent", StatusCode::CONFLICT),
            ("in_progress", StatusCode::CONFLICT),
            ("upstream", StatusCode::BAD_GATEWAY),
            ("not_configured", StatusCode::SERVICE_UNAVAILABLE),
            ("internal", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, expected) in cases {
            let (status, body) = response_to_http(ReviewResponse::err_with_code(code, "boom"));
            assert_eq!(status, expected, "code {}", code);
            assert_eq!(body["code"], code);
            assert_eq!(body["error"], "boom");
        }
    }

    #[test]
    fn test_response_to_http_error_no_message() {
        let mut resp = ReviewResponse::err("x");
        resp.error = None;
        let (status, body) = response_to_http(resp);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "unknown error");
    }

    #[test]
    fn test_nonce_inner_issues_for_known_actions() {
        let state = state();
        let (status, body) = nonce_inner(
            &state.nonces,
            NonceQuery {
                action: Some(REVIEW_ACTION.to_string()),
            },
        );
        assert_eq!(status, StatusCode::OK);
        let nonce = body["nonce"].as_str().unwrap();
        assert!(state.nonces.verify(REVIEW_ACTION, nonce));
    }

    #[test]
    fn test_nonce_inner_rejects_unknown_action() {
        let state = state();
        let (status, _) = nonce_inner(
            &state.nonces,
            NonceQuery {
                action: Some("delete_everything".to_string()),
            },
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = nonce_inner(&state.nonces, NonceQuery::default());
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_nonce_is_forbidden() {
        let state = state();
        let (status, body) = reset_inner(&state, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");
    }

    #[tokio::test]
    async fn test_nonce_for_other_action_is_forbidden() {
        let state = state();
        let transcript_nonce = state.nonces.issue(TRANSCRIPT_ACTION);
        let (status, _) = reset_inner(&state, Some(&transcript_nonce)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_save_transcript_requires_fields() {
        let state = state();
        let nonce = state.nonces.issue(TRANSCRIPT_ACTION);

        let (status, body) =
            save_transcript_inner(&state, Some(&nonce), br#"{"session_id": "s"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("messages"));

        let (status, _) = save_transcript_inner(&state, Some(&nonce), b"{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_nonce_checked_before_body() {
        let state = state();

        let (status, body) = save_transcript_inner(&state, None, b"not json").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");

        let (status, _) = update_review_inner(&state, None, "s".into(), b"{").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let nonce = state.nonces.issue(REVIEW_ACTION);
        let (status, body) = extract_inner(&state, Some(&nonce), b"{").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation");
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let state = state();
        let nonce = state.nonces.issue(REVIEW_ACTION);
        let (status, _) = list_reviews_inner(
            &state,
            Some(&nonce),
            ListQuery {
                status: Some("archived".into()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_parse_unknown_session_is_404() {
        let state = state();
        let nonce = state.nonces.issue(REVIEW_ACTION);
        let (status, body) = parse_inner(&state, Some(&nonce), "ghost".into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_health_inner_memory_store() {
        let (status, body) = health_inner(&state().ctx).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
