//! Status dashboard and keepalive endpoint.
//!
//! Spawned as a background task by the gateway. `/`, `/ping`, and
//! `/api/status` are public; `/api/jobs` requires the bearer key when one is
//! configured.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{Html, Json},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use wacast_core::config::ApiConfig;
use wacast_jobs::{BatchRunner, JobKind};

use crate::gateway::keepalive::{format_uptime, KeepaliveStats};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub bot_name: String,
    pub owner_name: String,
    pub uptime: Instant,
    pub keepalive: Arc<KeepaliveStats>,
    pub runner: Arc<BatchRunner>,
    pub api_key: Option<String>,
}

/// Constant-time string comparison to prevent timing attacks on API token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. Returns `None` if authorized, `Some(response)` if rejected.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Option<(StatusCode, Json<Value>)> {
    let key = api_key.as_ref()?;

    let Some(header) = headers.get("authorization") else {
        return Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing Authorization header"})),
        ));
    };

    let Ok(value) = header.to_str() else {
        return Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid Authorization header"})),
        ));
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => None,
        _ => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )),
    }
}

/// `GET /`: small HTML status page.
async fn index(State(state): State<ApiState>) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n\
         <html><head><meta charset=\"utf-8\"><title>{name}</title></head>\n\
         <body style=\"font-family: sans-serif; max-width: 40em; margin: 3em auto;\">\n\
         <h1>{name}</h1>\n\
         <p>Status: <strong>online</strong></p>\n\
         <p>Owner: {owner}</p>\n\
         <p>Uptime: {uptime}</p>\n\
         <p>Keepalive pings: {pings}</p>\n\
         </body></html>\n",
        name = escape_html(&state.bot_name),
        owner = escape_html(&state.owner_name),
        uptime = format_uptime(state.uptime.elapsed()),
        pings = state.keepalive.count(),
    ))
}

/// `GET /ping`: keepalive target.
async fn ping(State(state): State<ApiState>) -> &'static str {
    state.keepalive.record();
    "pong"
}

/// `GET /api/status`
async fn status(State(state): State<ApiState>) -> Json<Value> {
    let elapsed = state.uptime.elapsed();
    Json(json!({
        "status": "online",
        "botName": state.bot_name,
        "ownerName": state.owner_name,
        "uptime": format_uptime(elapsed),
        "uptimeSecs": elapsed.as_secs(),
        "pingCount": state.keepalive.count(),
        "lastPing": state.keepalive.last_ping(),
    }))
}

/// `GET /api/jobs`: saved checkpoints and ledger totals.
async fn jobs(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let registry = state.runner.registry();
    let jobs: Vec<Value> = JobKind::ALL
        .iter()
        .map(|&kind| match state.runner.checkpoints().load(kind) {
            Some(cp) => json!({
                "kind": kind.as_str(),
                "running": registry.is_running(kind),
                "isActive": cp.is_active,
                "currentIndex": cp.current_index,
                "total": cp.items.len(),
                "remaining": cp.remaining(),
                "lastActiveAt": cp.last_active_at,
            }),
            None => json!({
                "kind": kind.as_str(),
                "running": registry.is_running(kind),
                "isActive": false,
            }),
        })
        .collect();

    let ledger = state.runner.ledger().load();
    Ok(Json(json!({
        "jobs": jobs,
        "ledger": {
            "verified": ledger.verified_set.len(),
            "rejected": ledger.rejected_set.len(),
            "notified": ledger.notified_set.len(),
            "lastUpdated": ledger.last_updated,
        },
    })))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Build the router. Split out so tests can drive it without binding a port.
fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/api/status", get(status))
        .route("/api/jobs", get(jobs))
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

/// Start the dashboard server. Called from `Gateway::run()`.
pub async fn serve(config: ApiConfig, state: ApiState) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("API server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("API server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("API server error: {e}");
    }
}
