//! API routes.

pub mod health;
pub mod runs;
pub mod webhooks;

use std::net::SocketAddr;

use crate::AppState;
use axum::extract::{ConnectInfo, Request};
use axum::http::{Extensions, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing::warn;

/// Build the main router.
///
/// The webhook route lives at the configured path. Operator routes are only
/// mounted when an admin token is configured.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(&state.config.webhook.path, post(webhooks::receive))
        .merge(health::router());

    if state.config.admin.token.is_some() {
        router = router.nest("/runs", runs::router());
    }

    router.fallback(deny_scan).with_state(state)
}

/// Anything off the known routes is treated as a scan.
async fn deny_scan(request: Request) -> impl IntoResponse {
    let remote = remote_addr(request.extensions());
    warn!(
        remote_addr = %remote,
        method = %request.method(),
        path = %request.uri().path(),
        "request to unknown route"
    );

    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not found",
            "ip": remote,
        })),
    )
}

/// Peer address when the server was started with connect info.
pub(crate) fn remote_addr(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
