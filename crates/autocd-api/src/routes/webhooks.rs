//! GitHub webhook endpoint.
//!
//! Requests pass through these gates in order, stopping at the first failure:
//! signature header present, body readable, signature valid, event header
//! present, event supported. Only then is a script dispatched.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use autocd_core::event::{EventPayload, PushEvent};
use autocd_core::signature::verify_signature;

use super::remote_addr;
use crate::AppState;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// Handle a GitHub webhook delivery.
pub async fn receive(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let (parts, body) = request.into_parts();
    let remote = remote_addr(&parts.extensions);
    let delivery = header(&parts.headers, DELIVERY_HEADER).unwrap_or_default();

    let Some(signature) = header(&parts.headers, SIGNATURE_HEADER) else {
        warn!(remote_addr = %remote, delivery, "webhook without signature header");
        return Err(ApiError::BadRequest(format!(
            "missing {} header",
            SIGNATURE_HEADER
        )));
    };

    let body: Bytes = axum::body::to_bytes(body, state.config.webhook.max_body_bytes)
        .await
        .map_err(|e| {
            error!(remote_addr = %remote, delivery, error = %e, "failed to read webhook body");
            ApiError::Internal("failed to read request body".to_string())
        })?;

    if !verify_signature(&signature, &body, &state.config.webhook.secret) {
        warn!(remote_addr = %remote, delivery, "webhook signature mismatch");
        return Err(ApiError::Unauthorized(format!(
            "{} does not match",
            SIGNATURE_HEADER
        )));
    }

    let Some(event) = header(&parts.headers, EVENT_HEADER) else {
        warn!(remote_addr = %remote, delivery, "webhook without event header");
        return Err(ApiError::BadRequest(format!("missing {} header", EVENT_HEADER)));
    };

    info!(remote_addr = %remote, delivery, event, "received GitHub webhook");

    if event == PushEvent::EVENT {
        handle_push(&state, &body)
    } else {
        warn!(event, "unsupported webhook event");
        Err(ApiError::BadRequest(format!(
            "unsupported event type: {}",
            event
        )))
    }
}

fn handle_push(state: &AppState, body: &[u8]) -> Result<Json<Value>, ApiError> {
    let push: PushEvent = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "cannot decode push payload");
        ApiError::BadRequest(format!("invalid push payload: {}", e))
    })?;

    let script = state.config.scripts.push.as_str();
    let commit = push.head_commit.short_id();
    info!(
        commit,
        script,
        message = push.head_commit.message.lines().next().unwrap_or_default(),
        "dispatching push script"
    );

    state.dispatcher.dispatch(script, push.script_env());

    Ok(Json(json!({
        "message": format!("push {} accepted", commit),
        "status": "running",
        "script": script,
    })))
}

/// Non-empty header value as a string.
fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}
