//! Operator endpoints over live runs.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{info, warn};

use autocd_core::signature::secrets_match;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_runs))
        .route("/stop-all", post(stop_all))
        .route("/{event}/stop", post(stop_event))
}

/// Operator authenticated with the configured admin bearer token.
#[derive(Debug, Clone, Copy)]
pub struct OperatorAuth;

impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin
            .token
            .as_deref()
            .ok_or_else(|| ApiError::Unauthorized("operator API is disabled".into()))?;

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized("expected Authorization: Bearer <token>".into())
            })?;

        if !secrets_match(token, expected) {
            warn!(path = %parts.uri.path(), "rejected operator token");
            return Err(ApiError::Unauthorized("invalid operator token".into()));
        }

        Ok(OperatorAuth)
    }
}

async fn list_runs(_auth: OperatorAuth, State(state): State<AppState>) -> Json<Value> {
    let runs = state.runner.running();
    Json(json!({
        "count": runs.len(),
        "runs": runs,
    }))
}

async fn stop_event(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stopped = state.runner.stop(&event)?;
    info!(event, stopped, "operator stopped runs");
    Ok(Json(json!({
        "event": event,
        "stopped": stopped,
    })))
}

async fn stop_all(_auth: OperatorAuth, State(state): State<AppState>) -> Json<Value> {
    let stopped = state.runner.stop_all();
    info!(stopped, "operator stopped all runs");
    Json(json!({ "stopped": stopped }))
}
