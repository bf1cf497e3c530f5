use crate::state::AppState;
use axum::extract::State;
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

/// Liveness plus whether a token record is currently stored.
/// Never reveals token material.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, code, authorized) = match state.store.load().await {
        Ok(record) => ("healthy", StatusCode::OK, Some(record.is_some())),
        Err(e) => {
            warn!("Health check could not read token store: {}", e);
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, None)
        }
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": "oauth-token-relay",
            "version": env!("CARGO_PKG_VERSION"),
            "authorized": authorized,
        })),
    )
}
