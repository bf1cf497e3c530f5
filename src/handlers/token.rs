use crate::auth::extract_bearer;
use crate::error::RelayError;
use crate::lifecycle::LifecycleEvent;
use crate::models::TokenResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;

/// Serve a currently valid access token to an authenticated automation client
pub async fn get_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RelayError> {
    state.observer.on_event(&LifecycleEvent::RequestReceived {
        route: "/get-token",
    });

    let response: TokenResponse = state
        .manager
        .get_valid_token(extract_bearer(&headers))
        .await?;

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(response)))
}
