use crate::handlers;
use crate::state::AppState;
use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Build the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .route("/auth-start", get(handlers::auth_start))
        .route("/auth-callback", get(handlers::auth_callback))
        .route("/get-token", get(handlers::get_token))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

// Path only: the callback query carries the authorization code.
fn request_span(request: &Request) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    )
}
