use super::pages::{error_page, render_page, AuthSuccessPage};
use crate::auth::{
    build_authorization_redirect, clear_state_cookie, extract_state_cookie, state_cookie,
    CallbackQuery,
};
use crate::lifecycle::LifecycleEvent;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

/// Redirect the browser to the provider's login page
pub async fn auth_start(State(state): State<AppState>) -> Response {
    state.observer.on_event(&LifecycleEvent::RequestReceived {
        route: "/auth-start",
    });

    let redirect = match build_authorization_redirect(&state.config) {
        Ok(redirect) => redirect,
        Err(e) => {
            error!("Cannot start authorization: {}", e);
            state.observer.on_event(&LifecycleEvent::Failed {
                category: e.category(),
                message: e.to_string(),
            });
            return error_page(&e);
        }
    };

    info!("Redirecting browser to provider authorization endpoint");

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, redirect.url),
            (
                header::SET_COOKIE,
                state_cookie(&redirect.state, state.config.uses_https()),
            ),
        ],
    )
        .into_response()
}

/// Handle the provider redirect: verify state, exchange the code, store tokens
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    state.observer.on_event(&LifecycleEvent::RequestReceived {
        route: "/auth-callback",
    });

    let cookie_state = extract_state_cookie(&headers);

    match state
        .exchanger
        .exchange(&query, cookie_state.as_deref())
        .await
    {
        Ok(record) => {
            let page = AuthSuccessPage {
                expires_at: record.expires_at.to_rfc3339(),
                scope: record.scope.clone(),
            };
            (
                [(
                    header::SET_COOKIE,
                    clear_state_cookie(state.config.uses_https()),
                )],
                render_page(StatusCode::OK, &page),
            )
                .into_response()
        }
        Err(e) => error_page(&e),
    }
}
