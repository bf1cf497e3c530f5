use crate::error::RelayError;
use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

#[derive(Template)]
#[template(path = "auth_success.html")]
pub struct AuthSuccessPage {
    pub expires_at: String,
    pub scope: Option<String>,
}

#[derive(Template)]
#[template(path = "auth_error.html")]
pub struct AuthErrorPage {
    pub status: u16,
    pub category: &'static str,
    pub message: String,
}

impl AuthErrorPage {
    pub fn from_error(err: &RelayError) -> Self {
        Self {
            status: err.status_code().as_u16(),
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Render a template into an HTML response with the given status
pub fn render_page<T: Template>(status: StatusCode, page: &T) -> Response {
    match page.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

/// HTML error page carrying the error's status code
pub fn error_page(err: &RelayError) -> Response {
    render_page(err.status_code(), &AuthErrorPage::from_error(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_page_escapes_message() {
        let page = AuthErrorPage::from_error(&RelayError::callback_rejection(
            "<script>alert(1)</script>",
        ));

        let html = page.render().unwrap();
        assert!(html.contains("provider_rejection"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_success_page_shows_expiry_and_scope() {
        let page = AuthSuccessPage {
            expires_at: "2024-05-01T13:00:00+00:00".to_string(),
            scope: Some("read write".to_string()),
        };

        let html = page.render().unwrap();
        assert!(html.contains("2024-05-01T13:00:00+00:00"));
        assert!(html.contains("read write"));
    }
}
