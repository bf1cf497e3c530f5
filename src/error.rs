//! Error types shared by the relay handlers and the token lifecycle.

use crate::storage::StorageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Where a provider rejection was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionStage {
    /// The provider redirected back with an OAuth error or without a code
    Callback,
    /// The token endpoint answered with a failure
    TokenEndpoint,
}

/// Top-level error type for relay operations.
///
/// Messages never contain access or refresh token values.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("CSRF error: {0}")]
    Csrf(String),

    #[error("provider rejection: {message}")]
    ProviderRejection {
        stage: RejectionStage,
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("not yet authenticated: {0}")]
    NotYetAuthenticated(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RelayError {
    /// Rejection reported on the callback query string
    pub fn callback_rejection(message: impl Into<String>) -> Self {
        RelayError::ProviderRejection {
            stage: RejectionStage::Callback,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Failure talking to, or answered by, the token endpoint
    pub fn token_endpoint_rejection(
        message: impl Into<String>,
        status: Option<u16>,
        body: Option<String>,
    ) -> Self {
        RelayError::ProviderRejection {
            stage: RejectionStage::TokenEndpoint,
            message: message.into(),
            status,
            body,
        }
    }

    pub fn not_yet_authenticated() -> Self {
        RelayError::NotYetAuthenticated(
            "No token stored yet. Visit /auth-start to authorize the relay.".to_string(),
        )
    }

    /// Machine-readable category
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Configuration(_) => "configuration_error",
            RelayError::Authentication(_) => "authentication_error",
            RelayError::Csrf(_) => "csrf_error",
            RelayError::ProviderRejection { .. } => "provider_rejection",
            RelayError::NotYetAuthenticated(_) => "not_yet_authenticated",
            RelayError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            RelayError::Csrf(_) => StatusCode::FORBIDDEN,
            RelayError::ProviderRejection {
                stage: RejectionStage::Callback,
                ..
            } => StatusCode::BAD_REQUEST,
            RelayError::ProviderRejection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::NotYetAuthenticated(_) => StatusCode::NOT_FOUND,
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.category(),
            "message": self.to_string(),
        });

        if let RelayError::ProviderRejection {
            status: Some(status),
            ..
        } = &self
        {
            body["provider_status"] = json!(status);
        }

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RelayError::Authentication("missing".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RelayError::Csrf("mismatch".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RelayError::not_yet_authenticated().status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RelayError::callback_rejection("access_denied").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::token_endpoint_rejection("boom", Some(502), None).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::from(StorageError::ConnectionError("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_includes_category_prefix() {
        let err = RelayError::Configuration("CLIENT_ID is not configured".into());
        assert_eq!(
            err.to_string(),
            "configuration error: CLIENT_ID is not configured"
        );
        assert_eq!(err.category(), "configuration_error");
    }

    #[test]
    fn test_not_yet_authenticated_points_at_auth_start() {
        let err = RelayError::not_yet_authenticated();
        assert!(err.to_string().contains("/auth-start"));
    }

    #[tokio::test]
    async fn test_json_response_shape() {
        let response =
            RelayError::token_endpoint_rejection("refresh failed", Some(400), Some("bad".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "provider_rejection");
        assert_eq!(body["provider_status"], 400);
        assert!(body["message"].as_str().unwrap().contains("refresh failed"));
    }
}
