use crate::error::RelayError;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

/// Extract the credential from an `Authorization: Bearer <value>` header
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = auth_header.split_once(' ')?;

    // Scheme is case-insensitive; the credential is taken verbatim.
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Check the presented credential against the configured shared secret.
///
/// An unconfigured secret refuses every caller rather than opening the endpoint.
pub fn verify_caller(presented: Option<&str>, configured: Option<&str>) -> Result<(), RelayError> {
    let configured = configured.ok_or_else(|| {
        RelayError::Configuration("TOKEN_SECRET is not configured".to_string())
    })?;

    let presented = presented.ok_or_else(|| {
        RelayError::Authentication("Missing bearer credential".to_string())
    })?;

    if bool::from(presented.as_bytes().ct_eq(configured.as_bytes())) {
        Ok(())
    } else {
        Err(RelayError::Authentication(
            "Invalid bearer credential".to_string(),
        ))
    }
}
