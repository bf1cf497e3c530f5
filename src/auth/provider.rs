use crate::config::ProviderCredentials;
use crate::error::RelayError;
use crate::models::ProviderTokenResponse;
use tracing::{debug, error};

/// Header carrying the provider API key on token endpoint calls
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Grant sent to the token endpoint
#[derive(Clone, Copy)]
pub enum TokenGrant<'a> {
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
    },
}

impl TokenGrant<'_> {
    fn label(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode { .. } => "Token exchange",
            TokenGrant::RefreshToken { .. } => "Token refresh",
        }
    }
}

/// Client for the provider's token endpoint
#[derive(Clone, Default)]
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client, e.g. one with a request timeout
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// POST one grant to the token endpoint. Never retried.
    pub async fn request_token(
        &self,
        credentials: &ProviderCredentials,
        grant: TokenGrant<'_>,
    ) -> Result<ProviderTokenResponse, RelayError> {
        let mut form: Vec<(&str, &str)> = match grant {
            TokenGrant::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
            TokenGrant::RefreshToken { refresh_token } => vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        };
        form.push(("client_id", credentials.client_id.as_str()));
        form.push(("client_secret", credentials.client_secret.as_str()));

        debug!("{} request to {}", grant.label(), credentials.token_url);

        let response = self
            .http
            .post(&credentials.token_url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("{} request failed: {}", grant.label(), e);
                RelayError::token_endpoint_rejection(
                    format!("{} request failed: {}", grant.label(), e),
                    None,
                    None,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                "{} rejected by provider with status {}",
                grant.label(),
                status.as_u16()
            );
            return Err(RelayError::token_endpoint_rejection(
                format!(
                    "{} failed with status {}: {}",
                    grant.label(),
                    status.as_u16(),
                    body
                ),
                Some(status.as_u16()),
                Some(body),
            ));
        }

        response.json::<ProviderTokenResponse>().await.map_err(|e| {
            error!("Failed to parse token response: {}", e);
            RelayError::token_endpoint_rejection(
                format!("{} returned an unreadable body: {}", grant.label(), e),
                Some(status.as_u16()),
                None,
            )
        })
    }
}
