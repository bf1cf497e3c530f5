use crate::config::{RelayConfig, StateStrategy};
use crate::error::RelayError;
use axum::http::{header, HeaderMap};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use tracing::debug;

/// Cookie carrying the CSRF state across the provider round trip
pub const STATE_COOKIE_NAME: &str = "oauth_state";

/// Lifetime of the CSRF cookie in seconds
pub const STATE_COOKIE_MAX_AGE_SECS: u64 = 600;

/// Random state length in bytes (256 bits)
const RANDOM_STATE_BYTES: u32 = 32;

/// Provider login URL plus the state it carries
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: String,
    pub state: String,
}

/// Create an OAuth2 client for building authorization URLs
fn create_oauth2_client(config: &RelayConfig) -> Result<BasicClient, RelayError> {
    let client_id = config.require_client_id()?;

    let auth_url = AuthUrl::new(config.require_authorize_url()?.to_string())
        .map_err(|e| RelayError::Configuration(format!("Invalid authorization URL: {}", e)))?;

    let redirect_url = RedirectUrl::new(config.callback_url())
        .map_err(|e| RelayError::Configuration(format!("Invalid callback URL: {}", e)))?;

    Ok(
        BasicClient::new(ClientId::new(client_id.to_string()), None, auth_url, None)
            .set_redirect_uri(redirect_url),
    )
}

/// Choose the state value for one redirect
pub fn generate_state(config: &RelayConfig) -> CsrfToken {
    match config.state_strategy {
        StateStrategy::Random => CsrfToken::new_random_len(RANDOM_STATE_BYTES),
        StateStrategy::Fixed => CsrfToken::new(config.scope.clone()),
    }
}

/// Build the provider authorization URL for the configured client
pub fn build_authorization_redirect(
    config: &RelayConfig,
) -> Result<AuthorizationRedirect, RelayError> {
    let client = create_oauth2_client(config)?;
    let state = generate_state(config);

    let (url, csrf_token) = client
        .authorize_url(|| state)
        .add_scope(Scope::new(config.scope.clone()))
        .url();

    debug!(
        "Generated authorization URL with {:?} state strategy",
        config.state_strategy
    );

    Ok(AuthorizationRedirect {
        url: url.to_string(),
        state: csrf_token.secret().clone(),
    })
}

/// `Set-Cookie` value storing the state for the callback
pub fn state_cookie(state: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        STATE_COOKIE_NAME,
        urlencoding::encode(state),
        STATE_COOKIE_MAX_AGE_SECS
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the state cookie
pub fn clear_state_cookie(secure: bool) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", STATE_COOKIE_NAME);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extract the state value from the request's cookies
pub fn extract_state_cookie(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", STATE_COOKIE_NAME);

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
        .filter(|value| !value.is_empty())
        .and_then(|value| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}
