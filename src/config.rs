use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_SCOPE: &str = "read write";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_TOKEN_STORE: &str = "file:oauth-tokens.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// How the CSRF `state` value is chosen for each authorization redirect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStrategy {
    /// 256 random bits per redirect
    #[default]
    Random,
    /// Reuse the configured scope as the state value. Some providers require
    /// this, but it makes the state predictable and removes CSRF protection.
    Fixed,
}

impl std::str::FromStr for StateStrategy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(StateStrategy::Random),
            "fixed" => Ok(StateStrategy::Fixed),
            other => Err(RelayError::Configuration(format!(
                "Unknown STATE_STRATEGY '{}', expected 'random' or 'fixed'",
                other
            ))),
        }
    }
}

/// Relay configuration.
///
/// Secrets are optional at load time so that each endpoint can fail closed on
/// exactly the values it needs.
#[derive(Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Shared secret protecting `/get-token`
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub state_strategy: StateStrategy,
    #[serde(default = "default_token_store")]
    pub token_store: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_store() -> String {
    DEFAULT_TOKEN_STORE.to_string()
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_key: None,
            scope: default_scope(),
            token_secret: None,
            base_url: default_base_url(),
            authorize_url: None,
            token_url: None,
            state_strategy: StateStrategy::default(),
            token_store: default_token_store(),
            bind_addr: default_bind_addr(),
        }
    }
}

// Secrets must never reach the logs through `{:?}`.
impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &presence(&self.client_secret))
            .field("api_key", &presence(&self.api_key))
            .field("scope", &self.scope)
            .field("token_secret", &presence(&self.token_secret))
            .field("base_url", &self.base_url)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("state_strategy", &self.state_strategy)
            .field("token_store", &self.token_store)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

fn presence(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "<set>"
    } else {
        "<missing>"
    }
}

/// Everything needed to call the provider's token endpoint
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
    pub token_url: String,
}

impl RelayConfig {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let state_strategy = match get("STATE_STRATEGY") {
            Some(value) => value.parse()?,
            None => StateStrategy::default(),
        };

        let config = Self {
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET"),
            api_key: get("API_KEY"),
            scope: get("SCOPE").unwrap_or_else(default_scope),
            token_secret: get("TOKEN_SECRET"),
            base_url: get("BASE_URL").unwrap_or_else(default_base_url),
            authorize_url: get("AUTHORIZE_URL"),
            token_url: get("TOKEN_URL"),
            state_strategy,
            token_store: get("TOKEN_STORE").unwrap_or_else(default_token_store),
            bind_addr: get("BIND_ADDR").unwrap_or_else(default_bind_addr),
        };

        config.validate()?;
        Ok(config)
    }

    /// Trim optional secrets and URLs, turning blank values into `None`
    fn normalized(mut self) -> Self {
        for value in [
            &mut self.client_id,
            &mut self.client_secret,
            &mut self.api_key,
            &mut self.token_secret,
            &mut self.authorize_url,
            &mut self.token_url,
        ] {
            *value = value
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        self
    }

    /// Check values that can be verified without contacting anything
    pub fn validate(&self) -> Result<(), RelayError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RelayError::Configuration(format!(
                "BASE_URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }

        if self.scope.trim().is_empty() {
            return Err(RelayError::Configuration("SCOPE must not be empty".to_string()));
        }

        Ok(())
    }

    /// Callback address registered with the provider
    pub fn callback_url(&self) -> String {
        format!("{}/auth-callback", self.base_url.trim_end_matches('/'))
    }

    /// Whether cookies should carry the `Secure` attribute
    pub fn uses_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    pub fn require_client_id(&self) -> Result<&str, RelayError> {
        required(&self.client_id, "CLIENT_ID")
    }

    pub fn require_authorize_url(&self) -> Result<&str, RelayError> {
        required(&self.authorize_url, "AUTHORIZE_URL")
    }

    /// Credentials for the token endpoint; every field is mandatory
    pub fn provider_credentials(&self) -> Result<ProviderCredentials, RelayError> {
        Ok(ProviderCredentials {
            client_id: required(&self.client_id, "CLIENT_ID")?.to_string(),
            client_secret: required(&self.client_secret, "CLIENT_SECRET")?.to_string(),
            api_key: required(&self.api_key, "API_KEY")?.to_string(),
            token_url: required(&self.token_url, "TOKEN_URL")?.to_string(),
        })
    }

    fn log_summary(&self) {
        info!(
            "Relay configured: base_url={} scope='{}' state_strategy={:?} store={}",
            self.base_url, self.scope, self.state_strategy, self.token_store
        );
        for (name, value) in [
            ("CLIENT_ID", &self.client_id),
            ("CLIENT_SECRET", &self.client_secret),
            ("API_KEY", &self.api_key),
            ("TOKEN_SECRET", &self.token_secret),
            ("AUTHORIZE_URL", &self.authorize_url),
            ("TOKEN_URL", &self.token_url),
        ] {
            if value.is_none() {
                warn!("{} is not configured; endpoints that need it will refuse requests", name);
            }
        }
        if self.state_strategy == StateStrategy::Fixed {
            warn!(
                "STATE_STRATEGY=fixed reuses the scope as OAuth state; CSRF protection is disabled"
            );
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, RelayError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RelayError::Configuration(format!("{} is not configured", name)))
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RelayConfig, RelayError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path).map_err(|e| {
        RelayError::Configuration(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: RelayConfig = serde_yaml::from_str(&contents)
        .map_err(|e| RelayError::Configuration(format!("Failed to parse YAML config: {}", e)))?;
    let config = config.normalized();

    config.validate()?;
    Ok(config)
}

/// Load configuration from `CONFIG_PATH` when set, otherwise from the environment
pub fn load_config_with_fallback() -> Result<RelayConfig, RelayError> {
    let config = match std::env::var("CONFIG_PATH") {
        Ok(config_path) => load_config(&config_path)?,
        Err(_) => RelayConfig::from_env()?,
    };

    config.log_summary();
    Ok(config)
}
