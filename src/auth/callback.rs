use crate::auth::provider::{ProviderClient, TokenGrant};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::lifecycle::{
    Clock, LifecycleEvent, LifecycleObserver, StoreSource, SystemClock, TracingObserver,
};
use crate::models::TokenRecord;
use crate::storage::TokenStore;
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Query parameters the provider appends to the callback URL
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Check the callback preconditions and return the authorization code.
///
/// Order matters: a provider-reported error wins over a missing code, which
/// wins over a state mismatch.
pub fn validate_callback<'q>(
    query: &'q CallbackQuery,
    cookie_state: Option<&str>,
) -> Result<&'q str, RelayError> {
    if let Some(error) = query.error.as_deref() {
        let message = match query.error_description.as_deref() {
            Some(description) => format!("Authorization failed: {} ({})", error, description),
            None => format!("Authorization failed: {}", error),
        };
        return Err(RelayError::callback_rejection(message));
    }

    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            RelayError::callback_rejection("Callback did not include an authorization code")
        })?;

    match (query.state.as_deref(), cookie_state) {
        (Some(state), Some(expected)) if !state.is_empty() && states_match(state, expected) => {
            Ok(code)
        }
        (_, None) => Err(RelayError::Csrf(
            "State cookie missing or expired; restart at /auth-start".to_string(),
        )),
        _ => Err(RelayError::Csrf(
            "State parameter does not match the state cookie".to_string(),
        )),
    }
}

fn states_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// One-shot trade of an authorization code for the initial token record
pub struct CallbackExchanger {
    config: Arc<RelayConfig>,
    store: Arc<dyn TokenStore>,
    provider: ProviderClient,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn LifecycleObserver>,
}

impl CallbackExchanger {
    pub fn new(config: Arc<RelayConfig>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            store,
            provider: ProviderClient::new(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_provider(mut self, provider: ProviderClient) -> Self {
        self.provider = provider;
        self
    }

    /// Validate the callback, exchange the code and replace the stored record
    pub async fn exchange(
        &self,
        query: &CallbackQuery,
        cookie_state: Option<&str>,
    ) -> Result<TokenRecord, RelayError> {
        let result = self.exchange_inner(query, cookie_state).await;

        if let Err(e) = &result {
            warn!("Authorization callback failed: {}", e);
            self.observer.on_event(&LifecycleEvent::Failed {
                category: e.category(),
                message: e.to_string(),
            });
        }

        result
    }

    async fn exchange_inner(
        &self,
        query: &CallbackQuery,
        cookie_state: Option<&str>,
    ) -> Result<TokenRecord, RelayError> {
        let code = validate_callback(query, cookie_state)?;
        let credentials = self.config.provider_credentials()?;
        let redirect_uri = self.config.callback_url();

        let response = self
            .provider
            .request_token(
                &credentials,
                TokenGrant::AuthorizationCode {
                    code,
                    redirect_uri: &redirect_uri,
                },
            )
            .await?;

        let record = TokenRecord::issue(response, self.clock.now())?;
        self.store.save(&record).await?;

        self.observer.on_event(&LifecycleEvent::Stored {
            source: StoreSource::Exchange,
        });
        info!(
            "Authorization complete; token valid until {}",
            record.expires_at
        );

        Ok(record)
    }
}
