use crate::error::RelayError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the provider does not declare `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Token type assumed when the provider does not declare one
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

const REDACTED: &str = "[redacted]";

/// The single persisted token set.
///
/// Records are never edited in place: [`TokenRecord::issue`] builds the first
/// one and [`TokenRecord::rotate`] derives each successor.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Lifetime declared by the provider when this record was produced
    pub expires_in: i64,
    /// Always `created_at + expires_in`
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenRecord {
    /// Build the initial record from an authorization-code exchange
    pub fn issue(response: ProviderTokenResponse, now: DateTime<Utc>) -> Result<Self, RelayError> {
        let access_token = non_empty(response.access_token).ok_or_else(|| {
            RelayError::token_endpoint_rejection(
                "Token exchange response did not include an access_token",
                None,
                None,
            )
        })?;

        // Without a refresh token the relay could never renew on its own.
        let refresh_token = non_empty(response.refresh_token).ok_or_else(|| {
            RelayError::token_endpoint_rejection(
                "Token exchange response did not include a refresh_token",
                None,
                None,
            )
        })?;

        let (expires_in, expires_at) = expiry(response.expires_in, now, "exchange")?;

        Ok(Self {
            access_token,
            refresh_token,
            token_type: non_empty(response.token_type)
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_in,
            expires_at,
            created_at: now,
            scope: non_empty(response.scope),
        })
    }

    /// Derive the successor record from a refresh response.
    ///
    /// The previous refresh token, token type and scope carry forward when the
    /// provider omits them.
    pub fn rotate(
        &self,
        response: ProviderTokenResponse,
        now: DateTime<Utc>,
    ) -> Result<Self, RelayError> {
        let access_token = non_empty(response.access_token).ok_or_else(|| {
            RelayError::token_endpoint_rejection(
                "Token refresh response did not include an access_token",
                None,
                None,
            )
        })?;

        let (expires_in, expires_at) = expiry(response.expires_in, now, "refresh")?;

        Ok(Self {
            access_token,
            refresh_token: non_empty(response.refresh_token)
                .unwrap_or_else(|| self.refresh_token.clone()),
            token_type: non_empty(response.token_type).unwrap_or_else(|| self.token_type.clone()),
            expires_in,
            expires_at,
            created_at: now,
            scope: non_empty(response.scope).or_else(|| self.scope.clone()),
        })
    }

    /// Time left before `expires_at`; negative once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &REDACTED)
            .field("refresh_token", &REDACTED)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("scope", &self.scope)
            .finish()
    }
}

// Lifetimes must be non-negative and land inside chrono's representable range.
fn expiry(
    expires_in: Option<i64>,
    now: DateTime<Utc>,
    stage: &str,
) -> Result<(i64, DateTime<Utc>), RelayError> {
    let expires_in = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Duration::try_seconds(expires_in)
        .filter(|_| expires_in >= 0)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .map(|expires_at| (expires_in, expires_at))
        .ok_or_else(|| {
            RelayError::token_endpoint_rejection(
                format!("Token {} response has invalid expires_in {}", stage, expires_in),
                None,
                None,
            )
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// JSON body returned by the provider's token endpoint
#[derive(Default, Deserialize)]
pub struct ProviderTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for ProviderTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTokenResponse")
            .field("access_token", &self.access_token.as_ref().map(|_| REDACTED))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| REDACTED))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Body served by `/get-token`
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds the access token remains usable
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    /// Whether this request performed a refresh
    pub refreshed: bool,
}

impl TokenResponse {
    /// Serve a stored record as-is, reporting the real time left
    pub fn current(record: &TokenRecord, now: DateTime<Utc>) -> Self {
        Self {
            access_token: record.access_token.clone(),
            token_type: record.token_type.clone(),
            expires_in: record.remaining(now).num_seconds(),
            expires_at: record.expires_at,
            refreshed: false,
        }
    }

    /// Serve a record this request just produced
    pub fn refreshed(record: &TokenRecord) -> Self {
        Self {
            access_token: record.access_token.clone(),
            token_type: record.token_type.clone(),
            expires_in: record.expires_in,
            expires_at: record.expires_at,
            refreshed: true,
        }
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &REDACTED)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("refreshed", &self.refreshed)
            .finish()
    }
}
