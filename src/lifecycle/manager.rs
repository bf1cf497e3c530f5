// Token lifecycle manager
// Decides whether the stored token can be served and refreshes it when it cannot

use super::clock::{Clock, SystemClock};
use super::observer::{LifecycleEvent, LifecycleObserver, StoreSource, TracingObserver};
use crate::auth::caller::verify_caller;
use crate::auth::provider::{ProviderClient, TokenGrant};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::models::{TokenRecord, TokenResponse};
use crate::storage::TokenStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Tokens with less than this much time left are refreshed before serving
pub const STALENESS_MARGIN_SECS: i64 = 5 * 60;

/// Whether `record` must be refreshed before it is served at `now`.
/// Already-expired tokens are always stale.
pub fn needs_refresh(record: &TokenRecord, now: DateTime<Utc>) -> bool {
    record.remaining(now) < Duration::seconds(STALENESS_MARGIN_SECS)
}

/// Serves a valid access token, refreshing the stored record when stale
pub struct TokenLifecycleManager {
    config: Arc<RelayConfig>,
    store: Arc<dyn TokenStore>,
    provider: ProviderClient,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn LifecycleObserver>,
    // Collapses concurrent refreshes in this process into one provider call
    refresh_lock: Mutex<()>,
}

impl TokenLifecycleManager {
    pub fn new(config: Arc<RelayConfig>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            store,
            provider: ProviderClient::new(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
            refresh_lock: Mutex::new(()),
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

    /// Authenticate the caller and return a token that is valid for at least
    /// the staleness margin.
    pub async fn get_valid_token(
        &self,
        presented: Option<&str>,
    ) -> Result<TokenResponse, RelayError> {
        let result = self.serve(presented).await;

        match &result {
            Ok(response) => self.observer.on_event(&LifecycleEvent::TokenServed {
                refreshed: response.refreshed,
                expires_in: response.expires_in,
            }),
            Err(e) => self.observer.on_event(&LifecycleEvent::Failed {
                category: e.category(),
                message: e.to_string(),
            }),
        }

        result
    }

    async fn serve(&self, presented: Option<&str>) -> Result<TokenResponse, RelayError> {
        if let Err(e) = verify_caller(presented, self.config.token_secret.as_deref()) {
            self.observer.on_event(&LifecycleEvent::AuthenticationFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }
        self.observer.on_event(&LifecycleEvent::Authenticated);

        let record = self
            .store
            .load()
            .await?
            .ok_or_else(RelayError::not_yet_authenticated)?;

        let now = self.clock.now();
        if !needs_refresh(&record, now) {
            debug!(
                "Stored token valid for another {}s",
                record.remaining(now).num_seconds()
            );
            return Ok(TokenResponse::current(&record, now));
        }

        self.refresh_and_store().await
    }

    async fn refresh_and_store(&self) -> Result<TokenResponse, RelayError> {
        let _guard = self.refresh_lock.lock().await;

        // Another request may have refreshed while this one waited for the lock.
        let current = self
            .store
            .load()
            .await?
            .ok_or_else(RelayError::not_yet_authenticated)?;
        let now = self.clock.now();
        if !needs_refresh(&current, now) {
            debug!("Token already refreshed by a concurrent request");
            return Ok(TokenResponse::current(&current, now));
        }

        self.observer.on_event(&LifecycleEvent::RefreshStarted {
            remaining_secs: current.remaining(now).num_seconds(),
        });

        let refreshed = self.refresh_access_token(&current).await?;

        if self.store.compare_and_set(Some(&current), &refreshed).await? {
            self.observer.on_event(&LifecycleEvent::Stored {
                source: StoreSource::Refresh,
            });
            return Ok(TokenResponse::refreshed(&refreshed));
        }

        // Another instance replaced the record during the provider call.
        warn!("Token record changed during refresh");
        if let Some(winner) = self.store.load().await? {
            let now = self.clock.now();
            if !needs_refresh(&winner, now) {
                return Ok(TokenResponse::current(&winner, now));
            }
        }

        self.store.save(&refreshed).await?;
        self.observer.on_event(&LifecycleEvent::Stored {
            source: StoreSource::Refresh,
        });
        Ok(TokenResponse::refreshed(&refreshed))
    }

    /// Exchange the record's refresh token for a successor record.
    /// Nothing is persisted here.
    pub async fn refresh_access_token(
        &self,
        record: &TokenRecord,
    ) -> Result<TokenRecord, RelayError> {
        let credentials = self.config.provider_credentials()?;

        let response = self
            .provider
            .request_token(
                &credentials,
                TokenGrant::RefreshToken {
                    refresh_token: &record.refresh_token,
                },
            )
            .await?;

        let refreshed = record.rotate(response, self.clock.now())?;

        self.observer.on_event(&LifecycleEvent::Refreshed {
            expires_in: refreshed.expires_in,
            refresh_token_rotated: refreshed.refresh_token != record.refresh_token,
        });

        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::clock::ManualClock;
    use crate::lifecycle::observer::RecordingObserver;
    use crate::models::ProviderTokenResponse;
    use crate::storage::memory::MemoryTokenStore;
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "shared-secret";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn test_config(token_url: &str) -> Arc<RelayConfig> {
        Arc::new(RelayConfig {
            client_id: Some("client-1".to_string()),
            client_secret: Some("secret-1".to_string()),
            api_key: Some("api-key-1".to_string()),
            token_secret: Some(SECRET.to_string()),
            token_url: Some(token_url.to_string()),
            ..RelayConfig::default()
        })
    }

    fn record_issued_at(at: DateTime<Utc>, expires_in: i64) -> TokenRecord {
        TokenRecord::issue(
            ProviderTokenResponse {
                access_token: Some("A1".to_string()),
                refresh_token: Some("R1".to_string()),
                expires_in: Some(expires_in),
                ..Default::default()
            },
            at,
        )
        .unwrap()
    }

    struct Harness {
        server: MockServer,
        store: Arc<MemoryTokenStore>,
        clock: Arc<ManualClock>,
        observer: Arc<RecordingObserver>,
        manager: TokenLifecycleManager,
    }

    async fn harness(record: Option<TokenRecord>) -> Harness {
        let server = MockServer::start().await;
        let store = Arc::new(match record {
            Some(record) => MemoryTokenStore::with_record(record),
            None => MemoryTokenStore::new(),
        });
        let clock = Arc::new(ManualClock::new(t0()));
        let observer = Arc::new(RecordingObserver::new());
        let manager = TokenLifecycleManager::new(
            test_config(&format!("{}/oauth/token", server.uri())),
            store.clone(),
        )
        .with_clock(clock.clone())
        .with_observer(observer.clone());

        Harness {
            server,
            store,
            clock,
            observer,
            manager,
        }
    }

    async fn mount_refresh(server: &MockServer, body: serde_json::Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_needs_refresh_boundary() {
        let record = record_issued_at(t0(), 3600);

        assert!(!needs_refresh(&record, t0()));
        // Exactly five minutes left is still fresh
        assert!(!needs_refresh(&record, t0() + Duration::seconds(3300)));
        assert!(needs_refresh(&record, t0() + Duration::seconds(3301)));
        assert!(needs_refresh(&record, t0() + Duration::seconds(7200)));
    }

    #[tokio::test]
    async fn test_fresh_token_served_without_refresh() {
        let h = harness(Some(record_issued_at(t0(), 3600))).await;
        mount_refresh(&h.server, serde_json::json!({"access_token": "A2"}), 0).await;
        h.clock.advance(Duration::seconds(600));

        let response = h.manager.get_valid_token(Some(SECRET)).await.unwrap();

        assert_eq!(response.access_token, "A1");
        assert!(!response.refreshed);
        assert_eq!(response.expires_in, 3000);
        assert_eq!(response.expires_at, t0() + Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_stale_token_refreshed_and_stored() {
        let h = harness(Some(record_issued_at(t0(), 3600))).await;
        mount_refresh(
            &h.server,
            serde_json::json!({"access_token": "A2", "refresh_token": "R2", "expires_in": 3600}),
            1,
        )
        .await;
        h.clock.advance(Duration::seconds(3550));

        let response = h.manager.get_valid_token(Some(SECRET)).await.unwrap();

        assert_eq!(response.access_token, "A2");
        assert!(response.refreshed);
        assert_eq!(response.expires_in, 3600);

        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "A2");
        assert_eq!(stored.refresh_token, "R2");
        assert_eq!(stored.created_at, t0() + Duration::seconds(3550));

        assert_eq!(
            h.observer.names(),
            vec![
                "authenticated",
                "refresh_started",
                "refreshed",
                "stored",
                "token_served"
            ]
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let h = harness(Some(record_issued_at(t0(), 3600))).await;
        mount_refresh(&h.server, serde_json::json!({"access_token": "A2"}), 1).await;
        h.clock.advance(Duration::hours(5));

        let response = h.manager.get_valid_token(Some(SECRET)).await.unwrap();
        assert!(response.refreshed);
        assert_eq!(response.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_keeps_previous() {
        let h = harness(Some(record_issued_at(t0(), 3600))).await;
        mount_refresh(
            &h.server,
            serde_json::json!({"access_token": "A2", "expires_in": 7200}),
            1,
        )
        .await;
        h.clock.advance(Duration::seconds(3550));
        let refresh_time = h.clock.now();

        h.manager.get_valid_token(Some(SECRET)).await.unwrap();

        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.refresh_token, "R1");
        assert_eq!(stored.expires_in, 7200);
        assert_eq!(stored.expires_at, refresh_time + Duration::seconds(7200));
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_store_untouched() {
        let original = record_issued_at(t0(), 3600);
        let h = harness(Some(original.clone())).await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .expect(1)
            .mount(&h.server)
            .await;
        h.clock.advance(Duration::seconds(3550));

        let err = h.manager.get_valid_token(Some(SECRET)).await.unwrap_err();

        assert_eq!(err.category(), "provider_rejection");
        assert!(err.to_string().contains("401"));
        assert_eq!(h.store.load().await.unwrap().unwrap(), original);
        assert_eq!(h.observer.names().last(), Some(&"failed"));
    }

    #[tokio::test]
    async fn test_refresh_timeout_leaves_store_untouched() {
        let original = record_issued_at(t0(), 3600);
        let h = harness(Some(original.clone())).await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "A2"}))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&h.server)
            .await;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let manager = h.manager.with_provider(ProviderClient::with_http_client(http));
        h.clock.advance(Duration::seconds(3550));

        let err = manager.get_valid_token(Some(SECRET)).await.unwrap_err();

        assert_eq!(err.category(), "provider_rejection");
        assert_eq!(h.store.load().await.unwrap().unwrap(), original);
    }

    #[tokio::test]
    async fn test_missing_provider_credentials_is_configuration_error() {
        let store = Arc::new(MemoryTokenStore::with_record(record_issued_at(t0(), 60)));
        let config = Arc::new(RelayConfig {
            token_secret: Some(SECRET.to_string()),
            ..RelayConfig::default()
        });
        let manager = TokenLifecycleManager::new(config, store)
            .with_clock(Arc::new(ManualClock::new(t0())));

        let err = manager.get_valid_token(Some(SECRET)).await.unwrap_err();
        assert_eq!(err.category(), "configuration_error");
    }

    #[tokio::test]
    async fn test_no_record_is_not_yet_authenticated() {
        let h = harness(None).await;
        mount_refresh(&h.server, serde_json::json!({"access_token": "A2"}), 0).await;

        let err = h.manager.get_valid_token(Some(SECRET)).await.unwrap_err();

        assert!(matches!(err, RelayError::NotYetAuthenticated(_)));
    }

    /// Store wrapper counting reads
    struct CountingStore {
        inner: MemoryTokenStore,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl TokenStore for CountingStore {
        async fn load(&self) -> Result<Option<TokenRecord>, StorageError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load().await
        }

        async fn save(&self, record: &TokenRecord) -> Result<(), StorageError> {
            self.inner.save(record).await
        }

        async fn compare_and_set(
            &self,
            expected: Option<&TokenRecord>,
            record: &TokenRecord,
        ) -> Result<bool, StorageError> {
            self.inner.compare_and_set(expected, record).await
        }
    }

    #[tokio::test]
    async fn test_bad_credential_never_reads_store() {
        let store = Arc::new(CountingStore {
            inner: MemoryTokenStore::with_record(record_issued_at(t0(), 3600)),
            loads: AtomicUsize::new(0),
        });
        let manager =
            TokenLifecycleManager::new(test_config("http://127.0.0.1:9/token"), store.clone())
                .with_clock(Arc::new(ManualClock::new(t0())));

        for presented in [None, Some("wrong"), Some("")] {
            let err = manager.get_valid_token(presented).await.unwrap_err();
            assert!(matches!(err, RelayError::Authentication(_)));
        }

        assert_eq!(store.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_stale_requests_share_one_refresh() {
        let h = harness(Some(record_issued_at(t0(), 3600))).await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "A2", "expires_in": 3600}))
                    .set_delay(std::time::Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&h.server)
            .await;
        h.clock.advance(Duration::seconds(3550));

        let manager = Arc::new(h.manager);
        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.get_valid_token(Some(SECRET)).await }
        });
        let second = tokio::spawn({
            let manager = manager.clone();
            async move { manager.get_valid_token(Some(SECRET)).await }
        });

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first.access_token, "A2");
        assert_eq!(second.access_token, "A2");
        assert_eq!(
            [first.refreshed, second.refreshed]
                .iter()
                .filter(|r| **r)
                .count(),
            1
        );
    }

    /// Store that reports a lost compare-and-set, as if another instance wrote first
    struct RacingStore {
        inner: MemoryTokenStore,
        winner: TokenRecord,
    }

    #[async_trait]
    impl TokenStore for RacingStore {
        async fn load(&self) -> Result<Option<TokenRecord>, StorageError> {
            self.inner.load().await
        }

        async fn save(&self, record: &TokenRecord) -> Result<(), StorageError> {
            self.inner.save(record).await
        }

        async fn compare_and_set(
            &self,
            _expected: Option<&TokenRecord>,
            _record: &TokenRecord,
        ) -> Result<bool, StorageError> {
            self.inner.save(&self.winner).await?;
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_lost_race_serves_winning_record() {
        let server = MockServer::start().await;
        mount_refresh(&server, serde_json::json!({"access_token": "A-mine"}), 1).await;

        let mut winner = record_issued_at(t0() + Duration::seconds(3540), 3600);
        winner.access_token = "A-winner".to_string();
        let store = Arc::new(RacingStore {
            inner: MemoryTokenStore::with_record(record_issued_at(t0(), 3600)),
            winner,
        });
        let manager = TokenLifecycleManager::new(
            test_config(&format!("{}/oauth/token", server.uri())),
            store.clone(),
        )
        .with_clock(Arc::new(ManualClock::new(t0() + Duration::seconds(3550))));

        let response = manager.get_valid_token(Some(SECRET)).await.unwrap();

        assert_eq!(response.access_token, "A-winner");
        assert!(!response.refreshed);
        assert_eq!(
            store.load().await.unwrap().unwrap().access_token,
            "A-winner"
        );
    }
}
