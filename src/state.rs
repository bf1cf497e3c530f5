use crate::auth::CallbackExchanger;
use crate::config::RelayConfig;
use crate::lifecycle::{
    Clock, LifecycleObserver, SystemClock, TokenLifecycleManager, TracingObserver,
};
use crate::storage::TokenStore;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub manager: Arc<TokenLifecycleManager>,
    pub exchanger: Arc<CallbackExchanger>,
    pub observer: Arc<dyn LifecycleObserver>,
    pub store: Arc<dyn TokenStore>,
}

impl AppState {
    pub fn new(config: RelayConfig, store: Arc<dyn TokenStore>) -> Self {
        Self::with_parts(config, store, Arc::new(SystemClock), Arc::new(TracingObserver))
    }

    /// Wire the state with an explicit clock and observer
    pub fn with_parts(
        config: RelayConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        let config = Arc::new(config);

        let manager = TokenLifecycleManager::new(config.clone(), store.clone())
            .with_clock(clock.clone())
            .with_observer(observer.clone());
        let exchanger = CallbackExchanger::new(config.clone(), store.clone())
            .with_clock(clock)
            .with_observer(observer.clone());

        Self {
            config,
            manager: Arc::new(manager),
            exchanger: Arc::new(exchanger),
            observer,
            store,
        }
    }
}
