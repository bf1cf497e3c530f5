// Lifecycle observer
// Records what happened to the token at each step without ever seeing token values

use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Events reported at defined points of the token lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    RequestReceived { route: &'static str },
    Authenticated,
    AuthenticationFailed { reason: String },
    TokenServed { refreshed: bool, expires_in: i64 },
    RefreshStarted { remaining_secs: i64 },
    Refreshed { expires_in: i64, refresh_token_rotated: bool },
    Stored { source: StoreSource },
    Failed { category: &'static str, message: String },
}

/// Which operation wrote the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSource {
    Exchange,
    Refresh,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::RequestReceived { .. } => "request_received",
            LifecycleEvent::Authenticated => "authenticated",
            LifecycleEvent::AuthenticationFailed { .. } => "authentication_failed",
            LifecycleEvent::TokenServed { .. } => "token_served",
            LifecycleEvent::RefreshStarted { .. } => "refresh_started",
            LifecycleEvent::Refreshed { .. } => "refreshed",
            LifecycleEvent::Stored { .. } => "stored",
            LifecycleEvent::Failed { .. } => "failed",
        }
    }
}

/// Hook called by the relay at each lifecycle point
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Default observer emitting structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        let name = event.name();
        match event {
            LifecycleEvent::RequestReceived { route } => {
                debug!(event = name, route = *route, "request received")
            }
            LifecycleEvent::Authenticated => debug!(event = name, "caller authenticated"),
            LifecycleEvent::AuthenticationFailed { reason } => {
                warn!(event = name, reason = %reason, "caller rejected")
            }
            LifecycleEvent::TokenServed {
                refreshed,
                expires_in,
            } => info!(
                event = name,
                refreshed = *refreshed,
                expires_in = *expires_in,
                "token served"
            ),
            LifecycleEvent::RefreshStarted { remaining_secs } => info!(
                event = name,
                remaining_secs = *remaining_secs,
                "token stale, refreshing"
            ),
            LifecycleEvent::Refreshed {
                expires_in,
                refresh_token_rotated,
            } => info!(
                event = name,
                expires_in = *expires_in,
                refresh_token_rotated = *refresh_token_rotated,
                "token refreshed"
            ),
            LifecycleEvent::Stored { source } => {
                info!(event = name, source = ?source, "token record stored")
            }
            LifecycleEvent::Failed { category, message } => {
                warn!(event = name, category = *category, message = %message, "request failed")
            }
        }
    }
}

/// Observer that keeps every event, for inspection in tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(LifecycleEvent::name).collect()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
