pub mod clock;
pub mod manager;
pub mod observer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{needs_refresh, TokenLifecycleManager, STALENESS_MARGIN_SECS};
pub use observer::{
    LifecycleEvent, LifecycleObserver, RecordingObserver, StoreSource, TracingObserver,
};
