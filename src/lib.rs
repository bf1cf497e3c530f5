// Library exports for the binary and integration tests
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod state;
pub mod storage;

pub use config::{RelayConfig, StateStrategy};
pub use error::RelayError;
pub use routes::router;
pub use state::AppState;
