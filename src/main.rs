use oauth_token_relay::config::load_config_with_fallback;
use oauth_token_relay::storage::{create_token_store, StoreBackend};
use oauth_token_relay::{router, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oauth_token_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match load_config_with_fallback() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let backend = match config.token_store.parse::<StoreBackend>() {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("Invalid TOKEN_STORE: {}", e);
            std::process::exit(1);
        }
    };

    let store = match create_token_store(&backend).await {
        Ok(store) => {
            tracing::info!("Token store ready: {}", backend);
            store
        }
        Err(e) => {
            tracing::error!("Failed to open token store: {}", e);
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid BIND_ADDR '{}': {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Callback URL: {}", config.callback_url());
    let app = router(AppState::new(config, store));

    tracing::info!("Starting OAuth token relay on {}", addr);
    tracing::info!("Routes: /auth-start, /auth-callback, /get-token, /health");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
