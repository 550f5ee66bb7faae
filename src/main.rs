//! Equipment Inventory Server
//!
//! REST API over a live equipment collection.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use equipment_inventory::{
    api,
    config::{AppConfig, LoggingConfig, RemoteBackend},
    remote::{FirebaseStore, MemoryStore, RemoteStore},
    repository::Repository,
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Equipment Inventory v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn RemoteStore> = match config.remote.backend {
        RemoteBackend::Firebase => {
            let store = FirebaseStore::new(&config.remote).context("Failed to create remote client")?;
            tracing::info!(url = %config.remote.url, "Using realtime database backend");
            Arc::new(store)
        }
        RemoteBackend::Memory => {
            tracing::warn!("Using in-memory backend, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let repository = Repository::new(store, &config.collections, config.identity.instance_id);
    let services = Services::new(repository, &config);

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("equipment_inventory={},tower_http=debug", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
