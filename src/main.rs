use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use watchlist_sync::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    db::{create_redis_client, MemoryStore, RedisStore, RemoteStore},
    services::{IdentityGate, TmdbProvider, WatchlistSession},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("watchlist_sync=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn RemoteStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, watchlists are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redis => {
            let client = create_redis_client(&config.redis_url)?;
            Arc::new(RedisStore::new(client).await?)
        }
    };

    let catalog = Arc::new(TmdbProvider::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    ));

    // Nobody is signed in until a client posts to /api/v1/session
    let identity = IdentityGate::signed_out();
    let (session, session_handle) = WatchlistSession::start(store, &identity);

    let app = create_router(AppState::new(session, identity, catalog));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session_handle.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
