use redisman::config::{Config, StoreBackend};
use redisman::server::start_http_server;
use redisman::RedismanEngine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ========================================
// MAIN ENTRY POINT
// ========================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Redisman v{} starting", env!("CARGO_PKG_VERSION"));

    let engine = RedismanEngine::new(&config);

    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("📦 Using the in-memory store, entries are not persisted");
        }
        StoreBackend::Resp => {
            engine.store.ping().await.inspect_err(|err| {
                tracing::error!(addr = %config.store.addr, error = %err, "store is unreachable");
            })?;
            tracing::info!(addr = %config.store.addr, db = config.store.database, "📦 Connected to store");
        }
    }

    start_http_server(engine, &config).await?;
    Ok(())
}
