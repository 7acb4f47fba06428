/**
 * Tripsync Server Entry Point
 *
 * Loads configuration, builds the sync context and runs the spawner until
 * Ctrl-C.
 */

use tripsync::backend::{create_context, Spawner};
use tripsync::shared::SyncConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match std::env::var("TRIPSYNC_CONFIG") {
        Ok(path) => {
            tracing::info!("[STARTUP] Loading config from {}", path);
            SyncConfig::load(path)?
        }
        Err(_) => SyncConfig::from_env()?,
    };

    let context = create_context(config).await?;
    let spawner = Spawner::new(context).start().await?;
    tracing::info!("[STARTUP] Server ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("[SHUTDOWN] Ctrl-C received");
    spawner.shutdown().await;

    Ok(())
}
