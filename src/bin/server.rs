use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use classroom_sync::config::ServerConfig;
use classroom_sync::core::ServerManager;
use classroom_sync::handlers::routes;
use classroom_sync::storage::MemoryStore;

#[tokio::main]
async fn main() {
    // Initialize env
    let env_loaded = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match env_loaded {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    // Classes live in memory; the bundled store keeps the records alongside
    let server = Arc::new(ServerManager::new(config, Arc::new(MemoryStore::new())));

    info!("Starting classroom server on {}", addr);
    warp::serve(routes(server)).run(addr).await;
}
