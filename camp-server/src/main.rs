use std::sync::Arc;

use camp_server::{
    api,
    config::{AppConfig, StoreBackend},
    db::Mongo,
    response::ServerResult,
    store::{AuthStore, memory::MemoryStore},
    util::{app_state::AppState, logging::init_tracing},
    webhooks::WebhookRelay,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ServerResult<()> {
    println!("Booting camp-server...");
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}", e);
        std::process::exit(1);
    });
    init_tracing(&config.log_level);
    info!("Starting camp-server");

    let store: Arc<dyn AuthStore> = match config.store_backend {
        StoreBackend::Mongo => {
            info!("Connecting to database");
            let db = Mongo::connect(&config.mongo_uri, &config.mongo_db).await?;
            db.ensure_indexes().await?;
            Arc::new(db)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let webhooks = WebhookRelay::from_config(&config.webhooks)?;
    let state = AppState::new(store, Arc::new(config), webhooks);

    info!("server started");
    if let Err(e) = api::serve::serve(state).await {
        tracing::error!("Server exited: {:?}", e);
    }
    Ok(())
}
