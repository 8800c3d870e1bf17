mod config;
mod context;
mod db;
mod errors;
mod llm_client;
mod models;
mod repository;
mod routes;
mod state;
mod triage;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AiSettings, Config};
use crate::db::create_pool;
use crate::llm_client::{provider::build_client, CompletionClient};
use crate::repository::postgres::PgStore;
use crate::routes::build_router;
use crate::state::AppState;
use crate::triage::service::InboxTriage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting inbox API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db));

    // Initialize completion client (optional)
    let client = completion_client(&config.ai);

    let triage = InboxTriage::new(store.clone(), store.clone(), store, client);
    let state = AppState {
        triage: Arc::new(triage),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The service still starts without a client; reprocess then reports the
/// missing dependency.
fn completion_client(settings: &AiSettings) -> Option<Arc<dyn CompletionClient>> {
    if !settings.any_set {
        warn!("No AI_* variables set; reprocess is disabled");
        return None;
    }
    match build_client(settings) {
        Ok(client) => {
            info!(
                "LLM client initialized (provider: {}, model: {})",
                client.provider(),
                client.model()
            );
            Some(Arc::new(client))
        }
        Err(e) => {
            error!("LLM client not initialized: {e}");
            None
        }
    }
}
