//! swarm HTTP Server
//!
//! Axum-based server exposing the agent loop, the tool catalog and the
//! tool-routing middleware over REST and WebSocket.

mod config;
mod error;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swarm_core::{LlmProvider, SwarmContext};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    if let Err(err) = dotenvy::dotenv() {
        tracing::debug!(error = %err, "No .env file loaded");
    }

    let config = ServerConfig::from_env()?;

    // Tools are registered before the server accepts requests
    let context = SwarmContext::global();
    let fs_overrides = config.fs_root.as_ref().map(|root| {
        let mut map = Map::new();
        map.insert("root".into(), Value::String(root.display().to_string()));
        map
    });
    swarm_tools::register_default_tools(&context.registry(), &Map::new(), fs_overrides.as_ref())?;

    for id in context.registry().all_ids() {
        tracing::info!(tool = %id, "Tool available");
    }

    // Default provider check; requests may still pick other models
    match swarm_runtime::provider_for_model(&config.default_model) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => tracing::info!(
                provider = provider.name(),
                model = %config.default_model,
                "✓ Provider reachable"
            ),
            _ => tracing::warn!(
                provider = provider.name(),
                "⚠ Provider not reachable - chat requests will fail"
            ),
        },
        Err(err) => tracing::warn!(error = %err, "⚠ Default provider not configured"),
    }

    let providers: state::ProviderFactory =
        Arc::new(|model: &str| -> swarm_core::Result<Arc<dyn LlmProvider>> {
            swarm_runtime::provider_for_model(model)
        });

    let addr = config.bind_addr.clone();
    let state = AppState::new(context, config, providers);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 swarm server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/tools       - Registered tools");
    tracing::info!("  POST /api/middleware  - Route agent input to tools");
    tracing::info!("  POST /api/chat        - Send message");
    tracing::info!("  GET  /api/chat/stream - WebSocket streaming");

    axum::serve(listener, app).await?;

    Ok(())
}
