//! OpenRaceEvents Server
//!
//! Runs the event engine against the detected frame source and serves the
//! event stream and statistics over HTTP

use anyhow::{Context, Result};
use ore_core::persist;
use ore_core::ranked::{RankedInfoProvider, RankingTable};
use ore_core::sampler::LapPositionSampler;
use ore_core::stats::RollingStats;
use ore_core::EventEngine;
use ore_server::config::ServerConfig;
use ore_server::store::JsonDirStore;
use ore_server::{api, manager, state};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting OpenRaceEvents Server");

    let config = ServerConfig::from_env()?;

    // Restore combination tables from earlier sessions
    let store = Arc::new(JsonDirStore::new(&config.data_dir));
    let mut stats = RollingStats::new(config.engine.sample_capacity);
    let mut sampler = LapPositionSampler::new(config.engine.profile_resolution);
    match persist::load_tables(store.as_ref(), &mut stats, &mut sampler) {
        Ok(()) => info!(
            "Loaded {} combinations and {} lap profiles from {}",
            stats.len(),
            sampler.len(),
            store.dir().display()
        ),
        Err(e) => warn!("Could not load combination tables: {}", e),
    }
    let engine = EventEngine::with_stores(config.engine.clone(), stats, sampler);

    let rankings = match &config.rankings {
        Some(path) => Some(load_rankings(path)?),
        None => None,
    };

    // Create application state
    let state = state::AppState::with_parts(engine, store, rankings);
    manager::register_adapters(&state, &config).await;

    // Build the router
    let app = api::create_router(state.clone());

    // Start adapter manager in background
    let cancel = CancellationToken::new();
    let manager = tokio::spawn(manager::run(
        state.clone(),
        config.flush_interval,
        cancel.clone(),
    ));

    // Start server
    info!("Server listening on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The manager flushes the tables one last time on its way out
    cancel.cancel();
    manager.await.context("adapter manager panicked")?;

    Ok(())
}

fn load_rankings(path: &std::path::Path) -> Result<Arc<dyn RankedInfoProvider>> {
    let json = std::fs::read(path)
        .with_context(|| format!("reading rankings {}", path.display()))?;
    let table = RankingTable::from_json(&json)
        .with_context(|| format!("parsing rankings {}", path.display()))?;
    info!("Loaded {} ranked profiles", table.len());
    Ok(Arc::new(table))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
