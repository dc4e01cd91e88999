mod config;
mod contacts;
mod db;
mod errors;
mod ledger;
mod listings;
mod llm_client;
mod mail;
mod models;
mod outreach;
mod pipeline;
mod postings;
mod resume;
mod retry;
mod routes;
mod scoring;
mod settings;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::pipeline::{RunManager, ServiceRunFactory};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Outreach API v{}", env!("CARGO_PKG_VERSION"));

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("could not create data dir {}", config.data_dir.display()))?;

    // Shared store: settings and run records
    let db = create_pool(&config.database_url).await?;

    let runs = RunManager::new(
        db.clone(),
        Arc::new(ServiceRunFactory::new(config.clone())),
        config.stale_run_after,
    );
    info!(
        "Run manager ready (batch {}, stale after {}s)",
        config.run_batch_size,
        config.stale_run_after.as_secs()
    );

    let state = AppState {
        db,
        config: config.clone(),
        runs,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once a frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
