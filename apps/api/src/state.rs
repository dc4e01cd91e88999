use sqlx::SqlitePool;

use crate::config::Config;
use crate::pipeline::RunManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Shared store: user settings and run records.
    pub db: SqlitePool,
    pub config: Config,
    pub runs: RunManager,
}
