use std::sync::Arc;

use swatch_core::ports::ObjectStorage;

use crate::config::ServerConfig;
use crate::engine::ImportEngine;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: swatch_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Runs admitted import jobs as background tasks.
    pub engine: Arc<ImportEngine>,
    /// Where uploaded sources and artifacts are kept.
    pub storage: Arc<dyn ObjectStorage>,
}
