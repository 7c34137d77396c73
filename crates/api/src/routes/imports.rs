//! Route definitions for the `/imports` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::imports;
use crate::state::AppState;

/// Routes mounted at `/imports`.
///
/// ```text
/// POST   /                       -> submit_import
/// GET    /                       -> list_imports
/// GET    /{job_id}               -> get_import
/// POST   /{job_id}/cancel        -> cancel_import
/// GET    /{job_id}/artifacts     -> list_artifacts
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(imports::list_imports).post(imports::submit_import))
        .route("/{job_id}", get(imports::get_import))
        .route("/{job_id}/cancel", post(imports::cancel_import))
        .route("/{job_id}/artifacts", get(imports::list_artifacts))
}
