pub mod health;
pub mod imports;
pub mod mapping_profiles;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /imports                                submit (multipart), list
/// /imports/{job_id}                       status
/// /imports/{job_id}/cancel                cancel (POST)
/// /imports/{job_id}/artifacts             generated artifacts
///
/// /mapping-profiles                       list, create
/// /mapping-profiles/import                import a serialized profile (POST)
/// /mapping-profiles/{id}                  get, update, delete
/// /mapping-profiles/{id}/duplicate        copy (POST)
/// /mapping-profiles/{id}/export           serialized profile
/// ```
///
/// Every route requires the `admin` or `catalog_manager` role.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/imports", imports::router())
        .nest("/mapping-profiles", mapping_profiles::router())
}
