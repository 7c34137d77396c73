//! Route definitions for the `/mapping-profiles` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::mapping_profiles;
use crate::state::AppState;

/// Routes mounted at `/mapping-profiles`.
///
/// ```text
/// GET    /                  -> list_profiles
/// POST   /                  -> create_profile
/// POST   /import            -> import_profile
/// GET    /{id}              -> get_profile
/// PUT    /{id}              -> update_profile
/// DELETE /{id}              -> delete_profile
/// POST   /{id}/duplicate    -> duplicate_profile
/// GET    /{id}/export       -> export_profile
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(mapping_profiles::list_profiles).post(mapping_profiles::create_profile),
        )
        .route("/import", post(mapping_profiles::import_profile))
        .route(
            "/{id}",
            get(mapping_profiles::get_profile)
                .put(mapping_profiles::update_profile)
                .delete(mapping_profiles::delete_profile),
        )
        .route("/{id}/duplicate", post(mapping_profiles::duplicate_profile))
        .route("/{id}/export", get(mapping_profiles::export_profile))
}
