//! Role-based access control (RBAC) extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use swatch_core::error::CoreError;
use swatch_core::roles::can_import;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires `admin` or `catalog_manager`. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn submit(RequireImporter(user): RequireImporter) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireImporter(pub AuthUser);

impl FromRequestParts<AppState> for RequireImporter {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !can_import(&user.role) {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin or Catalog Manager role required".into(),
            )));
        }
        Ok(RequireImporter(user))
    }
}
