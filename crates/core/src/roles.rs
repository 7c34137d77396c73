//! Role names carried in access tokens.

/// Full administrative access.
pub const ROLE_ADMIN: &str = "admin";

/// Catalog staff allowed to run imports and manage mapping profiles.
pub const ROLE_CATALOG_MANAGER: &str = "catalog_manager";

/// Roles permitted to use the import pipeline.
pub const IMPORT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_CATALOG_MANAGER];

/// Returns `true` if `role` may submit imports and manage mapping profiles.
pub fn can_import(role: &str) -> bool {
    IMPORT_ROLES.contains(&role)
}
