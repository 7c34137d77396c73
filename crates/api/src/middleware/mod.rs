//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated user from a JWT Bearer token.
//! - [`rbac::RequireImporter`] -- Requires a role allowed to run imports.
//! - [`files::require_file_owner`] -- Restricts `/files` to the owning job's submitter.

pub mod auth;
pub mod files;
pub mod rbac;
