//! Handlers for the `/mapping-profiles` resource.
//!
//! Built-in profiles are listed alongside stored ones but are read-only.
//! Stored profiles are visible to their owner and, when shared, to every
//! importer; only the owner may change them.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use swatch_core::error::CoreError;
use swatch_core::mapping::{
    self, duplicate_name, find_builtin, imported_name, is_builtin_id, parse_export,
    validate_profile, BuiltinProfile, ColumnMapping, MappingSettings, ProfileDocument,
    BUILTIN_PROFILES,
};
use swatch_core::types::{DbId, ProfileId, Timestamp};
use swatch_db::models::{
    CreateMappingProfile, MappingProfile, ProfileListQuery, UpdateMappingProfile,
};
use swatch_db::repositories::{DeleteOutcome, MappingProfileRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireImporter;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A profile as returned by the API, built-in or stored.
#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub id: ProfileId,
    pub name: String,
    pub description: Option<String>,
    pub mapping: ColumnMapping,
    pub settings: MappingSettings,
    pub is_default: bool,
    pub is_shared: bool,
    pub is_builtin: bool,
    /// `None` for built-in profiles.
    pub owner_id: Option<DbId>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl From<&BuiltinProfile> for ProfileView {
    fn from(profile: &BuiltinProfile) -> Self {
        Self {
            id: profile.id.to_string(),
            name: profile.name.to_string(),
            description: Some(profile.description.to_string()),
            mapping: profile.column_mapping(),
            settings: profile.settings,
            is_default: false,
            is_shared: true,
            is_builtin: true,
            owner_id: None,
            metadata: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<MappingProfile> for ProfileView {
    fn from(profile: MappingProfile) -> Self {
        Self {
            mapping: profile.column_mapping(),
            settings: profile.mapping_settings(),
            id: profile.id,
            name: profile.name,
            description: profile.description,
            is_default: profile.is_default,
            is_shared: profile.is_shared,
            is_builtin: false,
            owner_id: Some(profile.owner_id),
            metadata: profile.metadata,
            created_at: Some(profile.created_at),
            updated_at: Some(profile.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportView {
    pub profile_id: ProfileId,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn builtin_document(profile: &BuiltinProfile) -> ProfileDocument {
    ProfileDocument {
        name: profile.name.to_string(),
        description: Some(profile.description.to_string()),
        mapping: profile.column_mapping(),
        settings: profile.settings,
        metadata: None,
    }
}

fn read_only() -> AppError {
    AppError::Core(CoreError::Forbidden("Built-in profiles are read-only".into()))
}

/// Case-insensitive substring match, same rule as the repository's search.
fn builtin_matches(profile: &BuiltinProfile, search: Option<&str>) -> bool {
    let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    let needle = needle.to_lowercase();
    profile.name.to_lowercase().contains(&needle)
        || profile.description.to_lowercase().contains(&needle)
}

/// The portable document of any profile the caller can see.
async fn find_document(pool: &sqlx::PgPool, id: &str, user: &AuthUser) -> AppResult<ProfileDocument> {
    if let Some(builtin) = find_builtin(id) {
        return Ok(builtin_document(builtin));
    }
    Ok(find_visible(pool, id, user).await?.to_document())
}

async fn find_visible(pool: &sqlx::PgPool, id: &str, user: &AuthUser) -> AppResult<MappingProfile> {
    MappingProfileRepo::find_visible(pool, id, user.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("MappingProfile", id)))
}

/// Load a stored profile the caller may modify.
///
/// Built-in ids are `Forbidden`, unknown or invisible ids `NotFound`, and
/// shared profiles owned by someone else `Forbidden`.
async fn find_writable(
    pool: &sqlx::PgPool,
    id: &str,
    user: &AuthUser,
    action: &str,
) -> AppResult<MappingProfile> {
    if is_builtin_id(id) {
        return Err(read_only());
    }
    let profile = find_visible(pool, id, user).await?;
    if profile.owner_id != user.user_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another user's profile"
        ))));
    }
    Ok(profile)
}

async fn create_from_document(
    state: &AppState,
    user: &AuthUser,
    document: ProfileDocument,
) -> AppResult<MappingProfile> {
    validate_profile(&document.name, &document.mapping)?;
    let input = CreateMappingProfile::from(document);
    Ok(MappingProfileRepo::create(&state.pool, user.user_id, &input).await?)
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/mapping-profiles
///
/// Built-in profiles first, then the caller's own and shared profiles.
/// Supports `search` and `shared` query parameters; `shared=false` omits
/// the built-ins.
pub async fn list_profiles(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Query(params): Query<ProfileListQuery>,
) -> AppResult<impl IntoResponse> {
    let mut profiles: Vec<ProfileView> = if params.shared == Some(false) {
        Vec::new()
    } else {
        BUILTIN_PROFILES
            .iter()
            .filter(|p| builtin_matches(p, params.search.as_deref()))
            .map(ProfileView::from)
            .collect()
    };

    profiles.extend(
        MappingProfileRepo::list_visible(&state.pool, user.user_id, &params)
            .await?
            .into_iter()
            .map(ProfileView::from),
    );

    Ok(Json(DataResponse { data: profiles }))
}

/// GET /api/v1/mapping-profiles/{id}
pub async fn get_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    let view = match find_builtin(&id) {
        Some(builtin) => ProfileView::from(builtin),
        None => ProfileView::from(find_visible(&state.pool, &id, &user).await?),
    };
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Create / update / delete
// ---------------------------------------------------------------------------

/// POST /api/v1/mapping-profiles
///
/// Setting `is_default` clears the caller's previous default in the same
/// transaction.
pub async fn create_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Json(input): Json<CreateMappingProfile>,
) -> AppResult<impl IntoResponse> {
    validate_profile(&input.name, &input.mapping)?;
    let profile = MappingProfileRepo::create(&state.pool, user.user_id, &input).await?;

    tracing::info!(
        profile_id = %profile.id,
        user_id = user.user_id,
        is_default = profile.is_default,
        "Mapping profile created",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: ProfileView::from(profile),
        }),
    ))
}

/// PUT /api/v1/mapping-profiles/{id}
pub async fn update_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
    Json(input): Json<UpdateMappingProfile>,
) -> AppResult<impl IntoResponse> {
    let existing = find_writable(&state.pool, &id, &user, "update").await?;

    let name = input.name.as_deref().unwrap_or(&existing.name);
    let mapping = match &input.mapping {
        Some(mapping) => mapping.clone(),
        None => existing.column_mapping(),
    };
    validate_profile(name, &mapping)?;

    let profile = MappingProfileRepo::update(&state.pool, &id, user.user_id, &input)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("MappingProfile", &id)))?;

    tracing::info!(profile_id = %profile.id, user_id = user.user_id, "Mapping profile updated");
    Ok(Json(DataResponse {
        data: ProfileView::from(profile),
    }))
}

/// DELETE /api/v1/mapping-profiles/{id}
///
/// Refused with 409 while an active import still references the profile.
pub async fn delete_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<StatusCode> {
    find_writable(&state.pool, &id, &user, "delete").await?;

    match MappingProfileRepo::delete_unreferenced(&state.pool, &id, user.user_id).await? {
        DeleteOutcome::Deleted => {}
        DeleteOutcome::NotFound => {
            return Err(AppError::Core(CoreError::not_found("MappingProfile", &id)));
        }
        DeleteOutcome::InUse { active_jobs } => {
            return Err(AppError::Core(CoreError::Conflict(format!(
                "Profile is used by {active_jobs} running import(s)"
            ))));
        }
    }
    tracing::info!(profile_id = %id, user_id = user.user_id, "Mapping profile deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Duplicate / export / import
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DuplicateRequest {
    pub name: Option<String>,
}

/// POST /api/v1/mapping-profiles/{id}/duplicate
///
/// Copies any visible profile, built-ins included, into a new profile
/// owned by the caller. The copy is never default or shared.
pub async fn duplicate_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
    Json(input): Json<DuplicateRequest>,
) -> AppResult<impl IntoResponse> {
    let mut document = find_document(&state.pool, &id, &user).await?;
    document.name = duplicate_name(&document.name, input.name.as_deref());

    let profile = create_from_document(&state, &user, document).await?;
    tracing::info!(source_id = %id, profile_id = %profile.id, "Mapping profile duplicated");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: ProfileView::from(profile),
        }),
    ))
}

/// GET /api/v1/mapping-profiles/{id}/export
///
/// Returns the profile serialized as a versioned JSON envelope.
pub async fn export_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    let document = find_document(&state.pool, &id, &user).await?;
    let content = mapping::export_profile(document, chrono::Utc::now())?;
    Ok(Json(DataResponse {
        data: ExportView {
            profile_id: id,
            content,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ImportProfileRequest {
    /// A serialized export envelope.
    pub content: String,
    pub name: Option<String>,
}

/// POST /api/v1/mapping-profiles/import
pub async fn import_profile(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Json(input): Json<ImportProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let mut document = parse_export(&input.content)?;
    document.name = imported_name(&document.name, input.name.as_deref());

    let profile = create_from_document(&state, &user, document).await?;
    tracing::info!(profile_id = %profile.id, user_id = user.user_id, "Mapping profile imported");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: ProfileView::from(profile),
        }),
    ))
}
