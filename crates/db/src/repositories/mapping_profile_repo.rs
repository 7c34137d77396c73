//! Repository for the `mapping_profiles` table.
//!
//! Built-in profiles never reach this table; the `builtin-` id prefix is
//! rejected by a CHECK constraint.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use swatch_core::error::CoreError;
use swatch_core::mapping::{ProfileMapping, ProfileSource};
use swatch_core::types::DbId;
use uuid::Uuid;

use crate::models::mapping_profile::{
    CreateMappingProfile, MappingProfile, ProfileListQuery, UpdateMappingProfile,
};
use crate::repositories::ImportJobRepo;

/// Column list for `mapping_profiles` queries.
const COLUMNS: &str = "\
    id, owner_id, name, description, mapping, settings, \
    is_default, is_shared, metadata, created_at, updated_at";

fn encode(value: impl serde::Serialize) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Result of [`MappingProfileRepo::delete_unreferenced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The owner has no profile with this id.
    NotFound,
    /// Non-terminal jobs still reference the profile.
    InUse { active_jobs: i64 },
}

/// Provides CRUD operations for user mapping profiles.
pub struct MappingProfileRepo;

impl MappingProfileRepo {
    /// Profiles the owner can see: their own plus every shared one.
    /// Defaults first, then by name.
    pub async fn list_visible(
        pool: &PgPool,
        owner_id: DbId,
        params: &ProfileListQuery,
    ) -> Result<Vec<MappingProfile>, sqlx::Error> {
        let mut conditions = vec!["(owner_id = $1 OR is_shared)"];

        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));
        if search.is_some() {
            conditions.push("(name ILIKE $2 OR COALESCE(description, '') ILIKE $2)");
        }
        match params.shared {
            Some(true) => conditions.push("is_shared"),
            Some(false) => conditions.push("owner_id = $1"),
            None => {}
        }

        let query = format!(
            "SELECT {COLUMNS} FROM mapping_profiles \
             WHERE {} \
             ORDER BY (is_default AND owner_id = $1) DESC, name ASC, id ASC",
            conditions.join(" AND "),
        );
        let mut q = sqlx::query_as::<_, MappingProfile>(&query).bind(owner_id);
        if let Some(pattern) = search {
            q = q.bind(pattern);
        }
        q.fetch_all(pool).await
    }

    /// A profile the owner can see, or `None`.
    pub async fn find_visible(
        pool: &PgPool,
        id: &str,
        owner_id: DbId,
    ) -> Result<Option<MappingProfile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM mapping_profiles \
             WHERE id = $1 AND (owner_id = $2 OR is_shared)"
        );
        sqlx::query_as::<_, MappingProfile>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// The owner's current default profile, if one is set.
    pub async fn find_default(
        pool: &PgPool,
        owner_id: DbId,
    ) -> Result<Option<MappingProfile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM mapping_profiles WHERE owner_id = $1 AND is_default"
        );
        sqlx::query_as::<_, MappingProfile>(&query)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a profile. Setting `is_default` clears the owner's previous
    /// default inside the same transaction.
    pub async fn create(
        pool: &PgPool,
        owner_id: DbId,
        input: &CreateMappingProfile,
    ) -> Result<MappingProfile, sqlx::Error> {
        let mut tx = pool.begin().await?;
        if input.is_default {
            clear_default(&mut tx, owner_id, None).await?;
        }

        let query = format!(
            "INSERT INTO mapping_profiles \
                (id, owner_id, name, description, mapping, settings, is_default, is_shared, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        let profile = sqlx::query_as::<_, MappingProfile>(&query)
            .bind(Uuid::now_v7().to_string())
            .bind(owner_id)
            .bind(input.name.trim())
            .bind(&input.description)
            .bind(encode(&input.mapping)?)
            .bind(encode(input.settings)?)
            .bind(input.is_default)
            .bind(input.is_shared)
            .bind(&input.metadata)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(profile)
    }

    /// Patch a profile owned by `owner_id`. Returns `None` when the owner
    /// has no profile with this id, in which case nothing is written.
    pub async fn update(
        pool: &PgPool,
        id: &str,
        owner_id: DbId,
        input: &UpdateMappingProfile,
    ) -> Result<Option<MappingProfile>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        if !lock_owned(&mut tx, id, owner_id).await? {
            return Ok(None);
        }
        if input.is_default == Some(true) {
            clear_default(&mut tx, owner_id, Some(id)).await?;
        }

        let mapping = input.mapping.as_ref().map(encode).transpose()?;
        let settings = input.settings.map(encode).transpose()?;
        let query = format!(
            "UPDATE mapping_profiles SET \
                name = COALESCE($3, name), \
                description = COALESCE($4, description), \
                mapping = COALESCE($5, mapping), \
                settings = COALESCE($6, settings), \
                is_default = COALESCE($7, is_default), \
                is_shared = COALESCE($8, is_shared), \
                metadata = COALESCE($9, metadata) \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {COLUMNS}"
        );
        let profile = sqlx::query_as::<_, MappingProfile>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(&input.description)
            .bind(mapping)
            .bind(settings)
            .bind(input.is_default)
            .bind(input.is_shared)
            .bind(&input.metadata)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(profile)
    }

    /// Delete a profile owned by `owner_id` unless an active job still
    /// references it.
    ///
    /// The row lock conflicts with the share lock job submission takes on
    /// the profile, so a job cannot start referencing it between the count
    /// and the delete.
    pub async fn delete_unreferenced(
        pool: &PgPool,
        id: &str,
        owner_id: DbId,
    ) -> Result<DeleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;
        if !lock_owned(&mut tx, id, owner_id).await? {
            return Ok(DeleteOutcome::NotFound);
        }

        let active_jobs = ImportJobRepo::count_active_referencing_profile(&mut *tx, id).await?;
        if active_jobs > 0 {
            return Ok(DeleteOutcome::InUse { active_jobs });
        }

        sqlx::query("DELETE FROM mapping_profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deleted)
    }
}

/// Lock the owner's profile row for the rest of the transaction. Returns
/// `false` when the owner has no profile with this id.
async fn lock_owned(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    owner_id: DbId,
) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM mapping_profiles WHERE id = $1 AND owner_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.is_some())
}

/// Unset the owner's default, optionally sparing one profile.
async fn clear_default(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: DbId,
    except_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE mapping_profiles SET is_default = FALSE \
         WHERE owner_id = $1 AND is_default AND ($2::TEXT IS NULL OR id <> $2)",
    )
    .bind(owner_id)
    .bind(except_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// [`ProfileSource`] over the `mapping_profiles` table.
#[derive(Clone)]
pub struct PgProfileSource {
    pool: PgPool,
}

impl PgProfileSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileSource for PgProfileSource {
    async fn visible_profile(
        &self,
        id: &str,
        owner_id: DbId,
    ) -> Result<Option<ProfileMapping>, CoreError> {
        let profile = MappingProfileRepo::find_visible(&self.pool, id, owner_id)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to load mapping profile: {e}")))?;
        Ok(profile.map(|p| p.to_profile_mapping()))
    }

    async fn default_profile(&self, owner_id: DbId) -> Result<Option<ProfileMapping>, CoreError> {
        let profile = MappingProfileRepo::find_default(&self.pool, owner_id)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to load default profile: {e}")))?;
        Ok(profile.map(|p| p.to_profile_mapping()))
    }
}
