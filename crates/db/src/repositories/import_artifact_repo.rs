//! Repository for the `import_job_artifacts` table.

use sqlx::PgPool;
use swatch_core::artifacts::ArtifactKind;
use swatch_core::types::JobId;

use crate::models::artifact::ImportArtifact;

/// Column list for `import_job_artifacts` queries.
const COLUMNS: &str = "id, job_id, kind, storage_key, url, created_at, updated_at";

pub struct ImportArtifactRepo;

impl ImportArtifactRepo {
    /// Record an artifact. One row per `(job_id, kind)`; a second write of
    /// the same kind replaces the reference.
    pub async fn upsert(
        pool: &PgPool,
        job_id: JobId,
        kind: ArtifactKind,
        storage_key: &str,
        url: &str,
    ) -> Result<ImportArtifact, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_job_artifacts (job_id, kind, storage_key, url) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (job_id, kind) DO UPDATE \
                SET storage_key = EXCLUDED.storage_key, url = EXCLUDED.url \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportArtifact>(&query)
            .bind(job_id)
            .bind(kind.as_str())
            .bind(storage_key)
            .bind(url)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_job(
        pool: &PgPool,
        job_id: JobId,
    ) -> Result<Vec<ImportArtifact>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_job_artifacts WHERE job_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, ImportArtifact>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
