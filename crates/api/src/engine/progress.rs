//! Persists pipeline progress to the job row.

use async_trait::async_trait;
use sqlx::PgPool;
use swatch_core::artifacts::ArtifactKind;
use swatch_core::error::CoreError;
use swatch_core::import_job::JobCounters;
use swatch_core::mapping::ColumnMapping;
use swatch_core::ports::{ProgressReporter, StoredObject};
use swatch_core::progress::ProgressMark;
use swatch_core::types::JobId;
use swatch_db::repositories::{ImportArtifactRepo, ImportJobRepo};

/// [`ProgressReporter`] bound to one `import_jobs` row.
pub struct PgProgressReporter {
    pool: PgPool,
    job_id: JobId,
}

impl PgProgressReporter {
    pub fn new(pool: PgPool, job_id: JobId) -> Self {
        Self { pool, job_id }
    }
}

fn db_error(context: &str, err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("{context}: {err}"))
}

#[async_trait]
impl ProgressReporter for PgProgressReporter {
    async fn processing_started(
        &self,
        rows_total: i64,
        column_mapping: &ColumnMapping,
    ) -> Result<(), CoreError> {
        let moved =
            ImportJobRepo::mark_processing(&self.pool, self.job_id, rows_total, column_mapping)
                .await
                .map_err(|e| db_error("failed to mark job processing", e))?;
        if !moved {
            // Canceled in the meantime; the pipeline sees the token next.
            tracing::debug!(job_id = %self.job_id, "Job left validating before processing started");
        }
        Ok(())
    }

    async fn progress(&self, mark: &ProgressMark, counters: &JobCounters) -> Result<(), CoreError> {
        ImportJobRepo::update_progress(
            &self.pool,
            self.job_id,
            mark.percent(),
            mark.phase(),
            counters,
        )
        .await
        .map_err(|e| db_error("failed to persist progress", e))?;
        Ok(())
    }

    async fn artifact_written(
        &self,
        kind: ArtifactKind,
        object: &StoredObject,
    ) -> Result<(), CoreError> {
        ImportArtifactRepo::upsert(&self.pool, self.job_id, kind, &object.key, &object.url)
            .await
            .map_err(|e| db_error("failed to record artifact", e))?;
        Ok(())
    }
}
