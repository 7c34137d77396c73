//! Drives admitted jobs through the import pipeline.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use swatch_core::import_job::{
    JobFailure, FAILURE_INTERNAL, FAILURE_STORAGE_UNAVAILABLE,
};
use swatch_core::pipeline::{ImportPipeline, ImportRequest, PipelineOutcome};
use swatch_core::ports::ObjectStorage;
use swatch_core::types::JobId;
use swatch_db::models::ImportJob;
use swatch_db::repositories::ImportJobRepo;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::progress::PgProgressReporter;
use super::registry::JobRegistry;

/// Spawns and tracks one task per admitted job.
///
/// Jobs are single-owner: a task first claims its row (`created ->
/// validating`) and gives up if the claim fails.
pub struct ImportEngine {
    pool: PgPool,
    pipeline: ImportPipeline,
    storage: Arc<dyn ObjectStorage>,
    registry: JobRegistry,
    tasks: TaskTracker,
}

impl ImportEngine {
    pub fn new(pool: PgPool, pipeline: ImportPipeline, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            pool,
            pipeline,
            storage,
            registry: JobRegistry::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Start a task for a freshly created job.
    pub fn spawn(self: &Arc<Self>, job: ImportJob) {
        let token = self.registry.register(job.id);
        let span = tracing::info_span!(
            "import_job",
            job_id = %job.id,
            trace_id = %job.trace_id,
            owner_id = job.owner_id,
        );
        let engine = Arc::clone(self);
        self.tasks.spawn(
            async move {
                let job_id = job.id;
                engine.run(job, &token).await;
                engine.registry.remove(&job_id);
            }
            .instrument(span),
        );
    }

    /// Signal a running job to stop at the next row boundary.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        self.registry.cancel(job_id)
    }

    pub fn running_count(&self) -> usize {
        self.registry.running_count()
    }

    /// Signal every job and wait up to `timeout` for their tasks to end.
    pub async fn shutdown(&self, timeout: Duration) {
        self.registry.cancel_all();
        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                running = self.registry.running_count(),
                "Import tasks still running after shutdown timeout",
            );
        }
    }

    async fn run(&self, job: ImportJob, cancel: &CancellationToken) {
        match ImportJobRepo::claim(&self.pool, job.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Job no longer in created status; not running it");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim job");
                return;
            }
        }
        tracing::info!(mode = %job.mode, "Import job started");

        let outcome = match self.prepare(&job).await {
            Ok(request) => {
                let reporter = PgProgressReporter::new(self.pool.clone(), job.id);
                self.pipeline.run(&request, &reporter, cancel).await
            }
            Err(failure) => Err(failure),
        };

        if let Err(e) = self.record_outcome(&job, outcome).await {
            tracing::error!(error = %e, "Failed to persist job outcome");
        }
    }

    /// Load the stored source and the job's options.
    async fn prepare(&self, job: &ImportJob) -> Result<ImportRequest, JobFailure> {
        let options = job.import_options().map_err(|e| {
            JobFailure::new(FAILURE_INTERNAL, format!("stored options are unreadable: {e}"))
        })?;
        let bytes = self
            .storage
            .get(&job.source_file_key)
            .await
            .map_err(|e| {
                JobFailure::new(FAILURE_STORAGE_UNAVAILABLE, e.to_string()).with_details(
                    serde_json::json!({ "source_file_key": job.source_file_key }),
                )
            })?;

        Ok(ImportRequest {
            job_id: job.id,
            owner_id: job.owner_id,
            options,
            prune_enabled: job.prune_enabled,
            filename: job.source_filename.clone(),
            bytes,
        })
    }

    async fn record_outcome(
        &self,
        job: &ImportJob,
        outcome: Result<PipelineOutcome, JobFailure>,
    ) -> Result<(), sqlx::Error> {
        match outcome {
            Ok(PipelineOutcome::Completed(summary)) => {
                let completed = ImportJobRepo::complete(&self.pool, job.id, &summary.counters).await?;
                ImportJobRepo::add_warnings(&self.pool, job.id, &summary.warnings).await?;
                if completed {
                    tracing::info!(
                        rows_total = summary.counters.rows_total,
                        created = summary.counters.created,
                        updated = summary.counters.updated,
                        failed = summary.counters.failed,
                        artifacts = summary.artifacts.len(),
                        "Import job completed",
                    );
                } else {
                    tracing::info!("Import finished after the job was canceled; status kept");
                }
            }
            Ok(PipelineOutcome::Canceled(summary)) => {
                // Shutdown cancels without touching the row first.
                ImportJobRepo::cancel(&self.pool, job.id, job.owner_id).await?;
                ImportJobRepo::record_canceled_counters(&self.pool, job.id, &summary.counters)
                    .await?;
                tracing::info!(
                    rows_processed = summary.counters.rows_processed,
                    "Import job canceled",
                );
            }
            Err(failure) => {
                tracing::warn!(code = %failure.code, message = %failure.message, "Import job failed");
                ImportJobRepo::fail(&self.pool, job.id, &failure).await?;
            }
        }
        Ok(())
    }
}
