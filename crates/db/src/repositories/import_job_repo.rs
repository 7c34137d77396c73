//! Repository for the `import_jobs` table.
//!
//! Status literals come from [`JobStatus`]; every transition is a
//! conditional `UPDATE` so a terminal row is never rewritten.

use sqlx::PgPool;
use swatch_core::import_job::{JobCounters, JobFailure, JobPhase, JobStatus};
use swatch_core::mapping::{is_builtin_id, ColumnMapping};
use swatch_core::types::{DbId, JobId};

use crate::models::import_job::{ImportJob, JobListQuery, NewImportJob};

/// Column list for `import_jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, trace_id, idempotency_key, import_session_id, mode, \
    status_id, phase, phase_rank, progress_percent, \
    rows_total, rows_processed, rows_valid, rows_invalid, rows_skipped, \
    created_count, updated_count, failed_count, \
    options, prune_enabled, column_mapping, \
    source_filename, source_file_key, source_file_url, submitted_role, \
    error, warnings, started_at, completed_at, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Admission limits enforced while inserting a job.
#[derive(Debug, Clone, Copy)]
pub struct SubmitLimits {
    /// How long an idempotency key stays bound to its job.
    pub window_hours: i32,
    /// Ceiling on the owner's non-terminal jobs.
    pub max_active: i64,
}

/// Result of [`ImportJobRepo::create_idempotent`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(ImportJob),
    /// An earlier job with the same key, returned instead of inserting.
    Existing(ImportJob),
    /// The owner already has `active` jobs at or above the ceiling.
    AtCapacity { active: i64 },
    /// The referenced mapping profile is gone or no longer visible.
    ProfileMissing,
}

/// Provides persistence for import jobs.
pub struct ImportJobRepo;

impl ImportJobRepo {
    /// Insert a job unless the owner already submitted one with the same
    /// idempotency key inside the window, in which case that job is
    /// returned.
    ///
    /// A transaction-scoped advisory lock on the owner serializes all of
    /// their submissions, so the key lookup, the active-job count and the
    /// insert behave as one step. A referenced user profile is share-locked
    /// until commit so it cannot be deleted underneath the new job.
    pub async fn create_idempotent(
        pool: &PgPool,
        input: &NewImportJob,
        limits: SubmitLimits,
    ) -> Result<CreateOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("import_jobs:owner:{}", input.owner_id))
            .execute(&mut *tx)
            .await?;

        let existing_query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             WHERE owner_id = $1 AND idempotency_key = $2 \
               AND created_at > NOW() - make_interval(hours => $3) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        let existing = sqlx::query_as::<_, ImportJob>(&existing_query)
            .bind(input.owner_id)
            .bind(&input.idempotency_key)
            .bind(limits.window_hours)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(job) = existing {
            tx.commit().await?;
            tracing::debug!(job_id = %job.id, "Idempotency key already used; returning existing job");
            return Ok(CreateOutcome::Existing(job));
        }

        let (active,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM import_jobs WHERE owner_id = $1 AND status_id = ANY($2)",
        )
        .bind(input.owner_id)
        .bind(JobStatus::active_ids())
        .fetch_one(&mut *tx)
        .await?;
        if active >= limits.max_active {
            return Ok(CreateOutcome::AtCapacity { active });
        }

        if let Some(profile_id) = input
            .options
            .mapping_profile_id
            .as_deref()
            .filter(|id| !is_builtin_id(id))
        {
            let locked = sqlx::query(
                "SELECT 1 FROM mapping_profiles \
                 WHERE id = $1 AND (owner_id = $2 OR is_shared) \
                 FOR SHARE",
            )
            .bind(profile_id)
            .bind(input.owner_id)
            .fetch_optional(&mut *tx)
            .await?;
            if locked.is_none() {
                return Ok(CreateOutcome::ProfileMissing);
            }
        }

        let options = serde_json::to_value(&input.options)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let insert = format!(
            "INSERT INTO import_jobs \
                (id, owner_id, trace_id, idempotency_key, import_session_id, mode, \
                 status_id, phase, phase_rank, options, prune_enabled, \
                 source_filename, source_file_key, source_file_url, submitted_role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, ImportJob>(&insert)
            .bind(input.id)
            .bind(input.owner_id)
            .bind(&input.trace_id)
            .bind(&input.idempotency_key)
            .bind(&input.options.import_session_id)
            .bind(input.options.mode.as_str())
            .bind(JobStatus::Created.id())
            .bind(JobPhase::Queued.as_str())
            .bind(JobPhase::Queued.rank())
            .bind(&options)
            .bind(input.prune_enabled)
            .bind(&input.source_filename)
            .bind(&input.source_file_key)
            .bind(&input.source_file_url)
            .bind(&input.submitted_role)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CreateOutcome::Created(job))
    }

    /// Most recent job with this key inside the window, if any.
    pub async fn find_by_idempotency_key(
        pool: &PgPool,
        owner_id: DbId,
        key: &str,
        window_hours: i32,
    ) -> Result<Option<ImportJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             WHERE owner_id = $1 AND idempotency_key = $2 \
               AND created_at > NOW() - make_interval(hours => $3) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, ImportJob>(&query)
            .bind(owner_id)
            .bind(key)
            .bind(window_hours)
            .fetch_optional(pool)
            .await
    }

    /// Number of the owner's jobs in a non-terminal status.
    pub async fn count_active(pool: &PgPool, owner_id: DbId) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM import_jobs WHERE owner_id = $1 AND status_id = ANY($2)",
        )
        .bind(owner_id)
        .bind(JobStatus::active_ids())
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Number of non-terminal jobs whose options name this mapping profile.
    pub async fn count_active_referencing_profile<'e, E>(
        executor: E,
        profile_id: &str,
    ) -> Result<i64, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM import_jobs \
             WHERE options->>'mapping_profile_id' = $1 AND status_id = ANY($2)",
        )
        .bind(profile_id)
        .bind(JobStatus::active_ids())
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<ImportJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_jobs WHERE id = $1");
        sqlx::query_as::<_, ImportJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job only if `owner_id` submitted it.
    pub async fn find_for_owner(
        pool: &PgPool,
        id: JobId,
        owner_id: DbId,
    ) -> Result<Option<ImportJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_jobs WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, ImportJob>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// List the owner's jobs, newest first.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<ImportJob>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let mut conditions = vec!["owner_id = $1".to_string()];
        let mut bind_idx = 2;
        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }
        let query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             WHERE {} \
             ORDER BY created_at DESC \
             LIMIT ${} OFFSET ${}",
            conditions.join(" AND "),
            bind_idx,
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, ImportJob>(&query).bind(owner_id);
        if let Some(status_id) = params.status_id {
            q = q.bind(status_id);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// `created -> validating`. Returns `false` if the job was not in
    /// `created` (already claimed, or canceled before it started), so only
    /// one task ever runs a given job.
    pub async fn claim(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $2, phase = $3, phase_rank = GREATEST(phase_rank, $4), \
                 started_at = NOW() \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(JobStatus::Validating.id())
        .bind(JobPhase::Initializing.as_str())
        .bind(JobPhase::Initializing.rank())
        .bind(JobStatus::Created.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `validating -> processing`, recording the row count and the resolved
    /// mapping.
    pub async fn mark_processing(
        pool: &PgPool,
        id: JobId,
        rows_total: i64,
        column_mapping: &ColumnMapping,
    ) -> Result<bool, sqlx::Error> {
        let mapping = serde_json::to_value(column_mapping)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $2, rows_total = $3, column_mapping = $4 \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(JobStatus::Processing.id())
        .bind(rows_total)
        .bind(&mapping)
        .bind(JobStatus::Validating.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist progress and counters in one statement.
    ///
    /// Percentage, phase and `rows_processed` only move forward; a stale
    /// write cannot regress them. Terminal jobs are left untouched.
    pub async fn update_progress(
        pool: &PgPool,
        id: JobId,
        percent: i16,
        phase: JobPhase,
        counters: &JobCounters,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET progress_percent = GREATEST(progress_percent, $2), \
                 phase = CASE WHEN $4 > phase_rank THEN $3 ELSE phase END, \
                 phase_rank = GREATEST(phase_rank, $4), \
                 rows_total = $5, \
                 rows_processed = GREATEST(rows_processed, LEAST($6, $5)), \
                 rows_valid = $7, rows_invalid = $8, rows_skipped = $9, \
                 created_count = $10, updated_count = $11, failed_count = $12 \
             WHERE id = $1 AND status_id <> ALL($13)",
        )
        .bind(id)
        .bind(percent)
        .bind(phase.as_str())
        .bind(phase.rank())
        .bind(counters.rows_total)
        .bind(counters.rows_processed)
        .bind(counters.rows_valid)
        .bind(counters.rows_invalid)
        .bind(counters.rows_skipped)
        .bind(counters.created)
        .bind(counters.updated)
        .bind(counters.failed)
        .bind(JobStatus::terminal_ids())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a running job to `completed` with its final counters.
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        counters: &JobCounters,
    ) -> Result<bool, sqlx::Error> {
        Self::finish(pool, id, JobStatus::Completed, JobPhase::Completed, counters).await
    }

    /// Record counters reached before a cooperative cancel. The status
    /// itself was already set by [`ImportJobRepo::cancel`].
    pub async fn record_canceled_counters(
        pool: &PgPool,
        id: JobId,
        counters: &JobCounters,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs \
             SET rows_processed = GREATEST(rows_processed, $2), \
                 rows_valid = $3, rows_invalid = $4, rows_skipped = $5, \
                 created_count = $6, updated_count = $7, failed_count = $8 \
             WHERE id = $1 AND status_id = $9",
        )
        .bind(id)
        .bind(counters.rows_processed)
        .bind(counters.rows_valid)
        .bind(counters.rows_invalid)
        .bind(counters.rows_skipped)
        .bind(counters.created)
        .bind(counters.updated)
        .bind(counters.failed)
        .bind(JobStatus::Canceled.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn finish(
        pool: &PgPool,
        id: JobId,
        status: JobStatus,
        phase: JobPhase,
        counters: &JobCounters,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $2, phase = $3, phase_rank = GREATEST(phase_rank, $4), \
                 progress_percent = 100, completed_at = NOW(), \
                 rows_total = $5, rows_processed = GREATEST(rows_processed, $6), \
                 rows_valid = $7, rows_invalid = $8, rows_skipped = $9, \
                 created_count = $10, updated_count = $11, failed_count = $12 \
             WHERE id = $1 AND status_id <> ALL($13)",
        )
        .bind(id)
        .bind(status.id())
        .bind(phase.as_str())
        .bind(phase.rank())
        .bind(counters.rows_total)
        .bind(counters.rows_processed)
        .bind(counters.rows_valid)
        .bind(counters.rows_invalid)
        .bind(counters.rows_skipped)
        .bind(counters.created)
        .bind(counters.updated)
        .bind(counters.failed)
        .bind(JobStatus::terminal_ids())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a non-terminal job to `failed` with a structured cause.
    ///
    /// No automatic retry is performed; a retry is a new submission.
    pub async fn fail(pool: &PgPool, id: JobId, failure: &JobFailure) -> Result<bool, sqlx::Error> {
        let error = serde_json::to_value(failure).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $2, phase = $3, phase_rank = GREATEST(phase_rank, $4), \
                 error = $5, completed_at = NOW() \
             WHERE id = $1 AND status_id <> ALL($6)",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(JobPhase::Failed.as_str())
        .bind(JobPhase::Failed.rank())
        .bind(&error)
        .bind(JobStatus::terminal_ids())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Returns `true` if the job was canceled, `false` if it was already
    /// completed, failed, or canceled.
    pub async fn cancel(pool: &PgPool, id: JobId, owner_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $3, phase = $4, phase_rank = GREATEST(phase_rank, $5), \
                 completed_at = NOW() \
             WHERE id = $1 AND owner_id = $2 AND status_id <> ALL($6)",
        )
        .bind(id)
        .bind(owner_id)
        .bind(JobStatus::Canceled.id())
        .bind(JobPhase::Canceled.as_str())
        .bind(JobPhase::Canceled.rank())
        .bind(JobStatus::terminal_ids())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append warnings. Allowed on terminal jobs, since artifact warnings
    /// may arrive with the completion itself.
    pub async fn add_warnings(
        pool: &PgPool,
        id: JobId,
        warnings: &[String],
    ) -> Result<(), sqlx::Error> {
        if warnings.is_empty() {
            return Ok(());
        }
        let value = serde_json::to_value(warnings).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query("UPDATE import_jobs SET warnings = warnings || $2 WHERE id = $1")
            .bind(id)
            .bind(&value)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Fail every non-terminal job. Run once at startup: jobs execute as
    /// in-process tasks, so anything still active belonged to a previous
    /// process and has no owner left.
    pub async fn fail_orphaned(pool: &PgPool, failure: &JobFailure) -> Result<u64, sqlx::Error> {
        let error = serde_json::to_value(failure).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $1, phase = $2, phase_rank = GREATEST(phase_rank, $3), \
                 error = $4, completed_at = NOW() \
             WHERE status_id = ANY($5)",
        )
        .bind(JobStatus::Failed.id())
        .bind(JobPhase::Failed.as_str())
        .bind(JobPhase::Failed.rank())
        .bind(&error)
        .bind(JobStatus::active_ids())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
