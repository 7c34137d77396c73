//! Import job rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use swatch_core::import_job::{
    ImportMode, ImportOptions, JobCounters, JobFailure, JobPhase, JobStatus, StatusId,
};
use swatch_core::types::{DbId, JobId, Timestamp};

/// A row from the `import_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportJob {
    pub id: JobId,
    pub owner_id: DbId,
    pub trace_id: String,
    pub idempotency_key: String,
    pub import_session_id: Option<String>,
    pub mode: String,
    pub status_id: StatusId,
    pub phase: String,
    pub phase_rank: i16,
    pub progress_percent: i16,
    pub rows_total: i64,
    pub rows_processed: i64,
    pub rows_valid: i64,
    pub rows_invalid: i64,
    pub rows_skipped: i64,
    pub created_count: i64,
    pub updated_count: i64,
    pub failed_count: i64,
    pub options: serde_json::Value,
    pub prune_enabled: bool,
    pub column_mapping: Option<serde_json::Value>,
    pub source_filename: String,
    pub source_file_key: String,
    pub source_file_url: String,
    pub submitted_role: String,
    pub error: Option<serde_json::Value>,
    pub warnings: serde_json::Value,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ImportJob {
    /// Unknown ids only appear if the lookup table drifts from the enum.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    pub fn phase(&self) -> Option<JobPhase> {
        JobPhase::parse(&self.phase)
    }

    pub fn mode(&self) -> Option<ImportMode> {
        ImportMode::parse(&self.mode)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(JobStatus::is_terminal)
    }

    pub fn counters(&self) -> JobCounters {
        JobCounters {
            rows_total: self.rows_total,
            rows_processed: self.rows_processed,
            rows_valid: self.rows_valid,
            rows_invalid: self.rows_invalid,
            rows_skipped: self.rows_skipped,
            created: self.created_count,
            updated: self.updated_count,
            failed: self.failed_count,
        }
    }

    /// Options as submitted. Stored with `#[serde(default)]` semantics, so
    /// older rows missing newer keys still decode.
    pub fn import_options(&self) -> Result<ImportOptions, serde_json::Error> {
        serde_json::from_value(self.options.clone())
    }

    pub fn failure(&self) -> Option<JobFailure> {
        self.error
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn warning_list(&self) -> Vec<String> {
        serde_json::from_value(self.warnings.clone()).unwrap_or_default()
    }
}

/// Insert payload for a freshly admitted job.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub id: JobId,
    pub owner_id: DbId,
    pub trace_id: String,
    pub idempotency_key: String,
    pub options: ImportOptions,
    pub prune_enabled: bool,
    pub source_filename: String,
    pub source_file_key: String,
    pub source_file_url: String,
    pub submitted_role: String,
}

/// Query parameters for listing a user's jobs.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
