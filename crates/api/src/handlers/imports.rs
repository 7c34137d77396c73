//! Handlers for the `/imports` resource.
//!
//! Submission runs every admission check synchronously; a job record only
//! exists once the submission has been accepted. Jobs are visible to their
//! submitter only.

use std::collections::BTreeMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use swatch_core::admission::{parse_options, require_idempotency_key, SubmissionError, SubmissionFields};
use swatch_core::error::CoreError;
use swatch_core::import_job::{ImportOptions, JobFailure, JobStatus};
use swatch_core::mapping::{find_builtin, is_builtin_id};
use swatch_core::progress::ProgressStats;
use swatch_core::safety_gate::{check_prune, CONFIRM_HEADER};
use swatch_core::source::SheetSource;
use swatch_core::types::{DbId, JobId, Timestamp};
use swatch_db::models::{ImportJob, JobListQuery, NewImportJob};
use swatch_db::repositories::{
    CreateOutcome, ImportArtifactRepo, ImportJobRepo, MappingProfileRepo, SubmitLimits,
};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireImporter;
use crate::response::DataResponse;
use crate::state::AppState;

/// Header carrying the client's idempotency key. The multipart field
/// `idempotency_key` is accepted as a fallback.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Multipart field holding the uploaded sheet.
const FILE_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct JobLinks {
    pub status: String,
    pub cancel: String,
    pub artifacts: String,
}

impl JobLinks {
    fn for_job(id: JobId) -> Self {
        let base = format!("/api/v1/imports/{id}");
        Self {
            cancel: format!("{base}/cancel"),
            artifacts: format!("{base}/artifacts"),
            status: base,
        }
    }
}

/// Response to an accepted (or deduplicated) submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub trace_id: String,
    pub idempotency_key: String,
    pub status: &'static str,
    pub mode: String,
    pub options: serde_json::Value,
    /// `false` when an earlier job with the same key was returned.
    pub created: bool,
    pub links: JobLinks,
}

impl SubmitResponse {
    fn new(job: ImportJob, created: bool) -> Self {
        Self {
            status: status_name(&job),
            links: JobLinks::for_job(job.id),
            job_id: job.id,
            trace_id: job.trace_id,
            idempotency_key: job.idempotency_key,
            mode: job.mode,
            options: job.options,
            created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub percent: i16,
    pub rows_total: i64,
    pub rows_processed: i64,
    pub rows_valid: i64,
    pub rows_invalid: i64,
    pub rows_skipped: i64,
    pub created: i64,
    pub updated: i64,
    pub failed: i64,
}

/// Full status of one job.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub trace_id: String,
    pub idempotency_key: String,
    pub import_session_id: Option<String>,
    pub status: &'static str,
    pub phase: String,
    pub mode: String,
    pub progress: ProgressView,
    /// Present once the job has started.
    pub stats: Option<ProgressStats>,
    pub source_filename: String,
    pub source_file_url: String,
    /// Artifact kind to URL, for artifacts generated so far.
    pub artifacts: BTreeMap<String, String>,
    pub options: serde_json::Value,
    pub column_mapping: Option<serde_json::Value>,
    pub warnings: Vec<String>,
    pub error: Option<JobFailure>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    pub links: JobLinks,
}

impl JobView {
    fn new(job: ImportJob, artifacts: BTreeMap<String, String>, now: Timestamp) -> Self {
        let counters = job.counters();
        let stats = job.started_at.map(|started| {
            let elapsed = (job.completed_at.unwrap_or(now) - started)
                .to_std()
                .unwrap_or_default();
            ProgressStats::compute(&counters, elapsed)
        });
        Self {
            status: status_name(&job),
            error: job.failure(),
            warnings: job.warning_list(),
            links: JobLinks::for_job(job.id),
            progress: ProgressView {
                percent: job.progress_percent,
                rows_total: counters.rows_total,
                rows_processed: counters.rows_processed,
                rows_valid: counters.rows_valid,
                rows_invalid: counters.rows_invalid,
                rows_skipped: counters.rows_skipped,
                created: counters.created,
                updated: counters.updated,
                failed: counters.failed,
            },
            stats,
            artifacts,
            job_id: job.id,
            trace_id: job.trace_id,
            idempotency_key: job.idempotency_key,
            import_session_id: job.import_session_id,
            phase: job.phase,
            mode: job.mode,
            source_filename: job.source_filename,
            source_file_url: job.source_file_url,
            options: job.options,
            column_mapping: job.column_mapping,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: job.updated_at,
        }
    }
}

/// Compact row for job listings.
#[derive(Debug, Serialize)]
pub struct JobSummaryView {
    pub job_id: JobId,
    pub status: &'static str,
    pub phase: String,
    pub mode: String,
    pub progress_percent: i16,
    pub rows_total: i64,
    pub rows_processed: i64,
    pub source_filename: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<ImportJob> for JobSummaryView {
    fn from(job: ImportJob) -> Self {
        Self {
            status: status_name(&job),
            job_id: job.id,
            phase: job.phase,
            mode: job.mode,
            progress_percent: job.progress_percent,
            rows_total: job.rows_total,
            rows_processed: job.rows_processed,
            source_filename: job.source_filename,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArtifactView {
    pub kind: String,
    pub url: String,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn status_name(job: &ImportJob) -> &'static str {
    job.status().map(JobStatus::as_str).unwrap_or("unknown")
}

/// Fetch a job the caller submitted. Other users' jobs read as missing.
async fn find_owned(pool: &sqlx::PgPool, job_id: JobId, user: &AuthUser) -> AppResult<ImportJob> {
    ImportJobRepo::find_for_owner(pool, job_id, user.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("ImportJob", job_id)))
}

async fn artifact_urls(pool: &sqlx::PgPool, job_id: JobId) -> AppResult<BTreeMap<String, String>> {
    Ok(ImportArtifactRepo::list_for_job(pool, job_id)
        .await?
        .into_iter()
        .map(|a| (a.kind, a.url))
        .collect())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The upload as received.
struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

/// Split the multipart body into option fields and the optional file.
async fn read_submission(
    mut multipart: Multipart,
) -> AppResult<(SubmissionFields, Option<UploadedFile>)> {
    let mut fields = SubmissionFields::new();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            file = Some(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            fields.insert(name, value);
        }
    }

    Ok((fields, file))
}

/// Reject a profile reference that does not resolve for the caller.
async fn ensure_profile_visible(
    pool: &sqlx::PgPool,
    options: &ImportOptions,
    owner_id: DbId,
) -> AppResult<()> {
    let Some(profile_id) = options.mapping_profile_id.as_deref() else {
        return Ok(());
    };
    let found = if is_builtin_id(profile_id) {
        find_builtin(profile_id).is_some()
    } else {
        MappingProfileRepo::find_visible(pool, profile_id, owner_id)
            .await?
            .is_some()
    };
    if found {
        Ok(())
    } else {
        Err(AppError::Core(CoreError::not_found("MappingProfile", profile_id)))
    }
}

/// Where the job's source lives.
struct SourceRef {
    filename: String,
    key: String,
    url: String,
    /// Written by this request, as opposed to reused from an earlier job.
    uploaded: bool,
}

/// Remove an upload that no job ended up owning. Failure only leaves an
/// unreferenced object behind, so it is logged rather than surfaced.
async fn discard_upload(state: &AppState, key: Option<&str>) {
    let Some(key) = key else {
        return;
    };
    if let Err(e) = state.storage.delete(key).await {
        tracing::warn!(key = %key, error = %e, "Failed to discard unused upload");
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/imports
///
/// Multipart submission: an optional `file` part plus option fields. The
/// idempotency key comes from the `Idempotency-Key` header or the
/// `idempotency_key` field.
///
/// Returns 202 with the new job, or 200 with the earlier job when the key
/// was already used inside the idempotency window.
pub async fn submit_import(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let import = &state.config.import;
    let (fields, file) = read_submission(multipart).await?;

    let idempotency_key = require_idempotency_key(
        header_str(&headers, IDEMPOTENCY_KEY_HEADER)
            .or_else(|| fields.get("idempotency_key").map(String::as_str)),
    )?;
    let options = parse_options(&fields)?;
    let prune_enabled = check_prune(
        &options,
        header_str(&headers, CONFIRM_HEADER),
        import.allow_prune,
    )?;

    if let Some(job) = ImportJobRepo::find_by_idempotency_key(
        &state.pool,
        user.user_id,
        &idempotency_key,
        import.idempotency_window_hours,
    )
    .await?
    {
        tracing::info!(job_id = %job.id, user_id = user.user_id, "Duplicate submission; returning existing job");
        return Ok((
            StatusCode::OK,
            Json(DataResponse {
                data: SubmitResponse::new(job, false),
            }),
        ));
    }

    ensure_profile_visible(&state.pool, &options, user.user_id).await?;

    // Cheap early refusal; the authoritative check runs under the owner lock
    // in `create_idempotent`.
    let policy = import.admission_policy();
    let active = ImportJobRepo::count_active(&state.pool, user.user_id).await?;
    policy.admit(active)?;

    let job_id = JobId::new_v4();
    let source = match (file, options.source_job_id) {
        (Some(file), _) => {
            let summary = SheetSource::open(&file.filename, &file.bytes)?
                .inspect(&import.source_limits())?;
            tracing::debug!(
                filename = %file.filename,
                rows = summary.rows,
                columns = summary.headers.len(),
                "Upload accepted",
            );
            let stored = state
                .storage
                .put_source(job_id, &file.filename, file.bytes)
                .await
                .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;
            SourceRef {
                filename: file.filename,
                key: stored.key,
                url: stored.url,
                uploaded: true,
            }
        }
        (None, Some(source_job_id)) => {
            let earlier = ImportJobRepo::find_for_owner(&state.pool, source_job_id, user.user_id)
                .await?
                .ok_or_else(|| AppError::Core(CoreError::not_found("ImportJob", source_job_id)))?;
            SourceRef {
                filename: earlier.source_filename,
                key: earlier.source_file_key,
                url: earlier.source_file_url,
                uploaded: false,
            }
        }
        (None, None) => {
            return Err(SubmissionError::invalid(
                "file",
                "a file upload or source_job_id is required",
            )
            .into());
        }
    };
    let uploaded_key = source.uploaded.then(|| source.key.clone());

    let trace_id = header_str(&headers, "x-request-id")
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let profile_id = options.mapping_profile_id.clone();

    let outcome = ImportJobRepo::create_idempotent(
        &state.pool,
        &NewImportJob {
            id: job_id,
            owner_id: user.user_id,
            trace_id,
            idempotency_key,
            options,
            prune_enabled,
            source_filename: source.filename,
            source_file_key: source.key,
            source_file_url: source.url,
            submitted_role: user.role.clone(),
        },
        SubmitLimits {
            window_hours: import.idempotency_window_hours,
            max_active: policy.max_concurrent_per_user,
        },
    )
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            discard_upload(&state, uploaded_key.as_deref()).await;
            return Err(e.into());
        }
    };

    let existing = match outcome {
        CreateOutcome::Created(job) => {
            tracing::info!(
                job_id = %job.id,
                trace_id = %job.trace_id,
                user_id = user.user_id,
                mode = %job.mode,
                prune_enabled,
                "Import job submitted",
            );
            state.engine.spawn(job.clone());
            return Ok((
                StatusCode::ACCEPTED,
                Json(DataResponse {
                    data: SubmitResponse::new(job, true),
                }),
            ));
        }
        CreateOutcome::Existing(job) => job,
        CreateOutcome::AtCapacity { active } => {
            discard_upload(&state, uploaded_key.as_deref()).await;
            return Err(SubmissionError::ConcurrencyLimit {
                active,
                limit: policy.max_concurrent_per_user,
                retry_after_secs: policy.retry_after_secs,
            }
            .into());
        }
        CreateOutcome::ProfileMissing => {
            discard_upload(&state, uploaded_key.as_deref()).await;
            return Err(AppError::Core(CoreError::not_found(
                "MappingProfile",
                profile_id.unwrap_or_default(),
            )));
        }
    };

    // Lost a race with a submission carrying the same key.
    discard_upload(&state, uploaded_key.as_deref()).await;
    tracing::info!(job_id = %existing.id, user_id = user.user_id, "Duplicate submission; returning existing job");
    Ok((
        StatusCode::OK,
        Json(DataResponse {
            data: SubmitResponse::new(existing, false),
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Query parameters for `GET /imports`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Status name, e.g. `processing`.
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/imports
///
/// The caller's jobs, newest first.
pub async fn list_imports(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let status_id = match params.status.as_deref() {
        Some(name) => Some(
            JobStatus::parse(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown status '{name}'")))?
                .id(),
        ),
        None => None,
    };
    let query = JobListQuery {
        status_id,
        limit: params.limit,
        offset: params.offset,
    };

    let jobs: Vec<JobSummaryView> = ImportJobRepo::list_by_owner(&state.pool, user.user_id, &query)
        .await?
        .into_iter()
        .map(JobSummaryView::from)
        .collect();

    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/imports/{job_id}
pub async fn get_import(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_owned(&state.pool, job_id, &user).await?;
    let artifacts = artifact_urls(&state.pool, job_id).await?;
    Ok(Json(DataResponse {
        data: JobView::new(job, artifacts, chrono::Utc::now()),
    }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/imports/{job_id}/cancel
///
/// Marks the job canceled and signals its task, which stops at the next
/// row boundary. Canceling a finished job is a 409.
pub async fn cancel_import(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_owned(&state.pool, job_id, &user).await?;
    if job.is_terminal() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job is already {}",
            status_name(&job)
        ))));
    }

    if !ImportJobRepo::cancel(&state.pool, job_id, user.user_id).await? {
        return Err(AppError::Core(CoreError::Conflict(
            "Job finished before it could be canceled".into(),
        )));
    }
    let signalled = state.engine.cancel(&job_id);
    tracing::info!(job_id = %job_id, user_id = user.user_id, signalled, "Import job canceled");

    let job = find_owned(&state.pool, job_id, &user).await?;
    let artifacts = artifact_urls(&state.pool, job_id).await?;
    Ok(Json(DataResponse {
        data: JobView::new(job, artifacts, chrono::Utc::now()),
    }))
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// GET /api/v1/imports/{job_id}/artifacts
pub async fn list_artifacts(
    RequireImporter(user): RequireImporter,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    find_owned(&state.pool, job_id, &user).await?;
    let artifacts: Vec<ArtifactView> = ImportArtifactRepo::list_for_job(&state.pool, job_id)
        .await?
        .into_iter()
        .map(|a| ArtifactView {
            kind: a.kind,
            url: a.url,
            created_at: a.created_at,
        })
        .collect();
    Ok(Json(DataResponse { data: artifacts }))
}
