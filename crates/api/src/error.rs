use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use swatch_core::admission::SubmissionError;
use swatch_core::error::CoreError;
use swatch_core::safety_gate::{CONFIRM_HEADER, CONFIRM_HEADER_VALUE, PRUNE_TOKEN};
use swatch_core::source::SourceError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`SubmissionError`] for refused
/// imports and adds HTTP-specific variants. Implements [`IntoResponse`] to
/// produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `swatch_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An import submission refused before any job was created.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// An uploaded file that cannot be imported.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut details = None;

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Submission rejections ---
            AppError::Submission(err) => {
                let (status, code) = match err {
                    SubmissionError::MissingIdempotencyKey => {
                        (StatusCode::BAD_REQUEST, "IDEMPOTENCY_KEY_REQUIRED")
                    }
                    SubmissionError::InvalidOptions { field, .. } => {
                        details = Some(json!({ "field": field }));
                        (StatusCode::BAD_REQUEST, "INVALID_OPTIONS")
                    }
                    SubmissionError::ConcurrencyLimit {
                        active,
                        limit,
                        retry_after_secs,
                    } => {
                        retry_after = Some(*retry_after_secs);
                        details = Some(json!({
                            "active": active,
                            "limit": limit,
                            "retry_after_secs": retry_after_secs,
                        }));
                        (StatusCode::TOO_MANY_REQUESTS, "CONCURRENCY_LIMIT")
                    }
                    SubmissionError::PruneDisabled => (StatusCode::FORBIDDEN, "PRUNE_DISABLED"),
                    SubmissionError::PruneConfirmationRequired { missing } => {
                        details = Some(prune_requirements(missing));
                        (StatusCode::BAD_REQUEST, "PRUNE_CONFIRMATION_REQUIRED")
                    }
                };
                (status, code, err.to_string())
            }

            // --- Unusable uploads ---
            AppError::Source(err) => {
                let (status, code) = match err {
                    SourceError::TooLarge { .. } => {
                        (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE")
                    }
                    SourceError::TooManyRows { .. } => {
                        (StatusCode::BAD_REQUEST, "ROW_LIMIT_EXCEEDED")
                    }
                    SourceError::Unsupported(_) => {
                        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FORMAT")
                    }
                    SourceError::Empty | SourceError::Malformed(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_FILE")
                    }
                };
                (status, code, err.to_string())
            }

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Both confirmations, verbatim, plus which ones were missing.
fn prune_requirements(missing: &[String]) -> Value {
    json!({
        "required": {
            "header": format!("{CONFIRM_HEADER}: {CONFIRM_HEADER_VALUE}"),
            "prune_confirm_token": PRUNE_TOKEN,
        },
        "missing": missing,
    })
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
