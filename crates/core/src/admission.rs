//! Submission admission: idempotency key, option parsing and the per-user
//! concurrency ceiling.
//!
//! Everything here runs before a job record exists. Rejections never create
//! a job.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::import_job::{ImageStrategy, ImportMode, ImportOptions, UpsertStrategy, VariantStrategy};
use crate::mapping::ColumnMapping;
use crate::validation::rules;

/// Maximum accepted length of an idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Named reasons a submission is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Idempotency-Key header is required")]
    MissingIdempotencyKey,

    #[error("Invalid option '{field}': {message}")]
    InvalidOptions { field: String, message: String },

    #[error("Too many active imports ({active} of {limit}); retry in {retry_after_secs}s")]
    ConcurrencyLimit {
        active: i64,
        limit: i64,
        retry_after_secs: u64,
    },

    #[error("Pruning missing variants is disabled by operator policy")]
    PruneDisabled,

    #[error(
        "Pruning requires header 'X-Confirm-Prune: yes' and prune_confirm_token = \"PRUNE_VARIANTS\"; missing: {}",
        .missing.join(", ")
    )]
    PruneConfirmationRequired { missing: Vec<String> },
}

impl SubmissionError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Per-user concurrency ceiling.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub max_concurrent_per_user: i64,
    pub retry_after_secs: u64,
}

impl AdmissionPolicy {
    /// Reject when the requester already has `active` jobs at or above the
    /// ceiling.
    pub fn admit(&self, active: i64) -> Result<(), SubmissionError> {
        if active >= self.max_concurrent_per_user {
            return Err(SubmissionError::ConcurrencyLimit {
                active,
                limit: self.max_concurrent_per_user,
                retry_after_secs: self.retry_after_secs,
            });
        }
        Ok(())
    }
}

/// The idempotency key is mandatory and must be a short, non-blank token.
pub fn require_idempotency_key(raw: Option<&str>) -> Result<String, SubmissionError> {
    let key = raw.map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(SubmissionError::MissingIdempotencyKey);
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(SubmissionError::invalid(
            "idempotency_key",
            format!("must be at most {MAX_IDEMPOTENCY_KEY_LEN} characters"),
        ));
    }
    Ok(key.to_string())
}

// ---------------------------------------------------------------------------
// Option parsing
// ---------------------------------------------------------------------------

/// Text form fields of a submission (multipart parts other than the file).
pub type SubmissionFields = BTreeMap<String, String>;

/// Parse the option fields of a submission.
///
/// Every rejection names the offending field.
pub fn parse_options(fields: &SubmissionFields) -> Result<ImportOptions, SubmissionError> {
    let text = |name: &str| {
        fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let mut options = ImportOptions::default();

    if let Some(v) = text("mode") {
        options.mode = enum_field("mode", v, ImportMode::parse, ImportMode::ALL)?;
    }
    if let Some(v) = text("upsert") {
        options.upsert = enum_field("upsert", v, UpsertStrategy::parse, UpsertStrategy::ALL)?;
    }
    if let Some(v) = text("variant_strategy") {
        options.variant_strategy =
            enum_field("variant_strategy", v, VariantStrategy::parse, VariantStrategy::ALL)?;
    }
    if let Some(v) = text("image_strategy") {
        options.image_strategy =
            enum_field("image_strategy", v, ImageStrategy::parse, ImageStrategy::ALL)?;
    }

    options.skip_image_validation = bool_field("skip_image_validation", text("skip_image_validation"))?;
    options.unarchive = bool_field("unarchive", text("unarchive"))?;
    options.force_prune_missing_variants = bool_field(
        "force_prune_missing_variants",
        text("force_prune_missing_variants"),
    )?;
    options.prune_confirm_token = text("prune_confirm_token").map(str::to_string);

    if let Some(raw) = text("column_mapping") {
        let mapping: ColumnMapping = serde_json::from_str(raw).map_err(|_| {
            SubmissionError::invalid(
                "column_mapping",
                "must be a JSON object of source column to field name",
            )
        })?;
        options.column_mapping = Some(mapping);
    }
    options.mapping_profile_id = text("mapping_profile_id").map(str::to_string);

    if let Some(raw) = text("source_job_id") {
        let id = uuid::Uuid::parse_str(raw)
            .map_err(|_| SubmissionError::invalid("source_job_id", "must be a UUID"))?;
        options.source_job_id = Some(id);
    }
    options.import_session_id = text("import_session_id").map(str::to_string);

    Ok(options)
}

fn enum_field<T>(
    field: &str,
    raw: &str,
    parse: fn(&str) -> Option<T>,
    allowed: &[&str],
) -> Result<T, SubmissionError> {
    parse(&raw.to_lowercase()).ok_or_else(|| {
        SubmissionError::invalid(field, format!("'{raw}' must be one of: {}", allowed.join(", ")))
    })
}

fn bool_field(field: &str, raw: Option<&str>) -> Result<bool, SubmissionError> {
    let Some(raw) = raw else {
        return Ok(false);
    };
    rules::boolean(&Value::String(raw.to_string()))
        .map(Option::unwrap_or_default)
        .map_err(|message| SubmissionError::invalid(field, message))
}
