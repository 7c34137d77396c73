//! Import job vocabulary: status state machine, phases, options and
//! counters.
//!
//! Status ids match the seeded rows of the `import_job_statuses` lookup
//! table.

use serde::{Deserialize, Serialize};

use crate::mapping::ColumnMapping;
use crate::types::{JobId, ProfileId};

/// Database status id (SMALLINT).
pub type StatusId = i16;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Coarse job status.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created = 1,
    Validating = 2,
    Processing = 3,
    Completed = 4,
    Failed = 5,
    Canceled = 6,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        Self::Created,
        Self::Validating,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Canceled,
    ];

    /// Statuses that hold an admission slot.
    pub const ACTIVE: [JobStatus; 3] = [Self::Created, Self::Validating, Self::Processing];

    /// Statuses a job never leaves.
    pub const TERMINAL: [JobStatus; 3] = [Self::Completed, Self::Failed, Self::Canceled];

    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Allowed edges: `created -> validating -> processing -> completed`,
    /// and `failed` or `canceled` from any non-terminal status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed | Canceled) => true,
            (Created, Validating) | (Validating, Processing) | (Processing, Completed) => true,
            _ => false,
        }
    }

    /// Status ids of [`Self::ACTIVE`], for `= ANY($n)` binds.
    pub fn active_ids() -> Vec<StatusId> {
        Self::ACTIVE.iter().map(|s| s.id()).collect()
    }

    /// Status ids of [`Self::TERMINAL`], for `= ANY($n)` binds.
    pub fn terminal_ids() -> Vec<StatusId> {
        Self::TERMINAL.iter().map(|s| s.id()).collect()
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Fine-grained progress label. Declaration order is progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Initializing,
    Parsing,
    Validating,
    Importing,
    Finalizing,
    Completed,
    Failed,
    Canceled,
}

impl JobPhase {
    pub const ALL: [JobPhase; 9] = [
        Self::Queued,
        Self::Initializing,
        Self::Parsing,
        Self::Validating,
        Self::Importing,
        Self::Finalizing,
        Self::Completed,
        Self::Failed,
        Self::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Importing => "importing",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }

    /// Position in the progression, for monotonic comparisons in SQL.
    pub fn rank(self) -> i16 {
        self as i16
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    #[default]
    DryRun,
    Execute,
}

impl ImportMode {
    pub const ALL: &'static [&'static str] = &["dry_run", "execute"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Execute => "execute",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dry_run" => Some(Self::DryRun),
            "execute" => Some(Self::Execute),
            _ => None,
        }
    }
}

/// Key used to find an existing catalog entity for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStrategy {
    /// Always create.
    #[default]
    Off,
    Handle,
    Sku,
    ExternalId,
}

impl UpsertStrategy {
    pub const ALL: &'static [&'static str] = &["off", "handle", "sku", "external_id"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Handle => "handle",
            Self::Sku => "sku",
            Self::ExternalId => "external_id",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(Self::Off),
            "handle" => Some(Self::Handle),
            "sku" => Some(Self::Sku),
            "external_id" => Some(Self::ExternalId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStrategy {
    #[default]
    Explicit,
    DefaultType,
}

impl VariantStrategy {
    pub const ALL: &'static [&'static str] = &["explicit", "default_type"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::DefaultType => "default_type",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "explicit" => Some(Self::Explicit),
            "default_type" => Some(Self::DefaultType),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStrategy {
    #[default]
    Merge,
    Replace,
    Append,
}

impl ImageStrategy {
    pub const ALL: &'static [&'static str] = &["merge", "replace", "append"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "merge" => Some(Self::Merge),
            "replace" => Some(Self::Replace),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

/// Everything a submission configures, persisted on the job as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub upsert: UpsertStrategy,
    pub variant_strategy: VariantStrategy,
    pub image_strategy: ImageStrategy,
    pub skip_image_validation: bool,
    pub unarchive: bool,
    pub force_prune_missing_variants: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_confirm_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_mapping: Option<ColumnMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_profile_id: Option<ProfileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_session_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Row and write counters, persisted together with status and phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub rows_total: i64,
    pub rows_processed: i64,
    pub rows_valid: i64,
    pub rows_invalid: i64,
    pub rows_skipped: i64,
    pub created: i64,
    pub updated: i64,
    pub failed: i64,
}

impl JobCounters {
    pub fn remaining(&self) -> i64 {
        (self.rows_total - self.rows_processed).max(0)
    }
}

// ---------------------------------------------------------------------------
// Failure payload
// ---------------------------------------------------------------------------

pub const FAILURE_SOURCE_UNREADABLE: &str = "SOURCE_UNREADABLE";
pub const FAILURE_ROW_LIMIT: &str = "ROW_LIMIT_EXCEEDED";
pub const FAILURE_MAPPING: &str = "MAPPING_FAILED";
pub const FAILURE_CATALOG_UNAVAILABLE: &str = "CATALOG_UNAVAILABLE";
pub const FAILURE_STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
pub const FAILURE_INTERNAL: &str = "INTERNAL_ERROR";

/// Structured cause stored on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl JobFailure {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
