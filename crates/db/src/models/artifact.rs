//! Generated artifact rows.

use serde::Serialize;
use sqlx::FromRow;
use swatch_core::artifacts::ArtifactKind;
use swatch_core::types::{DbId, JobId, Timestamp};

/// A row from the `import_job_artifacts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportArtifact {
    pub id: DbId,
    pub job_id: JobId,
    pub kind: String,
    pub storage_key: String,
    pub url: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ImportArtifact {
    pub fn artifact_kind(&self) -> Option<ArtifactKind> {
        ArtifactKind::parse(&self.kind)
    }
}
