//! Async seams between the import pipeline and the outside world.
//!
//! The pipeline only talks to the catalog, object storage and the job
//! record through these traits, so it can run against in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactKind;
use crate::error::CoreError;
use crate::import_job::{ImageStrategy, JobCounters, UpsertStrategy, VariantStrategy};
use crate::mapping::ColumnMapping;
use crate::product_row::ProductRow;
use crate::progress::ProgressMark;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Catalog write failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// The catalog refused this particular row; the batch continues.
    #[error("catalog rejected the row: {0}")]
    Rejected(String),

    /// The catalog cannot be reached or is failing; the job stops.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Key used to find an existing product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    Handle(String),
    Sku(String),
    ExternalId(String),
}

impl LookupKey {
    /// The key a row offers under `strategy`; `None` when the strategy is
    /// `off` or the row lacks that field.
    pub fn for_row(strategy: UpsertStrategy, row: &ProductRow) -> Option<Self> {
        match strategy {
            UpsertStrategy::Off => None,
            UpsertStrategy::Handle => row.handle.clone().map(Self::Handle),
            UpsertStrategy::Sku => row.variant.sku.clone().map(Self::Sku),
            UpsertStrategy::ExternalId => row.external_id.clone().map(Self::ExternalId),
        }
    }
}

/// Catalog identity of a written or matched product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRef {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
}

/// A variant as the catalog currently holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVariant {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Per-job write settings passed with every mutating call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub variant_strategy: VariantStrategy,
    pub image_strategy: ImageStrategy,
    pub unarchive: bool,
}

/// Catalog write service.
///
/// `find_product` and `list_variants` are reads; the other three mutate.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn find_product(&self, key: &LookupKey) -> Result<Option<CatalogRef>, CatalogError>;

    async fn create_product(
        &self,
        row: &ProductRow,
        options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError>;

    async fn update_product(
        &self,
        existing: &CatalogRef,
        row: &ProductRow,
        options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError>;

    async fn list_variants(&self, product_id: &str) -> Result<Vec<CatalogVariant>, CatalogError>;

    async fn delete_variants(
        &self,
        product_id: &str,
        variant_ids: &[String],
    ) -> Result<(), CatalogError>;
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A persisted object and where clients can fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Durable object storage for uploaded sources and generated artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an uploaded source file for `job_id`.
    async fn put_source(
        &self,
        job_id: JobId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError>;

    /// Store a generated artifact for `job_id`.
    async fn put_artifact(
        &self,
        job_id: JobId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// Where a running pipeline reports its state. Bound to one job.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Mapping resolved and rows counted; the job moves to `processing`.
    async fn processing_started(
        &self,
        rows_total: i64,
        column_mapping: &ColumnMapping,
    ) -> Result<(), CoreError>;

    /// Persist percentage, phase and counters together.
    async fn progress(&self, mark: &ProgressMark, counters: &JobCounters) -> Result<(), CoreError>;

    async fn artifact_written(
        &self,
        kind: ArtifactKind,
        object: &StoredObject,
    ) -> Result<(), CoreError>;
}
