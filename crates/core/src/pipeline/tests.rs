use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use async_trait::async_trait;

use super::*;
use crate::error::CoreError;
use crate::import_job::{JobPhase, UpsertStrategy};
use crate::mapping::{ColumnMapping, ProfileMapping};
use crate::ports::{CatalogRef, CatalogVariant, LookupKey, StorageError, WriteOptions};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeCatalog {
    calls: Mutex<Vec<String>>,
    existing: HashMap<String, CatalogRef>,
    variants: HashMap<String, Vec<CatalogVariant>>,
    reject_titles: Vec<String>,
    unavailable: bool,
    cancel_after_create: Option<CancellationToken>,
}

impl FakeCatalog {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn mutating_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("create") || c.starts_with("update") || c.starts_with("delete"))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CatalogWriter for FakeCatalog {
    async fn find_product(&self, key: &LookupKey) -> Result<Option<CatalogRef>, CatalogError> {
        let value = match key {
            LookupKey::Handle(v) | LookupKey::Sku(v) | LookupKey::ExternalId(v) => v,
        };
        self.log(format!("find {value}"));
        Ok(self.existing.get(value).cloned())
    }

    async fn create_product(
        &self,
        row: &ProductRow,
        _options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError> {
        if self.unavailable {
            return Err(CatalogError::Unavailable("connection refused".into()));
        }
        if self.reject_titles.contains(&row.title) {
            return Err(CatalogError::Rejected(format!("duplicate title {}", row.title)));
        }
        self.log(format!("create {}", row.title));
        if let Some(token) = &self.cancel_after_create {
            token.cancel();
        }
        Ok(CatalogRef {
            product_id: format!("prod_{}", row.line),
            variant_id: Some(format!("var_{}", row.line)),
        })
    }

    async fn update_product(
        &self,
        existing: &CatalogRef,
        row: &ProductRow,
        _options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError> {
        self.log(format!("update {} {}", existing.product_id, row.title));
        Ok(existing.clone())
    }

    async fn list_variants(&self, product_id: &str) -> Result<Vec<CatalogVariant>, CatalogError> {
        self.log(format!("list {product_id}"));
        Ok(self.variants.get(product_id).cloned().unwrap_or_default())
    }

    async fn delete_variants(
        &self,
        product_id: &str,
        variant_ids: &[String],
    ) -> Result<(), CatalogError> {
        self.log(format!("delete {product_id} {}", variant_ids.join(",")));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_artifacts: bool,
}

impl MemoryStorage {
    fn text(&self, key: &str) -> String {
        let objects = self.objects.lock().unwrap();
        String::from_utf8(objects.get(key).cloned().unwrap_or_default()).unwrap()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_source(
        &self,
        job_id: JobId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError> {
        let key = format!("{job_id}/source/{filename}");
        self.objects.lock().unwrap().insert(key.clone(), bytes);
        Ok(StoredObject {
            url: format!("mem://{key}"),
            key,
        })
    }

    async fn put_artifact(
        &self,
        job_id: JobId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError> {
        if self.fail_artifacts {
            return Err(StorageError::Unavailable("bucket offline".into()));
        }
        let key = format!("{job_id}/artifacts/{file_name}");
        self.objects.lock().unwrap().insert(key.clone(), bytes);
        Ok(StoredObject {
            url: format!("mem://{key}"),
            key,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct CountingProfiles {
    calls: Mutex<usize>,
}

#[async_trait]
impl ProfileSource for CountingProfiles {
    async fn visible_profile(
        &self,
        _id: &str,
        _owner_id: DbId,
    ) -> Result<Option<ProfileMapping>, CoreError> {
        *self.calls.lock().unwrap() += 1;
        Ok(None)
    }

    async fn default_profile(&self, _owner_id: DbId) -> Result<Option<ProfileMapping>, CoreError> {
        *self.calls.lock().unwrap() += 1;
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingReporter {
    started: Mutex<Option<(i64, ColumnMapping)>>,
    marks: Mutex<Vec<(i16, JobPhase, JobCounters)>>,
    artifacts: Mutex<Vec<ArtifactKind>>,
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn processing_started(
        &self,
        rows_total: i64,
        column_mapping: &ColumnMapping,
    ) -> Result<(), CoreError> {
        *self.started.lock().unwrap() = Some((rows_total, column_mapping.clone()));
        Ok(())
    }

    async fn progress(&self, mark: &ProgressMark, counters: &JobCounters) -> Result<(), CoreError> {
        self.marks
            .lock()
            .unwrap()
            .push((mark.percent(), mark.phase(), *counters));
        Ok(())
    }

    async fn artifact_written(
        &self,
        kind: ArtifactKind,
        _object: &StoredObject,
    ) -> Result<(), CoreError> {
        self.artifacts.lock().unwrap().push(kind);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    catalog: Arc<FakeCatalog>,
    storage: Arc<MemoryStorage>,
    profiles: Arc<CountingProfiles>,
    reporter: RecordingReporter,
}

impl Harness {
    fn new(catalog: FakeCatalog) -> Self {
        Self::with_storage(catalog, MemoryStorage::default())
    }

    fn with_storage(catalog: FakeCatalog, storage: MemoryStorage) -> Self {
        Self {
            catalog: Arc::new(catalog),
            storage: Arc::new(storage),
            profiles: Arc::new(CountingProfiles::default()),
            reporter: RecordingReporter::default(),
        }
    }

    fn pipeline(&self) -> ImportPipeline {
        ImportPipeline::new(
            self.catalog.clone(),
            self.storage.clone(),
            self.profiles.clone(),
            PipelineConfig {
                progress_every_rows: 1,
                ..PipelineConfig::default()
            },
        )
    }

    async fn run(&self, request: &ImportRequest) -> Result<PipelineOutcome, JobFailure> {
        self.pipeline()
            .run(request, &self.reporter, &CancellationToken::new())
            .await
    }

    fn artifact_text(&self, summary: &JobSummary, kind: ArtifactKind) -> String {
        let object = summary
            .artifacts
            .get(&kind)
            .unwrap_or_else(|| panic!("missing artifact {}", kind.as_str()));
        self.storage.text(&object.key)
    }
}

fn request(csv: &str, options: ImportOptions) -> ImportRequest {
    ImportRequest {
        job_id: uuid::Uuid::new_v4(),
        owner_id: 42,
        options,
        prune_enabled: false,
        filename: "products.csv".into(),
        bytes: csv.as_bytes().to_vec(),
    }
}

fn execute() -> ImportOptions {
    ImportOptions {
        mode: ImportMode::Execute,
        ..Default::default()
    }
}

fn completed(outcome: PipelineOutcome) -> JobSummary {
    match outcome {
        PipelineOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    }
}

const THREE_ROWS: &str = "\
title,min_increment,min_cut,variant_sku
Belgian Linen,0.25,1,BL-1
Canvas,0.3,1,CV-1
,0.5,1,XX-1
";

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_row_file_executes_one_write() {
    let harness = Harness::new(FakeCatalog::default());
    let summary = completed(harness.run(&request(THREE_ROWS, execute())).await.unwrap());

    assert_eq!(summary.counters.rows_total, 3);
    assert_eq!(summary.counters.rows_processed, 3);
    assert_eq!(summary.counters.rows_valid, 1);
    assert_eq!(summary.counters.rows_invalid, 2);
    assert_eq!(summary.counters.created, 1);
    assert_eq!(harness.catalog.mutating_calls(), 1);
    assert_eq!(harness.catalog.calls(), vec!["create Belgian Linen".to_string()]);

    let error_rows = harness.artifact_text(&summary, ArtifactKind::ErrorRows);
    let lines: Vec<&str> = error_rows.lines().collect();
    assert_eq!(lines.len(), 3, "{error_rows}");
    assert!(lines[1].starts_with("3,Canvas"));
    assert!(lines[1].contains("min_cut"));
    assert!(lines[2].starts_with("4,"));
    assert!(lines[2].contains("title is required"));
    assert_ne!(lines[1].rsplit(',').next(), lines[2].rsplit(',').next());

    let result_rows = harness.artifact_text(&summary, ArtifactKind::ResultRows);
    assert!(result_rows.contains("2,created,Belgian Linen,,BL-1,prod_2,var_2"));
}

#[tokio::test]
async fn dry_run_never_mutates_but_still_previews_prune() {
    let mut catalog = FakeCatalog::default();
    catalog.existing.insert(
        "BL-1".into(),
        CatalogRef {
            product_id: "prod_linen".into(),
            variant_id: Some("var_bl1".into()),
        },
    );
    catalog.variants.insert(
        "prod_linen".into(),
        vec![
            CatalogVariant {
                id: "var_bl1".into(),
                sku: Some("BL-1".into()),
                title: None,
            },
            CatalogVariant {
                id: "var_old".into(),
                sku: Some("BL-OLD".into()),
                title: Some("Discontinued".into()),
            },
        ],
    );
    let harness = Harness::new(catalog);

    let mut req = request(
        THREE_ROWS,
        ImportOptions {
            mode: ImportMode::DryRun,
            upsert: UpsertStrategy::Sku,
            force_prune_missing_variants: true,
            prune_confirm_token: Some("PRUNE_VARIANTS".into()),
            ..Default::default()
        },
    );
    req.prune_enabled = true;

    let summary = completed(harness.run(&req).await.unwrap());
    assert_eq!(harness.catalog.mutating_calls(), 0);
    assert_eq!(summary.counters.updated, 1);
    assert_eq!(summary.prune_candidates, 1);
    assert_eq!(summary.pruned, 0);

    let preview: serde_json::Value = serde_json::from_str(
        &harness.artifact_text(&summary, ArtifactKind::PrunePreview),
    )
    .unwrap();
    assert_eq!(preview["applied"], false);
    assert_eq!(preview["variants"][0]["id"], "var_old");
    assert!(summary.artifacts.contains_key(&ArtifactKind::ValidationReport));
}

#[tokio::test]
async fn execute_prunes_stale_variants() {
    let mut catalog = FakeCatalog::default();
    catalog.existing.insert(
        "BL-1".into(),
        CatalogRef {
            product_id: "prod_linen".into(),
            variant_id: None,
        },
    );
    catalog.variants.insert(
        "prod_linen".into(),
        vec![
            CatalogVariant {
                id: "var_bl1".into(),
                sku: Some("BL-1".into()),
                title: None,
            },
            CatalogVariant {
                id: "var_old".into(),
                sku: Some("BL-OLD".into()),
                title: None,
            },
        ],
    );
    let harness = Harness::new(catalog);
    let mut req = request(
        THREE_ROWS,
        ImportOptions {
            upsert: UpsertStrategy::Sku,
            force_prune_missing_variants: true,
            ..execute()
        },
    );
    req.prune_enabled = true;

    let summary = completed(harness.run(&req).await.unwrap());
    assert_eq!(summary.pruned, 1);
    assert!(harness
        .catalog
        .calls()
        .contains(&"delete prod_linen var_old".to_string()));
}

#[tokio::test]
async fn upsert_updates_existing_and_creates_missing() {
    let mut catalog = FakeCatalog::default();
    catalog.existing.insert(
        "linen".into(),
        CatalogRef {
            product_id: "prod_linen".into(),
            variant_id: None,
        },
    );
    let harness = Harness::new(catalog);
    let csv = "title,handle\nLinen,linen\nWool,wool\n";
    let summary = completed(
        harness
            .run(&request(
                csv,
                ImportOptions {
                    upsert: UpsertStrategy::Handle,
                    ..execute()
                },
            ))
            .await
            .unwrap(),
    );
    assert_eq!(summary.counters.updated, 1);
    assert_eq!(summary.counters.created, 1);
    assert_eq!(
        harness.catalog.calls(),
        vec![
            "find linen".to_string(),
            "update prod_linen Linen".to_string(),
            "find wool".to_string(),
            "create Wool".to_string(),
        ]
    );
}

#[tokio::test]
async fn builtin_profile_maps_price_per_yard_without_user_lookup() {
    let harness = Harness::new(FakeCatalog::default());
    let csv = "Product Name,Price per Yard\nBelgian Linen,\"1,234.50\"\n";
    let summary = completed(
        harness
            .run(&request(
                csv,
                ImportOptions {
                    mapping_profile_id: Some("builtin-fabric".into()),
                    ..Default::default()
                },
            ))
            .await
            .unwrap(),
    );
    assert_eq!(summary.counters.rows_valid, 1);
    assert_eq!(*harness.profiles.calls.lock().unwrap(), 0);

    let started = harness.reporter.started.lock().unwrap().clone().unwrap();
    assert_eq!(started.0, 1);
    assert_eq!(started.1["Price per Yard"], "retail_price");
}

#[tokio::test]
async fn unknown_profile_fails_the_job_before_rows() {
    let harness = Harness::new(FakeCatalog::default());
    let failure = harness
        .run(&request(
            THREE_ROWS,
            ImportOptions {
                mapping_profile_id: Some("0192f0aa-missing".into()),
                ..execute()
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(failure.code, FAILURE_MAPPING);
    assert!(harness.catalog.calls().is_empty());
    assert!(harness.reporter.started.lock().unwrap().is_none());
}

#[tokio::test]
async fn cancellation_takes_effect_at_next_row() {
    let cancel = CancellationToken::new();
    let catalog = FakeCatalog {
        cancel_after_create: Some(cancel.clone()),
        ..Default::default()
    };
    let harness = Harness::new(catalog);
    let csv = "title\nA\nB\nC\n";
    let outcome = harness
        .pipeline()
        .run(&request(csv, execute()), &harness.reporter, &cancel)
        .await
        .unwrap();

    let summary = match outcome {
        PipelineOutcome::Canceled(summary) => summary,
        other => panic!("expected cancellation, got {other:?}"),
    };
    assert_eq!(summary.counters.rows_processed, 1);
    assert_eq!(harness.catalog.calls(), vec!["create A".to_string()]);
    assert!(summary.artifacts.is_empty());
}

#[tokio::test]
async fn catalog_rejection_is_row_scoped() {
    let catalog = FakeCatalog {
        reject_titles: vec!["Wool".into()],
        ..Default::default()
    };
    let harness = Harness::new(catalog);
    let summary = completed(
        harness
            .run(&request("title\nLinen\nWool\nSilk\n", execute()))
            .await
            .unwrap(),
    );
    assert_eq!(summary.counters.created, 2);
    assert_eq!(summary.counters.failed, 1);
    let errors = harness.artifact_text(&summary, ArtifactKind::ErrorRows);
    assert!(errors.contains("duplicate title Wool"));
}

#[tokio::test]
async fn catalog_outage_fails_the_job() {
    let catalog = FakeCatalog {
        unavailable: true,
        ..Default::default()
    };
    let harness = Harness::new(catalog);
    let failure = harness
        .run(&request("title\nLinen\n", execute()))
        .await
        .unwrap_err();
    assert_eq!(failure.code, FAILURE_CATALOG_UNAVAILABLE);
    assert_eq!(failure.details.unwrap()["row"], 2);
}

#[tokio::test]
async fn artifact_write_failure_becomes_warning() {
    let storage = MemoryStorage {
        fail_artifacts: true,
        ..Default::default()
    };
    let harness = Harness::with_storage(FakeCatalog::default(), storage);
    let summary = completed(harness.run(&request(THREE_ROWS, execute())).await.unwrap());
    assert!(summary.artifacts.is_empty());
    assert!(!summary.warnings.is_empty());
    assert!(summary.warnings.iter().all(|w| w.contains("bucket offline")));
    assert_eq!(summary.counters.created, 1);
}

#[tokio::test]
async fn blank_rows_are_skipped() {
    let harness = Harness::new(FakeCatalog::default());
    let summary = completed(
        harness
            .run(&request("title,sku\nLinen,L-1\n,\n  ,  \n", ImportOptions::default()))
            .await
            .unwrap(),
    );
    assert_eq!(summary.counters.rows_skipped, 2);
    assert_eq!(summary.counters.rows_valid, 1);
    assert_eq!(summary.counters.rows_invalid, 0);
}

#[tokio::test]
async fn progress_is_monotonic() {
    let harness = Harness::new(FakeCatalog::default());
    let csv: String = std::iter::once("title".to_string())
        .chain((0..40).map(|i| format!("Fabric {i}")))
        .collect::<Vec<_>>()
        .join("\n");
    completed(harness.run(&request(&csv, execute())).await.unwrap());

    let marks = harness.reporter.marks.lock().unwrap().clone();
    assert!(marks.len() > 3);
    for pair in marks.windows(2) {
        let (prev_pct, prev_phase, prev_counters) = pair[0];
        let (pct, phase, counters) = pair[1];
        assert!(pct >= prev_pct);
        assert!(phase >= prev_phase);
        assert!(counters.rows_processed >= prev_counters.rows_processed);
        assert!(counters.rows_processed <= counters.rows_total);
    }
    let (last_pct, last_phase, _) = *marks.last().unwrap();
    assert_eq!(last_pct, 90);
    assert_eq!(last_phase, JobPhase::Finalizing);
}

#[tokio::test]
async fn workbook_rows_run_like_csv_rows() {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (row, cells) in [
        ["title", "min_increment", "min_cut", "variant_sku"],
        ["Belgian Linen", "0.25", "1", "BL-1"],
        ["Canvas", "0.3", "1", "CV-1"],
    ]
    .iter()
    .enumerate()
    {
        for (col, cell) in cells.iter().enumerate() {
            sheet.write_string(row as u32, col as u16, *cell).unwrap();
        }
    }
    sheet.write_number(3, 0, 12.0).unwrap();

    let harness = Harness::new(FakeCatalog::default());
    let mut req = request("", execute());
    req.filename = "products.xlsx".into();
    req.bytes = workbook.save_to_buffer().unwrap();
    let summary = completed(harness.run(&req).await.unwrap());

    assert_eq!(summary.counters.rows_total, 3);
    assert_eq!(summary.counters.created, 2);
    assert_eq!(summary.counters.rows_invalid, 1);
    assert_eq!(
        harness.catalog.calls(),
        vec!["create Belgian Linen".to_string(), "create 12".to_string()]
    );

    let error_rows = harness.artifact_text(&summary, ArtifactKind::ErrorRows);
    assert!(error_rows.lines().nth(1).unwrap().starts_with("3,Canvas"));

    let annotated = &summary.artifacts[&ArtifactKind::AnnotatedXlsx];
    assert!(annotated.key.ends_with("annotated_source.xlsx"));
    let bytes = harness.storage.get(&annotated.key).await.unwrap();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn broken_workbook_is_unreadable() {
    let harness = Harness::new(FakeCatalog::default());
    let mut req = request("", execute());
    req.filename = "products.xlsx".into();
    assert_matches!(
        harness.run(&req).await,
        Err(JobFailure { code, .. }) if code == FAILURE_SOURCE_UNREADABLE
    );
}
