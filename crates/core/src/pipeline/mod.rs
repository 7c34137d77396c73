//! The import pipeline: one job's run from source bytes to artifacts.
//!
//! A job moves through explicit stages driven by a single loop:
//!
//! ```text
//! Resolve -> Rows -> [Prune] -> Finalize
//! ```
//!
//! `Resolve` decodes the header row and resolves the column mapping once.
//! `Rows` streams records through the validator and stages or applies each
//! one, checking for cancellation before every row. `Prune` runs only when
//! the safety gate enabled it. `Finalize` writes artifacts; a failed
//! artifact write becomes a job warning.
//!
//! Status transitions into and out of the pipeline (claiming the job,
//! persisting the terminal status) belong to the caller.

mod apply;
mod throttle;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{
    self, ArtifactKind, ErrorRow, PruneCandidate, ResultRow, RowAnnotation, RowOutcome,
};
use crate::import_job::{
    ImportMode, ImportOptions, JobCounters, JobFailure, FAILURE_CATALOG_UNAVAILABLE,
    FAILURE_INTERNAL, FAILURE_MAPPING, FAILURE_SOURCE_UNREADABLE,
};
use crate::mapping::{resolve_mapping, HeaderMapping, MappingDirective, ProfileSource};
use crate::ports::{CatalogError, CatalogWriter, ObjectStorage, ProgressReporter, StoredObject};
use crate::product_row::ProductRow;
use crate::progress::{
    rows_percent, ProgressMark, ProgressStats, FINALIZING_PERCENT, PARSING_PERCENT,
    ROWS_START_PERCENT,
};
use crate::source::{SheetSource, SourceError, SourceRecord};
use crate::types::{DbId, JobId};
use crate::validation::{validate_row, ValidationContext, ValidationIssue};

pub use apply::{apply_row, PruneScope, RowWrite};
pub use throttle::WriteThrottle;

/// Tunables shared by every job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub default_currency: String,
    /// Catalog writes per second; `0` disables throttling.
    pub rows_per_second: u32,
    pub write_batch_size: usize,
    /// Persist counters at least this often even when the percentage has
    /// not moved.
    pub progress_every_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_currency: "usd".to_string(),
            rows_per_second: 0,
            write_batch_size: 25,
            progress_every_rows: 25,
        }
    }
}

/// One job's input.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub job_id: JobId,
    pub owner_id: DbId,
    pub options: ImportOptions,
    /// Whether the safety gate enabled pruning for this job.
    pub prune_enabled: bool,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Final figures of a run.
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub counters: JobCounters,
    pub warnings: Vec<String>,
    pub artifacts: BTreeMap<ArtifactKind, StoredObject>,
    pub prune_candidates: usize,
    pub pruned: usize,
    pub stats: Option<ProgressStats>,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed(JobSummary),
    Canceled(JobSummary),
}

/// Stages of the control loop.
enum Stage {
    Resolve,
    Rows(HeaderMapping),
    Prune,
    Finalize,
}

/// How the row stage ended.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Canceled,
}

/// Runs import jobs against the catalog, storage and profile ports.
#[derive(Clone)]
pub struct ImportPipeline {
    catalog: Arc<dyn CatalogWriter>,
    storage: Arc<dyn ObjectStorage>,
    profiles: Arc<dyn ProfileSource>,
    config: PipelineConfig,
}

impl ImportPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogWriter>,
        storage: Arc<dyn ObjectStorage>,
        profiles: Arc<dyn ProfileSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            storage,
            profiles,
            config,
        }
    }

    /// Run one job to completion or cancellation.
    ///
    /// Dependency failures come back as a structured [`JobFailure`]; row
    /// problems never do.
    pub async fn run(
        &self,
        request: &ImportRequest,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, JobFailure> {
        let source = SheetSource::open(&request.filename, &request.bytes).map_err(source_failure)?;
        let mut run = RunState::new();
        let mut stage = Stage::Resolve;

        loop {
            stage = match stage {
                Stage::Resolve => {
                    let mapping = self.resolve(request, &source, reporter, &mut run).await?;
                    Stage::Rows(mapping)
                }
                Stage::Rows(mapping) => {
                    let flow = self
                        .process_rows(request, &source, &mapping, reporter, cancel, &mut run)
                        .await?;
                    if flow == Flow::Canceled {
                        tracing::info!(
                            job_id = %request.job_id,
                            rows_processed = run.counters.rows_processed,
                            "Import canceled at row boundary",
                        );
                        return Ok(PipelineOutcome::Canceled(run.into_summary()));
                    }
                    if request.prune_enabled {
                        Stage::Prune
                    } else {
                        Stage::Finalize
                    }
                }
                Stage::Prune => {
                    if self.prune(request, cancel, &mut run).await? == Flow::Canceled {
                        return Ok(PipelineOutcome::Canceled(run.into_summary()));
                    }
                    Stage::Finalize
                }
                Stage::Finalize => {
                    self.finalize(request, &source, reporter, &mut run).await?;
                    tracing::info!(
                        job_id = %request.job_id,
                        rows_total = run.counters.rows_total,
                        rows_valid = run.counters.rows_valid,
                        rows_invalid = run.counters.rows_invalid,
                        created = run.counters.created,
                        updated = run.counters.updated,
                        warnings = run.warnings.len(),
                        "Import pipeline finished",
                    );
                    return Ok(PipelineOutcome::Completed(run.into_summary()));
                }
            };
        }
    }

    async fn report(
        &self,
        reporter: &dyn ProgressReporter,
        run: &RunState,
    ) -> Result<(), JobFailure> {
        reporter
            .progress(&run.mark, &run.counters)
            .await
            .map_err(|e| JobFailure::new(FAILURE_INTERNAL, format!("failed to persist progress: {e}")))
    }

    // -- Resolve ------------------------------------------------------------

    async fn resolve(
        &self,
        request: &ImportRequest,
        source: &SheetSource<'_>,
        reporter: &dyn ProgressReporter,
        run: &mut RunState,
    ) -> Result<HeaderMapping, JobFailure> {
        run.mark.advance(PARSING_PERCENT);
        self.report(reporter, run).await?;

        run.headers = source.headers().map_err(source_failure)?;
        let rows_total = source.count_rows().map_err(source_failure)?;
        run.counters.rows_total = rows_total as i64;

        let directive = MappingDirective::from_parts(
            request.options.column_mapping.clone(),
            request.options.mapping_profile_id.clone(),
        );
        let mapping = resolve_mapping(
            &run.headers,
            &directive,
            request.owner_id,
            self.profiles.as_ref(),
        )
        .await
        .map_err(|e| {
            JobFailure::new(FAILURE_MAPPING, e.to_string()).with_details(json!({
                "mapping_profile_id": request.options.mapping_profile_id,
            }))
        })?;

        reporter
            .processing_started(run.counters.rows_total, &mapping.to_column_mapping(&run.headers))
            .await
            .map_err(|e| JobFailure::new(FAILURE_INTERNAL, e.to_string()))?;

        run.mark.advance(ROWS_START_PERCENT);
        self.report(reporter, run).await?;

        tracing::debug!(
            job_id = %request.job_id,
            rows_total,
            columns = run.headers.len(),
            "Column mapping resolved",
        );
        Ok(mapping)
    }

    // -- Rows ---------------------------------------------------------------

    async fn process_rows(
        &self,
        request: &ImportRequest,
        source: &SheetSource<'_>,
        mapping: &HeaderMapping,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
        run: &mut RunState,
    ) -> Result<Flow, JobFailure> {
        let options = &request.options;
        let ctx = ValidationContext {
            default_currency: self.config.default_currency.clone(),
            skip_image_validation: options.skip_image_validation,
        };
        let mut throttle = match options.mode {
            ImportMode::Execute => {
                WriteThrottle::new(self.config.rows_per_second, self.config.write_batch_size)
            }
            ImportMode::DryRun => WriteThrottle::unthrottled(),
        };
        let mut since_report = 0usize;

        for record in source.records() {
            if cancel.is_cancelled() {
                self.report(reporter, run).await?;
                return Ok(Flow::Canceled);
            }
            let record = record.map_err(source_failure)?;
            let line = record.line;
            let raw = mapping.apply(line, record.cells.iter().map(String::as_str));

            if raw.is_blank() {
                run.skip(line);
            } else {
                match validate_row(&raw, &ctx) {
                    Err(issues) => run.reject(line, &record, issues),
                    Ok(valid) => {
                        let warnings: Vec<String> =
                            valid.warnings.iter().map(|w| w.message.clone()).collect();
                        run.issues.extend(valid.warnings);
                        match apply_row(self.catalog.as_ref(), &valid.product, options).await {
                            Ok(write) => run.accept(line, &valid.product, write, warnings),
                            Err(CatalogError::Rejected(message)) => {
                                tracing::debug!(job_id = %request.job_id, row = line, %message, "Catalog rejected row");
                                run.catalog_reject(line, &record, message);
                            }
                            Err(CatalogError::Unavailable(message)) => {
                                return Err(JobFailure::new(FAILURE_CATALOG_UNAVAILABLE, message)
                                    .with_details(json!({ "row": line })));
                            }
                        }
                        if options.mode == ImportMode::Execute {
                            throttle.after_write(cancel).await;
                        }
                    }
                }
            }

            run.counters.rows_processed += 1;
            run.counters.rows_total = run.counters.rows_total.max(run.counters.rows_processed);
            since_report += 1;
            let advanced = run.mark.advance(rows_percent(
                run.counters.rows_processed,
                run.counters.rows_total,
            ));
            if advanced || since_report >= self.config.progress_every_rows {
                self.report(reporter, run).await?;
                since_report = 0;
            }
        }

        self.report(reporter, run).await?;
        Ok(Flow::Continue)
    }

    // -- Prune --------------------------------------------------------------

    async fn prune(
        &self,
        request: &ImportRequest,
        cancel: &CancellationToken,
        run: &mut RunState,
    ) -> Result<Flow, JobFailure> {
        let candidates = run
            .prune_scope
            .candidates(self.catalog.as_ref())
            .await
            .map_err(catalog_failure)?;

        if request.options.mode == ImportMode::Execute && !candidates.is_empty() {
            if cancel.is_cancelled() {
                return Ok(Flow::Canceled);
            }
            apply::prune(self.catalog.as_ref(), &candidates)
                .await
                .map_err(catalog_failure)?;
            run.pruned = candidates.len();
            tracing::info!(
                job_id = %request.job_id,
                variants = candidates.len(),
                "Pruned variants missing from import",
            );
        }
        run.prune_candidates = Some(candidates);
        Ok(Flow::Continue)
    }

    // -- Finalize -----------------------------------------------------------

    async fn finalize(
        &self,
        request: &ImportRequest,
        source: &SheetSource<'_>,
        reporter: &dyn ProgressReporter,
        run: &mut RunState,
    ) -> Result<(), JobFailure> {
        run.mark.advance(FINALIZING_PERCENT);
        self.report(reporter, run).await?;

        let mut rendered = vec![
            (
                ArtifactKind::ValidationReport,
                artifacts::render_validation_report(&run.counters, &run.issues),
            ),
            (
                ArtifactKind::AnnotatedXlsx,
                artifacts::render_annotated_source(source, &run.annotations),
            ),
        ];
        if !run.error_rows.is_empty() {
            rendered.push((
                ArtifactKind::ErrorRows,
                artifacts::render_error_rows(&run.headers, &run.error_rows),
            ));
        }
        if !run.results.is_empty() {
            rendered.push((ArtifactKind::ResultRows, artifacts::render_result_rows(&run.results)));
        }
        if let Some(candidates) = &run.prune_candidates {
            rendered.push((
                ArtifactKind::PrunePreview,
                artifacts::render_prune_preview(
                    request.options.mode,
                    request.options.mode == ImportMode::Execute,
                    candidates,
                ),
            ));
        }

        for (kind, bytes) in rendered {
            match self.write_artifact(request.job_id, kind, bytes, reporter).await {
                Ok(object) => {
                    run.artifacts.insert(kind, object);
                }
                Err(message) => {
                    tracing::warn!(job_id = %request.job_id, artifact = kind.as_str(), %message, "Artifact not written");
                    run.warnings.push(message);
                }
            }
        }
        Ok(())
    }

    async fn write_artifact(
        &self,
        job_id: JobId,
        kind: ArtifactKind,
        bytes: Result<Vec<u8>, crate::error::CoreError>,
        reporter: &dyn ProgressReporter,
    ) -> Result<StoredObject, String> {
        let bytes = bytes.map_err(|e| format!("failed to render {} artifact: {e}", kind.as_str()))?;
        let object = self
            .storage
            .put_artifact(job_id, kind.file_name(), bytes)
            .await
            .map_err(|e| format!("failed to store {} artifact: {e}", kind.as_str()))?;
        reporter
            .artifact_written(kind, &object)
            .await
            .map_err(|e| format!("failed to record {} artifact: {e}", kind.as_str()))?;
        Ok(object)
    }
}

fn source_failure(err: SourceError) -> JobFailure {
    JobFailure::new(FAILURE_SOURCE_UNREADABLE, err.to_string())
}

fn catalog_failure(err: CatalogError) -> JobFailure {
    JobFailure::new(FAILURE_CATALOG_UNAVAILABLE, err.to_string())
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Everything a run accumulates.
struct RunState {
    started: Instant,
    mark: ProgressMark,
    counters: JobCounters,
    headers: Vec<String>,
    issues: Vec<ValidationIssue>,
    error_rows: Vec<ErrorRow>,
    results: Vec<ResultRow>,
    annotations: BTreeMap<usize, RowAnnotation>,
    prune_scope: PruneScope,
    prune_candidates: Option<Vec<PruneCandidate>>,
    pruned: usize,
    warnings: Vec<String>,
    artifacts: BTreeMap<ArtifactKind, StoredObject>,
}

impl RunState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            mark: ProgressMark::default(),
            counters: JobCounters::default(),
            headers: Vec::new(),
            issues: Vec::new(),
            error_rows: Vec::new(),
            results: Vec::new(),
            annotations: BTreeMap::new(),
            prune_scope: PruneScope::default(),
            prune_candidates: None,
            pruned: 0,
            warnings: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    fn annotate(&mut self, line: usize, outcome: RowOutcome, messages: Vec<String>) {
        self.annotations
            .insert(line, RowAnnotation { outcome, messages });
    }

    fn skip(&mut self, line: usize) {
        self.counters.rows_skipped += 1;
        self.annotate(line, RowOutcome::Skipped, Vec::new());
    }

    fn reject(&mut self, line: usize, record: &SourceRecord, issues: Vec<ValidationIssue>) {
        self.counters.rows_invalid += 1;
        let messages: Vec<String> = issues.iter().map(|i| i.message.clone()).collect();
        self.error_rows.push(ErrorRow {
            line,
            cells: record.cells.clone(),
            messages: messages.clone(),
        });
        self.issues.extend(issues);
        self.annotate(line, RowOutcome::Invalid, messages);
    }

    fn catalog_reject(&mut self, line: usize, record: &SourceRecord, message: String) {
        self.counters.rows_valid += 1;
        self.counters.failed += 1;
        self.issues
            .push(ValidationIssue::error(line, None, message.clone()));
        self.error_rows.push(ErrorRow {
            line,
            cells: record.cells.clone(),
            messages: vec![message.clone()],
        });
        self.annotate(line, RowOutcome::Failed, vec![message]);
    }

    fn accept(&mut self, line: usize, row: &ProductRow, write: RowWrite, warnings: Vec<String>) {
        self.counters.rows_valid += 1;
        match write.outcome {
            RowOutcome::Created | RowOutcome::WouldCreate => self.counters.created += 1,
            RowOutcome::Updated | RowOutcome::WouldUpdate => {
                self.counters.updated += 1;
                if let Some(found) = &write.catalog_ref {
                    self.prune_scope
                        .record(&found.product_id, row.variant.sku.as_deref());
                }
            }
            _ => {}
        }
        self.results.push(ResultRow {
            line,
            outcome: write.outcome,
            title: row.title.clone(),
            handle: row.handle.clone(),
            sku: row.variant.sku.clone(),
            product_id: write.catalog_ref.as_ref().map(|r| r.product_id.clone()),
            variant_id: write.catalog_ref.and_then(|r| r.variant_id),
        });
        self.annotate(line, write.outcome, warnings);
    }

    fn into_summary(self) -> JobSummary {
        let stats = ProgressStats::compute(&self.counters, self.started.elapsed());
        JobSummary {
            counters: self.counters,
            warnings: self.warnings,
            artifacts: self.artifacts,
            prune_candidates: self.prune_candidates.as_ref().map_or(0, Vec::len),
            pruned: self.pruned,
            stats: Some(stats),
        }
    }
}
