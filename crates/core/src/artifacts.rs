//! Artifact kinds and their renderers.
//!
//! Renderers are pure: they turn pipeline results into bytes. Writing the
//! bytes to storage is the pipeline's job.

use std::collections::BTreeMap;

use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::import_job::{ImportMode, JobCounters};
use crate::ports::CatalogVariant;
use crate::source::SheetSource;
use crate::validation::ValidationIssue;

/// Columns appended to the annotated source.
pub const STATUS_COLUMN: &str = "_import_status";
pub const MESSAGES_COLUMN: &str = "_import_messages";

/// Worksheet holding the annotated source.
const ANNOTATED_SHEET: &str = "Import results";

/// Separator between messages inside one cell.
const MESSAGE_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ValidationReport,
    ErrorRows,
    ResultRows,
    AnnotatedXlsx,
    PrunePreview,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        Self::ValidationReport,
        Self::ErrorRows,
        Self::ResultRows,
        Self::AnnotatedXlsx,
        Self::PrunePreview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationReport => "validation_report",
            Self::ErrorRows => "error_rows",
            Self::ResultRows => "result_rows",
            Self::AnnotatedXlsx => "annotated_xlsx",
            Self::PrunePreview => "prune_preview",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// Object name used in storage.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::ValidationReport => "validation_report.json",
            Self::ErrorRows => "error_rows.csv",
            Self::ResultRows => "result_rows.csv",
            Self::AnnotatedXlsx => "annotated_source.xlsx",
            Self::PrunePreview => "prune_preview.json",
        }
    }
}

// ---------------------------------------------------------------------------
// Collected results
// ---------------------------------------------------------------------------

/// What happened to one source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    /// Dry run: would be created.
    WouldCreate,
    /// Dry run: would update an existing entity.
    WouldUpdate,
    Invalid,
    Skipped,
    /// Valid but the catalog refused it.
    Failed,
}

impl RowOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::WouldCreate => "would_create",
            Self::WouldUpdate => "would_update",
            Self::Invalid => "invalid",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Status and messages recorded for a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct RowAnnotation {
    pub outcome: RowOutcome,
    pub messages: Vec<String>,
}

/// A rejected row kept for the `error_rows` artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRow {
    pub line: usize,
    pub cells: Vec<String>,
    pub messages: Vec<String>,
}

/// A row that was (or would be) written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub line: usize,
    pub outcome: RowOutcome,
    pub title: String,
    pub handle: Option<String>,
    pub sku: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
}

/// A catalog variant absent from the import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruneCandidate {
    pub product_id: String,
    #[serde(flatten)]
    pub variant: CatalogVariant,
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    rows_total: i64,
    rows_valid: i64,
    rows_invalid: i64,
    rows_skipped: i64,
    error_count: usize,
    warning_count: usize,
    issues: &'a [ValidationIssue],
}

#[derive(Debug, Serialize)]
struct PrunePreview<'a> {
    mode: ImportMode,
    applied: bool,
    variant_count: usize,
    variants: &'a [PruneCandidate],
}

fn json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| CoreError::Internal(format!("failed to serialize artifact: {e}")))
}

fn csv_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Internal(format!("failed to write CSV artifact: {err}"))
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, CoreError> {
    writer.into_inner().map_err(csv_error)
}

pub fn render_validation_report(
    counters: &JobCounters,
    issues: &[ValidationIssue],
) -> Result<Vec<u8>, CoreError> {
    let error_count = issues.iter().filter(|i| i.is_error()).count();
    json_bytes(&ValidationReport {
        rows_total: counters.rows_total,
        rows_valid: counters.rows_valid,
        rows_invalid: counters.rows_invalid,
        rows_skipped: counters.rows_skipped,
        error_count,
        warning_count: issues.len() - error_count,
        issues,
    })
}

/// Rejected rows with their original cells and an `_errors` column, ready
/// to fix and resubmit.
pub fn render_error_rows(headers: &[String], rows: &[ErrorRow]) -> Result<Vec<u8>, CoreError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let mut header = vec!["_line".to_string()];
    header.extend(headers.iter().cloned());
    header.push("_errors".to_string());
    writer.write_record(&header).map_err(csv_error)?;

    for row in rows {
        let mut record = vec![row.line.to_string()];
        record.extend(row.cells.iter().cloned());
        record.resize(headers.len() + 1, String::new());
        record.push(row.messages.join(MESSAGE_SEPARATOR));
        writer.write_record(&record).map_err(csv_error)?;
    }
    finish_csv(writer)
}

pub fn render_result_rows(rows: &[ResultRow]) -> Result<Vec<u8>, CoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["line", "outcome", "title", "handle", "sku", "product_id", "variant_id"])
        .map_err(csv_error)?;
    for row in rows {
        let line = row.line.to_string();
        writer
            .write_record([
                line.as_str(),
                row.outcome.as_str(),
                row.title.as_str(),
                row.handle.as_deref().unwrap_or_default(),
                row.sku.as_deref().unwrap_or_default(),
                row.product_id.as_deref().unwrap_or_default(),
                row.variant_id.as_deref().unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }
    finish_csv(writer)
}

fn source_error(err: crate::source::SourceError) -> CoreError {
    CoreError::Internal(format!("failed to re-read source: {err}"))
}

fn xlsx_error(err: rust_xlsxwriter::XlsxError) -> CoreError {
    CoreError::Internal(format!("failed to write workbook artifact: {err}"))
}

/// The source sheet re-emitted as an `.xlsx` workbook with per-row status
/// columns. Rows keep their original sheet line.
pub fn render_annotated_source(
    source: &SheetSource<'_>,
    annotations: &BTreeMap<usize, RowAnnotation>,
) -> Result<Vec<u8>, CoreError> {
    let headers = source.headers().map_err(source_error)?;
    let status_col = headers.len() as u16;
    let bold = Format::new().set_bold();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(ANNOTATED_SHEET).map_err(xlsx_error)?;

    for (col, header) in headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, header.as_str(), &bold)
            .map_err(xlsx_error)?;
    }
    sheet
        .write_string_with_format(0, status_col, STATUS_COLUMN, &bold)
        .map_err(xlsx_error)?;
    sheet
        .write_string_with_format(0, status_col + 1, MESSAGES_COLUMN, &bold)
        .map_err(xlsx_error)?;

    for (index, result) in source.records().enumerate() {
        let record = result.map_err(source_error)?;
        let row = index as u32 + 1;
        for (col, cell) in record.cells.iter().take(headers.len()).enumerate() {
            if !cell.is_empty() {
                sheet
                    .write_string(row, col as u16, cell.as_str())
                    .map_err(xlsx_error)?;
            }
        }
        if let Some(annotation) = annotations.get(&record.line) {
            sheet
                .write_string(row, status_col, annotation.outcome.as_str())
                .map_err(xlsx_error)?;
            if !annotation.messages.is_empty() {
                let messages = annotation.messages.join(MESSAGE_SEPARATOR);
                sheet
                    .write_string(row, status_col + 1, messages.as_str())
                    .map_err(xlsx_error)?;
            }
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

pub fn render_prune_preview(
    mode: ImportMode,
    applied: bool,
    candidates: &[PruneCandidate],
) -> Result<Vec<u8>, CoreError> {
    json_bytes(&PrunePreview {
        mode,
        applied,
        variant_count: candidates.len(),
        variants: candidates,
    })
}
