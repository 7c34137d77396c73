//! Source file decoding.
//!
//! Delimited text and `.xlsx` workbooks decode into the same record shape:
//! a header row, then data records carrying their 1-based sheet line. CSV
//! records are streamed straight off the byte buffer. A workbook's first
//! worksheet is decoded once when the source is opened.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use csv::{ReaderBuilder, StringRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("file is {size} bytes; the limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("file has {rows} rows; the limit is {limit}")]
    TooManyRows { rows: usize, limit: usize },

    #[error("unsupported file format: {0}")]
    Unsupported(String),

    #[error("file has no header row")]
    Empty,

    #[error("file could not be parsed: {0}")]
    Malformed(String),
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Upload ceilings.
#[derive(Debug, Clone, Copy)]
pub struct SourceLimits {
    pub max_bytes: usize,
    pub max_rows: usize,
}

/// What an accepted upload looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub format: SheetFormat,
    pub headers: Vec<String>,
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Xlsx,
}

impl SheetFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

/// One data row as text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub line: usize,
    pub cells: Vec<String>,
}

/// An uploaded sheet in either supported format.
#[derive(Debug, Clone)]
pub enum SheetSource<'a> {
    Csv(CsvSource<'a>),
    Xlsx(WorkbookSheet),
}

impl<'a> SheetSource<'a> {
    /// Pick the decoder from the file name and signature.
    ///
    /// Legacy binary `.xls` workbooks are refused; everything that is not a
    /// zip container is read as CSV.
    pub fn open(filename: &str, bytes: &'a [u8]) -> Result<Self, SourceError> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".xls") || bytes.starts_with(OLE_MAGIC) {
            return Err(SourceError::Unsupported(
                "legacy .xls workbooks must be saved as .xlsx or CSV".into(),
            ));
        }
        if lower.ends_with(".xlsx") || bytes.starts_with(ZIP_MAGIC) {
            return WorkbookSheet::decode(bytes).map(Self::Xlsx);
        }
        CsvSource::open(bytes).map(Self::Csv)
    }

    pub fn format(&self) -> SheetFormat {
        match self {
            Self::Csv(_) => SheetFormat::Csv,
            Self::Xlsx(_) => SheetFormat::Xlsx,
        }
    }

    pub fn headers(&self) -> Result<Vec<String>, SourceError> {
        let headers = match self {
            Self::Csv(csv) => csv.headers()?,
            Self::Xlsx(sheet) => sheet.headers.clone(),
        };
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(SourceError::Empty);
        }
        Ok(headers)
    }

    /// Count data rows without keeping them.
    pub fn count_rows(&self) -> Result<usize, SourceError> {
        match self {
            Self::Csv(csv) => csv.count_rows(),
            Self::Xlsx(sheet) => Ok(sheet.records.len()),
        }
    }

    /// Data records in sheet order.
    pub fn records(&self) -> Box<dyn Iterator<Item = Result<SourceRecord, SourceError>> + Send + '_> {
        match self {
            Self::Csv(csv) => Box::new(csv.records()),
            Self::Xlsx(sheet) => Box::new(sheet.records.iter().cloned().map(Ok)),
        }
    }

    /// Check an upload against the size and row ceilings.
    pub fn inspect(&self, limits: &SourceLimits) -> Result<SourceSummary, SourceError> {
        let size = match self {
            Self::Csv(csv) => csv.bytes.len(),
            Self::Xlsx(sheet) => sheet.byte_len,
        };
        if size > limits.max_bytes {
            return Err(SourceError::TooLarge {
                size,
                limit: limits.max_bytes,
            });
        }
        let headers = self.headers()?;
        let rows = self.count_rows()?;
        if rows > limits.max_rows {
            return Err(SourceError::TooManyRows {
                rows,
                limit: limits.max_rows,
            });
        }
        Ok(SourceSummary {
            format: self.format(),
            headers,
            rows,
        })
    }
}

/// Decoded view over an uploaded CSV file.
#[derive(Debug, Clone, Copy)]
pub struct CsvSource<'a> {
    bytes: &'a [u8],
}

impl<'a> CsvSource<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, SourceError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if std::str::from_utf8(bytes).is_err() {
            return Err(SourceError::Unsupported("file is not UTF-8 text".into()));
        }
        Ok(Self { bytes })
    }

    fn reader(&self) -> csv::Reader<&'a [u8]> {
        ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(self.bytes)
    }

    fn headers(&self) -> Result<Vec<String>, SourceError> {
        let mut reader = self.reader();
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }

    fn count_rows(&self) -> Result<usize, SourceError> {
        let mut reader = self.reader();
        let mut record = StringRecord::new();
        let mut rows = 0;
        while reader.read_record(&mut record)? {
            rows += 1;
        }
        Ok(rows)
    }

    fn records(&self) -> impl Iterator<Item = Result<SourceRecord, SourceError>> + 'a {
        self.reader()
            .into_records()
            .enumerate()
            .map(|(index, result)| {
                let record = result?;
                let line = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(index + 2);
                Ok(SourceRecord {
                    line,
                    cells: record.iter().map(str::to_string).collect(),
                })
            })
    }
}

/// The first worksheet of an `.xlsx` workbook as text cells.
#[derive(Debug, Clone)]
pub struct WorkbookSheet {
    byte_len: usize,
    headers: Vec<String>,
    records: Vec<SourceRecord>,
}

impl WorkbookSheet {
    fn decode(bytes: &[u8]) -> Result<Self, SourceError> {
        let malformed = |e: calamine::XlsxError| SourceError::Malformed(e.to_string());
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(malformed)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SourceError::Empty)?
            .map_err(malformed)?;

        // Sheet lines are 1-based and the used range may not start at row 1.
        let first_line = range.start().map_or(1, |(row, _)| row as usize + 1);
        let mut rows = range
            .rows()
            .enumerate()
            .map(|(index, cells)| SourceRecord {
                line: first_line + index,
                cells: cells.iter().map(cell_text).collect(),
            });

        let headers = rows.next().map(|r| r.cells).unwrap_or_default();
        Ok(Self {
            byte_len: bytes.len(),
            headers,
            records: rows.collect(),
        })
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}
