// 📄 Spreadsheet Parser - CSV/XLS/XLSX roster files → row mappings
//
// Converts an uploaded file into an ordered sequence of rows, where each row
// maps column header → cell value. The first row is always the header row and
// is never emitted as data. Pure transformation of bytes to rows.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;

use crate::error::ImportError;

// ============================================================================
// FILE FORMAT
// ============================================================================

/// Accepted spreadsheet formats, detected from the declared filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xls,
    Xlsx,
}

/// Lowercased extension of the declared filename; empty when there is none.
pub(crate) fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .filter(|ext| *ext != file_name)
        .unwrap_or("")
        .to_lowercase()
}

impl FileFormat {
    /// Detect format from the file extension (case-insensitive).
    ///
    /// Anything outside the accepted set fails with `UnsupportedFormat`.
    pub fn detect(file_name: &str) -> Result<FileFormat, ImportError> {
        let ext = file_extension(file_name);

        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xls" => Ok(FileFormat::Xls),
            "xlsx" => Ok(FileFormat::Xlsx),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }

    /// Short code stored on the upload batch
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xls => "xls",
            FileFormat::Xlsx => "xlsx",
        }
    }
}

// ============================================================================
// ROSTER ROW
// ============================================================================

/// One data row from the uploaded file.
///
/// `row` is the 1-based position among data rows (header excluded); it is the
/// number surfaced in error messages so callers can fix and re-upload.
#[derive(Debug, Clone)]
pub struct RosterRow {
    pub row: usize,
    fields: HashMap<String, String>,
}

impl RosterRow {
    pub fn new(row: usize, fields: HashMap<String, String>) -> Self {
        RosterRow { row, fields }
    }

    /// Get a trimmed, non-empty cell value by header name.
    ///
    /// Blank cells and absent columns both come back as `None` - the
    /// validator treats those the same way.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .get(header)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse raw file bytes into data rows, in original file order.
///
/// The header row is consumed and used as the key set; rows with more cells
/// than headers keep only the headed cells. Structural failures surface as
/// `ImportError::Parse` before any row reaches the rest of the pipeline.
pub fn parse_rows(bytes: &[u8], format: FileFormat) -> Result<Vec<RosterRow>, ImportError> {
    match format {
        FileFormat::Csv => parse_csv(bytes),
        FileFormat::Xls | FileFormat::Xlsx => parse_workbook(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RosterRow>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::Parse(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| ImportError::Parse(format!("CSV record {}: {}", idx + 1, e)))?;

        let fields = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        rows.push(RosterRow::new(idx + 1, fields));
    }

    Ok(rows)
}

fn parse_workbook(bytes: &[u8]) -> Result<Vec<RosterRow>, ImportError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| ImportError::Parse(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Parse("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::Parse(format!("sheet '{}': {}", sheet_name, e)))?;

    let mut sheet_rows = range.rows();

    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row.iter().map(|c| cell_to_string(c)).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();

    for (idx, sheet_row) in sheet_rows.enumerate() {
        let fields = headers
            .iter()
            .zip(sheet_row.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, c)| (h.clone(), cell_to_string(c)))
            .collect();

        rows.push(RosterRow::new(idx + 1, fields));
    }

    Ok(rows)
}

/// Render an Excel cell the way it appears in the roster.
///
/// Admission numbers typed into Excel arrive as floats ("1001.0"); dates
/// arrive as serials. Both need coercing back to the string forms the
/// validator expects.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
