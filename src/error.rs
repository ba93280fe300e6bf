// ⚠️ Error Taxonomy - file-level vs row-level failures
//
// File-level errors abort the whole import before any row is touched.
// Row-level errors are values the reporter counts and moves past - a single
// bad row must never take the batch down with it.

use thiserror::Error;

// ============================================================================
// FILE-LEVEL ERRORS
// ============================================================================

/// Errors that make the uploaded file unprocessable as a whole.
///
/// When one of these is raised the batch is marked `failed` with zero valid
/// rows; nothing has been written to the students table yet.
#[derive(Debug, Error)]
pub enum ImportError {
    /// File extension is not one of .csv / .xls / .xlsx
    #[error("unsupported file format: .{0} (expected .csv, .xls or .xlsx)")]
    UnsupportedFormat(String),

    /// The spreadsheet itself is structurally unreadable
    /// (unterminated quotes, corrupt binary workbook, ...)
    #[error("failed to parse spreadsheet: {0}")]
    Parse(String),

    /// Database failure outside of row processing (batch bookkeeping)
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

// ============================================================================
// ROW-LEVEL ERRORS
// ============================================================================

/// Per-row failures, carrying the 1-based data row position.
///
/// These are returned as plain values so the aggregator can pattern-match on
/// them instead of catching panics or letting one row abort the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    /// Missing/invalid required field, bad date, bad form value,
    /// or a duplicate admission number within the same file.
    #[error("Row {row}: {message}")]
    Validation { row: usize, message: String },

    /// The insert/update for this row failed (constraint violation,
    /// connection loss). Only this row degrades to an error.
    #[error("Row {row}: database error: {message}")]
    Persistence { row: usize, message: String },
}

impl RowError {
    pub fn validation(row: usize, message: impl Into<String>) -> Self {
        RowError::Validation {
            row,
            message: message.into(),
        }
    }

    pub fn persistence(row: usize, message: impl Into<String>) -> Self {
        RowError::Persistence {
            row,
            message: message.into(),
        }
    }

    /// 1-based data row this error refers to
    pub fn row(&self) -> usize {
        match self {
            RowError::Validation { row, .. } => *row,
            RowError::Persistence { row, .. } => *row,
        }
    }
}
