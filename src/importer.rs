// 📥 Roster Importer - parse → validate → reconcile → report
//
// One call processes one uploaded file start to finish: batch record first,
// then every row sequentially, then the final counts. Row errors are counted
// and skipped; only a file that cannot be read at all fails the batch.

use std::collections::HashSet;

use anyhow::Result;
use log::warn;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, BatchCounts, BatchStatus, UploadBatch};
use crate::error::ImportError;
use crate::reconcile::{DuplicatePolicy, ReconciliationEngine, RowOutcome};
use crate::spreadsheet::{file_extension, parse_rows, FileFormat};
use crate::validate::validate_row;

/// Error messages surfaced per batch are capped at this many; enough to fix
/// and re-upload without shipping a 10k-line array to the browser.
const MAX_REPORT_ERRORS: usize = 20;

// ============================================================================
// IMPORT REPORT (wire types)
// ============================================================================

/// Everything the caller gets back from one import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: bool,
    pub message: String,
    pub batch: BatchInfo,
    pub stats: ImportStats,
    pub summary: ImportSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    pub id: String,
    pub file_name: String,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_rows: i64,
    pub valid_rows: i64,
    pub skipped_rows: i64,
    pub error_rows: i64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub new: i64,
    pub updated: i64,
    pub skipped: i64,
}

impl ImportReport {
    fn from_batch(batch: &UploadBatch, summary: ImportSummary, success: bool, message: String) -> Self {
        ImportReport {
            success,
            message,
            batch: BatchInfo {
                id: batch.id.clone(),
                file_name: batch.file_name.clone(),
                status: batch.status,
            },
            stats: ImportStats {
                total_rows: batch.total_rows,
                valid_rows: batch.valid_rows,
                skipped_rows: batch.skipped_rows,
                error_rows: batch.error_rows,
                errors: batch.errors.clone(),
            },
            summary,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run the whole import pipeline against one uploaded file.
///
/// Always creates an UploadBatch - even an unreadable file leaves a `failed`
/// audit record. There is no batch-wide transaction: rows committed before a
/// later row errors stay committed (best-effort, not atomic).
pub fn import_spreadsheet(
    conn: &Connection,
    file_name: &str,
    bytes: &[u8],
    policy: DuplicatePolicy,
) -> Result<ImportReport> {
    let format = FileFormat::detect(file_name);

    let file_type = match &format {
        Ok(f) => f.as_str().to_string(),
        Err(_) => {
            let ext = file_extension(file_name);
            if ext.is_empty() {
                "unknown".to_string()
            } else {
                ext
            }
        }
    };

    let mut batch = db::create_batch(conn, file_name, &file_type)?;

    let rows = match format.and_then(|f| parse_rows(bytes, f)) {
        Ok(rows) => rows,
        Err(err) => return fail_batch(conn, batch, err),
    };

    let engine = ReconciliationEngine::new(conn, &batch.id, policy);
    let mut seen: HashSet<String> = HashSet::new();
    let mut outcomes: Vec<RowOutcome> = Vec::with_capacity(rows.len());

    for row in &rows {
        let outcome = match validate_row(row, &mut seen).and_then(|c| engine.apply(row.row, &c)) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("import {}: {}", batch.id, err);
                err.into()
            }
        };
        outcomes.push(outcome);
    }

    let summary = summarize(&outcomes);
    let errors: Vec<String> = outcomes
        .iter()
        .filter_map(|o| match o {
            RowOutcome::Error { message, .. } => Some(message.clone()),
            _ => None,
        })
        .take(MAX_REPORT_ERRORS)
        .collect();

    let counts = BatchCounts {
        total_rows: rows.len() as i64,
        valid_rows: summary.new + summary.updated + summary.skipped,
        skipped_rows: summary.skipped,
        error_rows: outcomes.iter().filter(|o| !o.is_valid()).count() as i64,
    };

    db::finalize_batch(conn, &batch.id, BatchStatus::Completed, counts, &errors)?;

    batch.status = BatchStatus::Completed;
    batch.total_rows = counts.total_rows;
    batch.valid_rows = counts.valid_rows;
    batch.skipped_rows = counts.skipped_rows;
    batch.error_rows = counts.error_rows;
    batch.errors = errors;

    let message = format!(
        "Import completed: {} new, {} updated, {} skipped, {} errors",
        summary.new, summary.updated, summary.skipped, counts.error_rows
    );

    Ok(ImportReport::from_batch(&batch, summary, true, message))
}

/// File-level failure before any row was processed: mark the batch failed
/// with a single error message and zero valid rows.
fn fail_batch(
    conn: &Connection,
    mut batch: UploadBatch,
    err: ImportError,
) -> Result<ImportReport> {
    let message = err.to_string();
    let errors = vec![message.clone()];

    db::finalize_batch(
        conn,
        &batch.id,
        BatchStatus::Failed,
        BatchCounts::default(),
        &errors,
    )?;

    batch.status = BatchStatus::Failed;
    batch.errors = errors;

    warn!("import {} failed: {}", batch.id, message);

    Ok(ImportReport::from_batch(
        &batch,
        ImportSummary::default(),
        false,
        message,
    ))
}

fn summarize(outcomes: &[RowOutcome]) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for outcome in outcomes {
        match outcome {
            RowOutcome::New { .. } => summary.new += 1,
            RowOutcome::Updated { .. } => summary.updated += 1,
            RowOutcome::Skipped { .. } => summary.skipped += 1,
            RowOutcome::Error { .. } => {}
        }
    }
    summary
}

// ============================================================================
// TESTS
// ============================================================================
