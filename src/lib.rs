// School Roster System - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod db;
pub mod error;
pub mod importer;
pub mod reconcile;
pub mod spreadsheet;
pub mod template;
pub mod validate;

// Re-export commonly used types
pub use db::{
    count_students, create_batch, delete_batch, delete_student, finalize_batch,
    find_student_by_admission, get_batch, list_batches, list_students,
    setup_database, BatchCounts, BatchStatus, Student, StudentPage, StudentQuery, UploadBatch,
};
pub use error::{ImportError, RowError};
pub use importer::{import_spreadsheet, ImportReport, ImportStats, ImportSummary};
pub use reconcile::{DuplicatePolicy, ReconciliationEngine, RowOutcome};
pub use spreadsheet::{parse_rows, FileFormat, RosterRow};
pub use template::{template_csv, ROSTER_HEADERS, TEMPLATE_FILE_NAME};
pub use validate::{validate_row, FormLevel, Gender, StudentCandidate, StudentStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
