// ⚖️ Reconciliation Engine - apply candidates against the store
//
// One candidate at a time: look up the existing student by admission number,
// then insert, skip or replace under the caller's duplicate policy. A failed
// write degrades that single row to an error; the batch keeps going.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::RowError;
use crate::validate::StudentCandidate;

// ============================================================================
// DUPLICATE POLICY
// ============================================================================

/// What to do when an imported row's admission number already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Leave the existing record untouched (the default)
    #[default]
    Skip,
    /// Overwrite all mutable fields with the uploaded values
    Replace,
}

impl DuplicatePolicy {
    /// Map the `replaceExisting` form flag onto a policy.
    pub fn from_replace_flag(replace_existing: bool) -> Self {
        if replace_existing {
            DuplicatePolicy::Replace
        } else {
            DuplicatePolicy::Skip
        }
    }
}

// ============================================================================
// ROW OUTCOME
// ============================================================================

/// Per-row classification after validation + reconciliation.
///
/// Every variant carries the 1-based data row position; `Error` additionally
/// carries the human-readable reason surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RowOutcome {
    New { row: usize },
    Updated { row: usize },
    Skipped { row: usize },
    Error { row: usize, message: String },
}

impl RowOutcome {
    pub fn is_valid(&self) -> bool {
        !matches!(self, RowOutcome::Error { .. })
    }
}

impl From<RowError> for RowOutcome {
    fn from(err: RowError) -> Self {
        RowOutcome::Error {
            row: err.row(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

/// Applies normalized candidates to the store for one upload batch.
pub struct ReconciliationEngine<'a> {
    conn: &'a Connection,
    batch_id: &'a str,
    policy: DuplicatePolicy,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(conn: &'a Connection, batch_id: &'a str, policy: DuplicatePolicy) -> Self {
        ReconciliationEngine {
            conn,
            batch_id,
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Apply one candidate.
    ///
    /// - no existing record with that admission number → insert, `New`
    /// - match + `Skip` → no write, `Skipped`
    /// - match + `Replace` → overwrite mutable fields, `Updated`
    ///
    /// Store failures come back as `RowError::Persistence` so the caller can
    /// count this row as an error and continue with the next one.
    pub fn apply(&self, row: usize, candidate: &StudentCandidate) -> Result<RowOutcome, RowError> {
        let existing = db::find_student_by_admission(self.conn, &candidate.admission_number)
            .map_err(|e| RowError::persistence(row, e.to_string()))?;

        match existing {
            None => {
                db::insert_student(self.conn, self.batch_id, candidate)
                    .map_err(|e| RowError::persistence(row, e.to_string()))?;
                Ok(RowOutcome::New { row })
            }
            Some(_) if self.policy == DuplicatePolicy::Skip => Ok(RowOutcome::Skipped { row }),
            Some(student) => {
                db::update_student(self.conn, student.id, self.batch_id, candidate)
                    .map_err(|e| RowError::persistence(row, e.to_string()))?;
                Ok(RowOutcome::Updated { row })
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_candidate;
    use crate::db::{count_students, create_batch, find_student_by_admission, setup_database};
    use crate::validate::FormLevel;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(
            DuplicatePolicy::from_replace_flag(true),
            DuplicatePolicy::Replace
        );
        assert_eq!(
            DuplicatePolicy::from_replace_flag(false),
            DuplicatePolicy::Skip
        );
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Skip);
    }

    #[test]
    fn test_apply_inserts_new_record() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();
        let engine = ReconciliationEngine::new(&conn, &batch.id, DuplicatePolicy::Skip);

        let outcome = engine.apply(1, &test_candidate("1001")).unwrap();

        assert_eq!(outcome, RowOutcome::New { row: 1 });
        assert_eq!(count_students(&conn).unwrap(), 1);
    }

    #[test]
    fn test_apply_skip_leaves_existing_untouched() {
        let conn = test_conn();
        let batch1 = create_batch(&conn, "first.csv", "csv").unwrap();
        ReconciliationEngine::new(&conn, &batch1.id, DuplicatePolicy::Skip)
            .apply(1, &test_candidate("1001"))
            .unwrap();

        let batch2 = create_batch(&conn, "second.csv", "csv").unwrap();
        let mut changed = test_candidate("1001");
        changed.first_name = "Johnny".to_string();

        let engine = ReconciliationEngine::new(&conn, &batch2.id, DuplicatePolicy::Skip);
        let outcome = engine.apply(1, &changed).unwrap();

        assert_eq!(outcome, RowOutcome::Skipped { row: 1 });

        let stored = find_student_by_admission(&conn, "1001").unwrap().unwrap();
        assert_eq!(stored.first_name, "John");
        // Skip must not re-point the record at the new batch either
        assert_eq!(stored.batch_id.as_deref(), Some(batch1.id.as_str()));
    }

    #[test]
    fn test_apply_replace_overwrites_fields() {
        let conn = test_conn();
        let batch1 = create_batch(&conn, "first.csv", "csv").unwrap();
        ReconciliationEngine::new(&conn, &batch1.id, DuplicatePolicy::Skip)
            .apply(1, &test_candidate("1001"))
            .unwrap();

        let batch2 = create_batch(&conn, "second.csv", "csv").unwrap();
        let mut changed = test_candidate("1001");
        changed.stream = Some("West".to_string());
        changed.form = FormLevel::Form3;

        let engine = ReconciliationEngine::new(&conn, &batch2.id, DuplicatePolicy::Replace);
        let outcome = engine.apply(2, &changed).unwrap();

        assert_eq!(outcome, RowOutcome::Updated { row: 2 });

        let stored = find_student_by_admission(&conn, "1001").unwrap().unwrap();
        assert_eq!(stored.stream.as_deref(), Some("West"));
        assert_eq!(stored.form, FormLevel::Form3);
        assert_eq!(stored.batch_id.as_deref(), Some(batch2.id.as_str()));
        assert_eq!(count_students(&conn).unwrap(), 1);
    }

    #[test]
    fn test_persistence_failure_degrades_to_row_error() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();
        // Drop the table out from under the engine to force a write failure
        conn.execute("DROP TABLE students", []).unwrap();

        let engine = ReconciliationEngine::new(&conn, &batch.id, DuplicatePolicy::Skip);
        let err = engine.apply(4, &test_candidate("1001")).unwrap_err();

        assert_eq!(err.row(), 4);
        assert!(matches!(err, RowError::Persistence { .. }));
    }

    #[test]
    fn test_row_outcome_from_row_error() {
        let err = RowError::validation(3, "duplicate admission number '1001' within file");
        let outcome: RowOutcome = err.into();

        assert!(!outcome.is_valid());
        match outcome {
            RowOutcome::Error { row, message } => {
                assert_eq!(row, 3);
                assert!(message.contains("Row 3"));
                assert!(message.contains("duplicate admission number"));
            }
            _ => panic!("expected error outcome"),
        }
    }
}
