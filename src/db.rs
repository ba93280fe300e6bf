// 🗄️ Roster Store - students + upload batches on SQLite
//
// The connection is constructed once at process start (setup_database) and
// handed to the pipeline explicitly - no hidden singletons. All enum columns
// are written through as_str() so reads can parse them back without surprises.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::validate::{FormLevel, Gender, StudentCandidate, StudentStatus};

// ============================================================================
// STUDENT RECORD
// ============================================================================

/// One student, as persisted. `batch_id` points at the upload batch that
/// created or last touched the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub form: FormLevel,
    pub stream: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub parent_phone: Option<String>,
    pub email: Option<String>,
    pub status: StudentStatus,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// UPLOAD BATCH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<BatchStatus> {
        match value {
            "processing" => Some(BatchStatus::Processing),
            "completed" => Some(BatchStatus::Completed),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

/// One import run. Created with status `processing`, finalized exactly once
/// with counts and status, immutable afterwards (audit record).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBatch {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub status: BatchStatus,
    pub total_rows: i64,
    pub valid_rows: i64,
    pub skipped_rows: i64,
    pub error_rows: i64,
    pub errors: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Final row counts persisted onto a batch
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchCounts {
    pub total_rows: i64,
    pub valid_rows: i64,
    pub skipped_rows: i64,
    pub error_rows: i64,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admission_number TEXT UNIQUE NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            form TEXT NOT NULL,
            stream TEXT,
            date_of_birth TEXT,
            gender TEXT,
            parent_phone TEXT,
            email TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            batch_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS upload_batches (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            status TEXT NOT NULL,
            total_rows INTEGER NOT NULL DEFAULT 0,
            valid_rows INTEGER NOT NULL DEFAULT 0,
            skipped_rows INTEGER NOT NULL DEFAULT 0,
            error_rows INTEGER NOT NULL DEFAULT 0,
            errors TEXT,
            uploaded_at TEXT NOT NULL,
            processed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_form ON students(form)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_batch ON students(batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_uploaded ON upload_batches(uploaded_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// STUDENT OPERATIONS
// ============================================================================

const STUDENT_COLUMNS: &str = "id, admission_number, first_name, middle_name, last_name,
        form, stream, date_of_birth, gender, parent_phone, email,
        status, batch_id, created_at, updated_at";

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn map_student(row: &Row) -> rusqlite::Result<Student> {
    let form: String = row.get(5)?;
    let dob: Option<String> = row.get(7)?;
    let gender: Option<String> = row.get(8)?;
    let status: String = row.get(11)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Student {
        id: row.get(0)?,
        admission_number: row.get(1)?,
        first_name: row.get(2)?,
        middle_name: row.get(3)?,
        last_name: row.get(4)?,
        // Enum columns are only ever written via as_str(), so a parse miss
        // means hand-edited data; fall back rather than poison every read.
        form: FormLevel::parse(&form).unwrap_or(FormLevel::Form1),
        stream: row.get(6)?,
        date_of_birth: dob.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        gender: gender.and_then(|g| Gender::from_str_opt(&g)),
        parent_phone: row.get(9)?,
        email: row.get(10)?,
        status: StudentStatus::from_str_opt(&status).unwrap_or(StudentStatus::Active),
        batch_id: row.get(12)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

/// Insert a new student from a validated candidate. Returns the new row id.
pub fn insert_student(
    conn: &Connection,
    batch_id: &str,
    candidate: &StudentCandidate,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO students (
            admission_number, first_name, middle_name, last_name, form, stream,
            date_of_birth, gender, parent_phone, email, status, batch_id,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            candidate.admission_number,
            candidate.first_name,
            candidate.middle_name,
            candidate.last_name,
            candidate.form.as_str(),
            candidate.stream,
            candidate.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            candidate.gender.map(|g| g.as_str()),
            candidate.parent_phone,
            candidate.email,
            candidate.status.as_str(),
            batch_id,
            now,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Overwrite all mutable fields of an existing student with the candidate's
/// values, re-pointing the record at the current batch. `created_at` and the
/// admission number itself are left alone.
pub fn update_student(
    conn: &Connection,
    student_id: i64,
    batch_id: &str,
    candidate: &StudentCandidate,
) -> Result<()> {
    conn.execute(
        "UPDATE students SET
            first_name = ?1, middle_name = ?2, last_name = ?3, form = ?4,
            stream = ?5, date_of_birth = ?6, gender = ?7, parent_phone = ?8,
            email = ?9, status = ?10, batch_id = ?11, updated_at = ?12
         WHERE id = ?13",
        params![
            candidate.first_name,
            candidate.middle_name,
            candidate.last_name,
            candidate.form.as_str(),
            candidate.stream,
            candidate.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            candidate.gender.map(|g| g.as_str()),
            candidate.parent_phone,
            candidate.email,
            candidate.status.as_str(),
            batch_id,
            Utc::now().to_rfc3339(),
            student_id,
        ],
    )?;

    Ok(())
}

/// Look up a student by the natural key used for reconciliation.
pub fn find_student_by_admission(
    conn: &Connection,
    admission_number: &str,
) -> Result<Option<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE admission_number = ?1",
        STUDENT_COLUMNS
    ))?;

    let mut rows = stmt.query_map(params![admission_number], map_student)?;

    match rows.next() {
        Some(student) => Ok(Some(student?)),
        None => Ok(None),
    }
}

/// Delete one student by id. Returns false when no such row exists.
pub fn delete_student(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM students WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn count_students(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// LISTING / PAGINATION
// ============================================================================

/// Filter + pagination parameters for the roster listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub form: Option<String>,
    pub stream: Option<String>,
    pub search: Option<String>,
}

/// One page of students plus the metadata the UI needs for paging controls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPage {
    pub students: Vec<Student>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

/// List students with optional form/stream filters and a name/admission
/// search, newest first, paginated.
pub fn list_students(conn: &Connection, query: &StudentQuery) -> Result<StudentPage> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut clauses: Vec<&str> = Vec::new();
    let mut bind: Vec<String> = Vec::new();

    if let Some(form) = query.form.as_deref().filter(|f| !f.trim().is_empty()) {
        clauses.push("form = ?");
        bind.push(form.trim().to_string());
    }

    if let Some(stream) = query.stream.as_deref().filter(|s| !s.trim().is_empty()) {
        clauses.push("stream = ?");
        bind.push(stream.trim().to_string());
    }

    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        clauses.push("(admission_number LIKE ? OR first_name LIKE ? OR last_name LIKE ?)");
        let pattern = format!("%{}%", search.trim());
        bind.push(pattern.clone());
        bind.push(pattern.clone());
        bind.push(pattern);
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students{}", where_sql),
        params_from_iter(bind.iter()),
        |row| row.get(0),
    )?;

    let offset = (page as i64 - 1) * limit as i64;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students{} ORDER BY id DESC LIMIT {} OFFSET {}",
        STUDENT_COLUMNS, where_sql, limit, offset
    ))?;

    let students = stmt
        .query_map(params_from_iter(bind.iter()), map_student)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let pages = (total + limit as i64 - 1) / limit as i64;

    Ok(StudentPage {
        students,
        page,
        limit,
        total,
        pages,
    })
}

// ============================================================================
// BATCH OPERATIONS
// ============================================================================

fn map_batch(row: &Row) -> rusqlite::Result<UploadBatch> {
    let status: String = row.get(3)?;
    let errors_json: Option<String> = row.get(8)?;
    let uploaded_at: String = row.get(9)?;
    let processed_at: Option<String> = row.get(10)?;

    Ok(UploadBatch {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_type: row.get(2)?,
        status: BatchStatus::from_str_opt(&status).unwrap_or(BatchStatus::Failed),
        total_rows: row.get(4)?,
        valid_rows: row.get(5)?,
        skipped_rows: row.get(6)?,
        error_rows: row.get(7)?,
        errors: errors_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default(),
        uploaded_at: parse_timestamp(&uploaded_at),
        processed_at: processed_at.as_deref().map(parse_timestamp),
    })
}

/// Create the batch record up front with status `processing`, before the
/// first row is touched, so every import leaves an audit trail even when it
/// fails immediately.
pub fn create_batch(conn: &Connection, file_name: &str, file_type: &str) -> Result<UploadBatch> {
    let id = uuid::Uuid::new_v4().to_string();
    let uploaded_at = Utc::now();

    conn.execute(
        "INSERT INTO upload_batches (id, file_name, file_type, status, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            file_name,
            file_type,
            BatchStatus::Processing.as_str(),
            uploaded_at.to_rfc3339(),
        ],
    )?;

    Ok(UploadBatch {
        id,
        file_name: file_name.to_string(),
        file_type: file_type.to_string(),
        status: BatchStatus::Processing,
        total_rows: 0,
        valid_rows: 0,
        skipped_rows: 0,
        error_rows: 0,
        errors: Vec::new(),
        uploaded_at,
        processed_at: None,
    })
}

/// Write the final counts, error list and status onto the batch. Called
/// exactly once per import; the record is immutable afterwards.
pub fn finalize_batch(
    conn: &Connection,
    batch_id: &str,
    status: BatchStatus,
    counts: BatchCounts,
    errors: &[String],
) -> Result<()> {
    let errors_json = serde_json::to_string(errors)?;

    conn.execute(
        "UPDATE upload_batches SET
            status = ?1, total_rows = ?2, valid_rows = ?3, skipped_rows = ?4,
            error_rows = ?5, errors = ?6, processed_at = ?7
         WHERE id = ?8",
        params![
            status.as_str(),
            counts.total_rows,
            counts.valid_rows,
            counts.skipped_rows,
            counts.error_rows,
            errors_json,
            Utc::now().to_rfc3339(),
            batch_id,
        ],
    )?;

    Ok(())
}

pub fn get_batch(conn: &Connection, batch_id: &str) -> Result<Option<UploadBatch>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_name, file_type, status, total_rows, valid_rows,
                skipped_rows, error_rows, errors, uploaded_at, processed_at
         FROM upload_batches WHERE id = ?1",
    )?;

    let mut rows = stmt.query_map(params![batch_id], map_batch)?;

    match rows.next() {
        Some(batch) => Ok(Some(batch?)),
        None => Ok(None),
    }
}

pub fn list_batches(conn: &Connection) -> Result<Vec<UploadBatch>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_name, file_type, status, total_rows, valid_rows,
                skipped_rows, error_rows, errors, uploaded_at, processed_at
         FROM upload_batches ORDER BY uploaded_at DESC",
    )?;

    let batches = stmt
        .query_map([], map_batch)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(batches)
}

/// Delete a batch and every student it introduced or last touched.
///
/// This is the explicit, caller-invoked destructive operation - the import
/// pipeline itself never deletes. Returns the number of students removed,
/// or None when the batch does not exist.
pub fn delete_batch(conn: &Connection, batch_id: &str) -> Result<Option<usize>> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM upload_batches WHERE id = ?1",
        params![batch_id],
        |row| row.get(0),
    )?;

    if exists == 0 {
        return Ok(None);
    }

    let students_deleted =
        conn.execute("DELETE FROM students WHERE batch_id = ?1", params![batch_id])?;
    conn.execute("DELETE FROM upload_batches WHERE id = ?1", params![batch_id])?;

    Ok(Some(students_deleted))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_candidate(admission: &str) -> StudentCandidate {
        StudentCandidate {
            admission_number: admission.to_string(),
            first_name: "John".to_string(),
            middle_name: None,
            last_name: "Doe".to_string(),
            form: FormLevel::Form1,
            stream: Some("East".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(2008, 5, 15),
            gender: Some(Gender::Male),
            parent_phone: Some("+254712345678".to_string()),
            email: Some("j@x.com".to_string()),
            status: StudentStatus::Active,
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_find_by_admission() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();

        let id = insert_student(&conn, &batch.id, &test_candidate("1001")).unwrap();
        assert!(id > 0);

        let found = find_student_by_admission(&conn, "1001").unwrap().unwrap();
        assert_eq!(found.first_name, "John");
        assert_eq!(found.form, FormLevel::Form1);
        assert_eq!(found.batch_id.as_deref(), Some(batch.id.as_str()));
        assert_eq!(found.date_of_birth, NaiveDate::from_ymd_opt(2008, 5, 15));

        assert!(find_student_by_admission(&conn, "9999").unwrap().is_none());
    }

    #[test]
    fn test_admission_number_unique_constraint() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();

        insert_student(&conn, &batch.id, &test_candidate("1001")).unwrap();
        let second = insert_student(&conn, &batch.id, &test_candidate("1001"));

        assert!(second.is_err());
        assert_eq!(count_students(&conn).unwrap(), 1);
    }

    #[test]
    fn test_update_overwrites_fields_and_batch_ref() {
        let conn = test_conn();
        let batch1 = create_batch(&conn, "first.csv", "csv").unwrap();
        let id = insert_student(&conn, &batch1.id, &test_candidate("1001")).unwrap();

        let batch2 = create_batch(&conn, "second.csv", "csv").unwrap();
        let mut changed = test_candidate("1001");
        changed.stream = Some("West".to_string());
        changed.form = FormLevel::Form2;

        update_student(&conn, id, &batch2.id, &changed).unwrap();

        let found = find_student_by_admission(&conn, "1001").unwrap().unwrap();
        assert_eq!(found.stream.as_deref(), Some("West"));
        assert_eq!(found.form, FormLevel::Form2);
        assert_eq!(found.batch_id.as_deref(), Some(batch2.id.as_str()));
    }

    #[test]
    fn test_list_students_pagination() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();

        for i in 0..25 {
            insert_student(&conn, &batch.id, &test_candidate(&format!("10{:02}", i))).unwrap();
        }

        let query = StudentQuery {
            page: Some(2),
            limit: Some(10),
            ..Default::default()
        };
        let page = list_students(&conn, &query).unwrap();

        assert_eq!(page.students.len(), 10);
        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 3);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn test_list_students_filters_and_search() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();

        let mut a = test_candidate("1001");
        a.form = FormLevel::Form1;
        a.stream = Some("East".to_string());
        insert_student(&conn, &batch.id, &a).unwrap();

        let mut b = test_candidate("2001");
        b.form = FormLevel::Form2;
        b.stream = Some("West".to_string());
        b.first_name = "Jane".to_string();
        insert_student(&conn, &batch.id, &b).unwrap();

        let by_form = list_students(
            &conn,
            &StudentQuery {
                form: Some("Form 2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_form.total, 1);
        assert_eq!(by_form.students[0].admission_number, "2001");

        let by_stream = list_students(
            &conn,
            &StudentQuery {
                stream: Some("East".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_stream.total, 1);

        let by_search = list_students(
            &conn,
            &StudentQuery {
                search: Some("Jane".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_search.total, 1);
        assert_eq!(by_search.students[0].first_name, "Jane");
    }

    #[test]
    fn test_delete_student() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();
        let id = insert_student(&conn, &batch.id, &test_candidate("1001")).unwrap();

        assert!(delete_student(&conn, id).unwrap());
        assert!(!delete_student(&conn, id).unwrap());
        assert_eq!(count_students(&conn).unwrap(), 0);
    }

    #[test]
    fn test_batch_lifecycle() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();
        assert_eq!(batch.status, BatchStatus::Processing);
        assert!(batch.processed_at.is_none());

        finalize_batch(
            &conn,
            &batch.id,
            BatchStatus::Completed,
            BatchCounts {
                total_rows: 3,
                valid_rows: 2,
                skipped_rows: 1,
                error_rows: 1,
            },
            &["Row 2: missing required field 'lastName'".to_string()],
        )
        .unwrap();

        let reloaded = get_batch(&conn, &batch.id).unwrap().unwrap();
        assert_eq!(reloaded.status, BatchStatus::Completed);
        assert_eq!(reloaded.total_rows, 3);
        assert_eq!(reloaded.valid_rows, 2);
        assert_eq!(reloaded.errors.len(), 1);
        assert!(reloaded.processed_at.is_some());
    }

    #[test]
    fn test_delete_batch_cascades_to_students() {
        let conn = test_conn();
        let batch = create_batch(&conn, "roster.csv", "csv").unwrap();
        insert_student(&conn, &batch.id, &test_candidate("1001")).unwrap();
        insert_student(&conn, &batch.id, &test_candidate("1002")).unwrap();

        let other = create_batch(&conn, "other.csv", "csv").unwrap();
        insert_student(&conn, &other.id, &test_candidate("2001")).unwrap();

        let deleted = delete_batch(&conn, &batch.id).unwrap();
        assert_eq!(deleted, Some(2));

        assert!(get_batch(&conn, &batch.id).unwrap().is_none());
        assert_eq!(count_students(&conn).unwrap(), 1);
        assert!(find_student_by_admission(&conn, "2001").unwrap().is_some());

        // Unknown batch id is a no-op, not an error
        assert_eq!(delete_batch(&conn, "missing").unwrap(), None);
    }
}
