// School Roster System - Web Server
// REST API with Axum: bulk import, roster listing, batch management

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use log::{error, info};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use school_roster::{
    delete_batch, delete_student, import_spreadsheet, list_batches, list_students,
    setup_database, template_csv, DuplicatePolicy, StudentQuery, TEMPLATE_FILE_NAME, VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(format!("OK {}", VERSION)))
}

/// POST /api/students/import - Upload a roster file (multipart)
///
/// Expects a `file` part carrying the spreadsheet and an optional
/// `replaceExisting` text part ("true" switches the duplicate policy).
async fn import_students(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut replace_existing = false;

    // Drain the multipart stream fully before taking the db lock; the std
    // mutex guard must not live across an await point.
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::err(format!("malformed upload: {}", e))),
                )
                    .into_response();
            }
        };

        match field.name() {
            Some("file") => {
                let name = field
                    .file_name()
                    .unwrap_or("upload.csv")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((name, bytes.to_vec())),
                    Err(e) => {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(ApiResponse::err(format!("failed to read file: {}", e))),
                        )
                            .into_response();
                    }
                }
            }
            Some("replaceExisting") => {
                if let Ok(value) = field.text().await {
                    replace_existing = value.trim().eq_ignore_ascii_case("true");
                }
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("missing 'file' part in upload")),
        )
            .into_response();
    };

    let policy = DuplicatePolicy::from_replace_flag(replace_existing);

    let conn = state.db.lock().unwrap();
    match import_spreadsheet(&conn, &file_name, &bytes, policy) {
        Ok(report) => {
            info!(
                "import {}: {} ({} rows)",
                report.batch.id, report.message, report.stats.total_rows
            );
            let status = if report.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            // The report carries its own `success` flag and top-level
            // message/batch/stats, so it goes out as the body unwrapped.
            (status, Json(report)).into_response()
        }
        Err(e) => {
            error!("import failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// GET /api/students - Paginated roster listing with filters
async fn get_students(
    State(state): State<AppState>,
    Query(query): Query<StudentQuery>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match list_students(&conn, &query) {
        Ok(page) => (StatusCode::OK, Json(ApiResponse::ok(page))).into_response(),
        Err(e) => {
            error!("listing students: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// DELETE /api/students/:id - Remove one student
async fn remove_student(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match delete_student(&conn, id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok(id))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("no student with id {}", id))),
        )
            .into_response(),
        Err(e) => {
            error!("deleting student {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// GET /api/students/template - Download the CSV import template
async fn download_template() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", TEMPLATE_FILE_NAME),
            ),
        ],
        template_csv(),
    )
}

/// GET /api/batches - All upload batches, newest first
async fn get_batches(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match list_batches(&conn) {
        Ok(batches) => (StatusCode::OK, Json(ApiResponse::ok(batches))).into_response(),
        Err(e) => {
            error!("listing batches: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Cascade delete response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchDeleteResponse {
    batch_id: String,
    students_deleted: usize,
}

/// DELETE /api/batches/:id - Remove a batch and every student it owns
async fn remove_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match delete_batch(&conn, &id) {
        Ok(Some(students_deleted)) => {
            info!("deleted batch {} and {} students", id, students_deleted);
            (
                StatusCode::OK,
                Json(ApiResponse::ok(BatchDeleteResponse {
                    batch_id: id,
                    students_deleted,
                })),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("no batch with id {}", id))),
        )
            .into_response(),
        Err(e) => {
            error!("deleting batch {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("🏫 School Roster System - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("ROSTER_DB").unwrap_or_else(|_| "school_roster.db".to_string());

    let conn = Connection::open(&db_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to set up schema");
    println!("✓ Database ready: {}", db_path);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/students", get(get_students))
        .route("/students/import", post(import_students))
        .route("/students/template", get(download_template))
        .route("/students/:id", delete(remove_student))
        .route("/batches", get(get_batches))
        .route("/batches/:id", delete(remove_batch))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Import:   POST http://localhost:3000/api/students/import");
    println!("   Roster:   GET  http://localhost:3000/api/students");
    println!("   Template: GET  http://localhost:3000/api/students/template");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_failed_import_body_reports_failure_at_top_level() {
        let conn = test_conn();
        let report =
            import_spreadsheet(&conn, "roster.pdf", b"not a roster", DuplicatePolicy::Skip)
                .unwrap();

        // The import handler sends the report as the whole response body:
        // `success` and `message` must sit at the top level, not nested.
        let body = serde_json::to_value(&report).unwrap();

        assert_eq!(body["success"], serde_json::json!(false));
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("unsupported file format"));
        assert!(body.get("data").is_none());
        assert_eq!(body["batch"]["status"], serde_json::json!("failed"));
        assert_eq!(body["stats"]["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_successful_import_body_shape() {
        let conn = test_conn();
        let csv = "admissionNumber,firstName,lastName,form\n1001,John,Doe,Form 1\n";
        let report =
            import_spreadsheet(&conn, "roster.csv", csv.as_bytes(), DuplicatePolicy::Skip)
                .unwrap();

        let body = serde_json::to_value(&report).unwrap();

        assert_eq!(body["success"], serde_json::json!(true));
        assert_eq!(body["summary"]["new"], serde_json::json!(1));
        assert_eq!(body["stats"]["totalRows"], serde_json::json!(1));
        assert_eq!(body["batch"]["status"], serde_json::json!("completed"));
    }
}
