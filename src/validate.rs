// ✅ Row Validator - raw roster rows → normalized student candidates
//
// Pure function of (row, admission-numbers-seen-so-far). Classifies each row
// as a normalized candidate ready for reconciliation or a RowError naming the
// field and row position. Never touches the store.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RowError;
use crate::spreadsheet::RosterRow;

// ============================================================================
// ENUMERATED VALUES
// ============================================================================

/// Form/grade level - the four recognized values, exact match after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormLevel {
    Form1,
    Form2,
    Form3,
    Form4,
}

impl FormLevel {
    pub fn parse(value: &str) -> Option<FormLevel> {
        match value.trim() {
            "Form 1" => Some(FormLevel::Form1),
            "Form 2" => Some(FormLevel::Form2),
            "Form 3" => Some(FormLevel::Form3),
            "Form 4" => Some(FormLevel::Form4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormLevel::Form1 => "Form 1",
            FormLevel::Form2 => "Form 2",
            FormLevel::Form3 => "Form 3",
            FormLevel::Form4 => "Form 4",
        }
    }
}

/// Gender, parsed loosely. The import never rejects a row over gender:
/// unrecognized non-empty values land on `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn parse_loose(value: &str) -> Option<Gender> {
        match value.trim().to_lowercase().as_str() {
            "" => None,
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            _ => Some(Gender::Other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Gender> {
        match value {
            "Male" => Some(Gender::Male),
            "Female" => Some(Gender::Female),
            "Other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Student lifecycle status. Imports always produce `Active`; the other
/// states are set through the regular CRUD surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
            StudentStatus::Graduated => "graduated",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<StudentStatus> {
        match value {
            "active" => Some(StudentStatus::Active),
            "inactive" => Some(StudentStatus::Inactive),
            "graduated" => Some(StudentStatus::Graduated),
            _ => None,
        }
    }
}

// ============================================================================
// STUDENT CANDIDATE
// ============================================================================

/// A normalized row, ready for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentCandidate {
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
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Date formats accepted for dateOfBirth
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value.trim(), fmt).ok())
}

fn required<'a>(row: &'a RosterRow, field: &str) -> Result<&'a str, RowError> {
    row.get(field).ok_or_else(|| {
        RowError::validation(row.row, format!("missing required field '{}'", field))
    })
}

/// Validate and normalize one raw row.
///
/// `seen` accumulates admission numbers already accepted from this file -
/// first occurrence wins, later occurrences are rejected so the same upload
/// can never race against itself.
pub fn validate_row(
    row: &RosterRow,
    seen: &mut HashSet<String>,
) -> Result<StudentCandidate, RowError> {
    let admission_number = required(row, "admissionNumber")?.to_string();
    let first_name = required(row, "firstName")?.to_string();
    let last_name = required(row, "lastName")?.to_string();
    let form_value = required(row, "form")?;

    let form = FormLevel::parse(form_value).ok_or_else(|| {
        RowError::validation(
            row.row,
            format!(
                "invalid form value '{}' (expected one of: Form 1, Form 2, Form 3, Form 4)",
                form_value
            ),
        )
    })?;

    // Unparseable date of birth rejects the whole row; one rule everywhere
    // beats a field that is silently null on some code paths.
    let date_of_birth = match row.get("dateOfBirth") {
        Some(value) => Some(parse_date(value).ok_or_else(|| {
            RowError::validation(
                row.row,
                format!("invalid dateOfBirth '{}' (expected YYYY-MM-DD)", value),
            )
        })?),
        None => None,
    };

    if !seen.insert(admission_number.clone()) {
        return Err(RowError::validation(
            row.row,
            format!("duplicate admission number '{}' within file", admission_number),
        ));
    }

    // Phone and email are passed through with light trimming only; the
    // source imposes no format and tightening it would change behavior.
    Ok(StudentCandidate {
        admission_number,
        first_name,
        middle_name: row.get("middleName").map(str::to_string),
        last_name,
        form,
        stream: row.get("stream").map(str::to_string),
        date_of_birth,
        gender: row.get("gender").and_then(Gender::parse_loose),
        parent_phone: row.get("parentPhone").map(str::to_string),
        email: row.get("email").map(str::to_string),
        status: StudentStatus::Active,
    })
}

// ============================================================================
// TESTS
// ============================================================================
