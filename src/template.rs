// 📋 Roster Template - the canonical CSV header for bulk uploads

use csv::WriterBuilder;

/// Column headers, in the order the importer documents them.
pub const ROSTER_HEADERS: [&str; 10] = [
    "admissionNumber",
    "firstName",
    "middleName",
    "lastName",
    "form",
    "stream",
    "dateOfBirth",
    "gender",
    "parentPhone",
    "email",
];

/// Sample row shipped with the template so the expected value shapes are
/// visible without reading any docs.
const SAMPLE_ROW: [&str; 10] = [
    "1001",
    "John",
    "Peter",
    "Doe",
    "Form 1",
    "East",
    "2008-05-15",
    "Male",
    "+254712345678",
    "parent@example.com",
];

/// Build the downloadable CSV template: header row plus one sample row.
pub fn template_csv() -> String {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    // Writing string slices to an in-memory Vec cannot fail
    writer.write_record(ROSTER_HEADERS).ok();
    writer.write_record(SAMPLE_ROW).ok();

    let bytes = writer.into_inner().unwrap_or_default();
    String::from_utf8(bytes).unwrap_or_default()
}

/// Filename suggested in the download response
pub const TEMPLATE_FILE_NAME: &str = "student_import_template.csv";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::{parse_rows, FileFormat};

    #[test]
    fn test_template_parses_back_through_the_importer() {
        let csv = template_csv();
        let rows = parse_rows(csv.as_bytes(), FileFormat::Csv).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("admissionNumber"), Some("1001"));
        assert_eq!(rows[0].get("form"), Some("Form 1"));
        assert_eq!(rows[0].get("email"), Some("parent@example.com"));
    }

    #[test]
    fn test_template_has_every_column() {
        let csv = template_csv();
        let header_line = csv.lines().next().unwrap();

        for header in ROSTER_HEADERS {
            assert!(header_line.contains(header), "missing column {}", header);
        }
    }
}
