use serde::Deserialize;
use thiserror::Error;

use crate::error::ApiError;

pub const REQUIRED_HEADERS: [&str; 5] = ["student_id", "subject", "semester", "marks", "attendance"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Empty upload")]
    Empty,
    #[error("Invalid CSV headers. Expected {expected:?}, got {got:?}")]
    BadHeader { expected: Vec<String>, got: Vec<String> },
    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// One parsed performance row. Marks and attendance are validated to the
/// 0-100 range by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRow {
    pub student_id: String,
    pub subject: String,
    pub semester: String,
    pub marks: f64,
    pub attendance: f64,
}

#[derive(Debug)]
pub struct IngestReport {
    pub rows: Vec<PerformanceRow>,
    /// Rows dropped for parse or range errors. Bad rows are skipped, never fatal.
    pub skipped: usize,
}

/// Admin bulk-student CSV row.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkStudentRow {
    pub roll_number: String,
    pub name: String,
    pub department: String,
    pub section: String,
    pub batch: String,
    pub password: String,
}

/// Exported spreadsheets in the wild use either comma or semicolon. Treat
/// the file as semicolon-delimited only when the header line has semicolons
/// and no commas.
fn sniff_delimiter(first_line: &str) -> u8 {
    if first_line.contains(';') && !first_line.contains(',') {
        b';'
    } else {
        b','
    }
}

fn in_range(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

/// Parses an uploaded performance CSV. Headers must match REQUIRED_HEADERS
/// exactly (case-insensitive, BOM tolerated); individual rows that fail to
/// parse are counted and skipped.
pub fn parse_performance_csv(bytes: &[u8]) -> Result<IngestReport, IngestError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let first_line = text.lines().next().ok_or(IngestError::Empty)?;
    let delimiter = sniff_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    if headers != REQUIRED_HEADERS {
        return Err(IngestError::BadHeader {
            expected: REQUIRED_HEADERS.iter().map(|h| h.to_string()).collect(),
            got: headers,
        });
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if record.len() != REQUIRED_HEADERS.len() {
            skipped += 1;
            continue;
        }

        let marks = record[3].parse::<f64>();
        let attendance = record[4].parse::<f64>();
        match (marks, attendance) {
            (Ok(marks), Ok(attendance))
                if in_range(marks) && in_range(attendance) && !record[0].is_empty() =>
            {
                rows.push(PerformanceRow {
                    student_id: record[0].to_string(),
                    subject: record[1].to_string(),
                    semester: record[2].to_string(),
                    marks,
                    attendance,
                });
            }
            _ => skipped += 1,
        }
    }

    Ok(IngestReport { rows, skipped })
}

/// Parses the admin bulk-student CSV. Rows that fail to deserialize are
/// skipped, matching the tolerance of the performance upload.
pub fn parse_bulk_students_csv(bytes: &[u8]) -> Result<Vec<BulkStudentRow>, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in reader.deserialize::<BulkStudentRow>() {
        match result {
            Ok(row) => rows.push(row),
            Err(_) => continue,
        }
    }
    Ok(rows)
}
