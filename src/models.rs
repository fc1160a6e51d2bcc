use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One subject/semester performance observation for a student.
/// Immutable once ingested; only ever aggregated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub student_id: String,
    pub subject: String,
    pub semester: String,
    pub marks: f64,
    pub attendance: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Mean marks/attendance over one group of records. Derived on every read,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub key: String,
    pub average_marks: f64,
    pub average_attendance: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub key: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Semester {
    pub id: i64,
    pub name: String,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: i64,
    pub roll_number: String,
    pub name: String,
    pub department: String,
    pub section: String,
    pub batch: String,
}
