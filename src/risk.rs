use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{AggregateStat, Grade, PerformanceRecord, RiskAssessment, RiskLevel};

/// Threshold policy for risk classification. Defaults follow the most common
/// convention in the dashboards this service consolidates (35/40 marks,
/// 70/75 attendance); deployments that used other cutoffs override these in
/// config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Below this marks average a student is High risk outright.
    pub high_marks: f64,
    /// Below this marks average (but at or above high_marks) is Medium risk.
    pub low_marks: f64,
    /// Below this attendance a student is High risk outright.
    pub high_attendance: f64,
    /// Below this attendance (but at or above high_attendance) is Medium risk.
    pub low_attendance: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_marks: 35.0,
            low_marks: 40.0,
            high_attendance: 70.0,
            low_attendance: 75.0,
        }
    }
}

impl RiskPolicy {
    pub fn classify(&self, marks: f64, attendance: f64) -> RiskLevel {
        if marks < self.high_marks || attendance < self.high_attendance {
            RiskLevel::High
        } else if marks < self.low_marks || attendance < self.low_attendance {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Numeric risk score, 0-100, higher is worse.
    ///
    /// Scoring formula (the source dashboards disagreed, so this is the
    /// documented choice): 1.5 points per mark of deficit below the low-marks
    /// cutoff plus 1 point per percent of attendance deficit below the
    /// low-attendance cutoff, clamped to 0-100. Deficits are floored at zero
    /// independently, which keeps the score monotonic in both inputs and pins
    /// Low-risk pairs at exactly 0.
    pub fn score(&self, marks: f64, attendance: f64) -> f64 {
        let marks_deficit = (self.low_marks - marks).max(0.0);
        let attendance_deficit = (self.low_attendance - attendance).max(0.0);
        (marks_deficit * 1.5 + attendance_deficit).clamp(0.0, 100.0)
    }

    pub fn assess(&self, stat: &AggregateStat) -> RiskAssessment {
        RiskAssessment {
            key: stat.key.clone(),
            risk_score: self.score(stat.average_marks, stat.average_attendance),
            risk_level: self.classify(stat.average_marks, stat.average_attendance),
        }
    }
}

/// Grade bands for display. The alternate 75/60/50/40 scheme some pages used
/// is reachable purely through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradePolicy {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for GradePolicy {
    fn default() -> Self {
        Self {
            a: 85.0,
            b: 70.0,
            c: 60.0,
            d: 50.0,
        }
    }
}

impl GradePolicy {
    pub fn grade(&self, marks: f64) -> Grade {
        if marks >= self.a {
            Grade::A
        } else if marks >= self.b {
            Grade::B
        } else if marks >= self.c {
            Grade::C
        } else if marks >= self.d {
            Grade::D
        } else {
            Grade::F
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRollup {
    pub total_students: usize,
    pub total_subjects: usize,
    pub average_marks: f64,
    pub average_attendance: f64,
    /// Percentage of rows at or above the pass mark, 0-100.
    pub pass_rate: f64,
    pub health_score: f64,
    pub health_status: String,
}

fn health_status(score: f64, has_data: bool) -> String {
    if !has_data {
        "No Data".to_string()
    } else if score >= 75.0 {
        "Healthy".to_string()
    } else if score >= 50.0 {
        "Monitor".to_string()
    } else {
        "Critical".to_string()
    }
}

/// Institution-wide rollup over all rows. Means are simple means over rows,
/// not weighted per student. Empty input returns all zeros rather than
/// dividing by zero.
pub fn class_rollup(records: &[PerformanceRecord], pass_mark: f64) -> ClassRollup {
    if records.is_empty() {
        return ClassRollup {
            total_students: 0,
            total_subjects: 0,
            average_marks: 0.0,
            average_attendance: 0.0,
            pass_rate: 0.0,
            health_score: 0.0,
            health_status: health_status(0.0, false),
        };
    }

    let count = records.len() as f64;
    let students: HashSet<&str> = records.iter().map(|r| r.student_id.as_str()).collect();
    let subjects: HashSet<&str> = records.iter().map(|r| r.subject.as_str()).collect();
    let average_marks = records.iter().map(|r| r.marks).sum::<f64>() / count;
    let average_attendance = records.iter().map(|r| r.attendance).sum::<f64>() / count;
    let passed = records.iter().filter(|r| r.marks >= pass_mark).count();
    let pass_rate = passed as f64 / count * 100.0;
    let health_score = average_marks * 0.7 + average_attendance * 0.3;

    ClassRollup {
        total_students: students.len(),
        total_subjects: subjects.len(),
        average_marks,
        average_attendance,
        pass_rate,
        health_score,
        health_status: health_status(health_score, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate_by, by_student};
    use chrono::Utc;

    fn record(student: &str, marks: f64, attendance: f64) -> PerformanceRecord {
        PerformanceRecord {
            student_id: student.to_string(),
            subject: "Maths".to_string(),
            semester: "1".to_string(),
            marks,
            attendance,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn classification_follows_default_thresholds() {
        let policy = RiskPolicy::default();
        assert_eq!(policy.classify(30.0, 90.0), RiskLevel::High);
        assert_eq!(policy.classify(90.0, 65.0), RiskLevel::High);
        assert_eq!(policy.classify(37.0, 80.0), RiskLevel::Medium);
        assert_eq!(policy.classify(50.0, 72.0), RiskLevel::Medium);
        assert_eq!(policy.classify(40.0, 75.0), RiskLevel::Low);
        assert_eq!(policy.classify(90.0, 95.0), RiskLevel::Low);
    }

    #[test]
    fn score_is_zero_for_low_risk_and_clamped() {
        let policy = RiskPolicy::default();
        assert_eq!(policy.score(40.0, 75.0), 0.0);
        assert_eq!(policy.score(95.0, 99.0), 0.0);
        assert_eq!(policy.score(0.0, 0.0), 100.0);
        let score = policy.score(30.0, 65.0);
        assert!((score - (10.0 * 1.5 + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotonic_in_marks_and_attendance() {
        let policy = RiskPolicy::default();
        let marks_steps: Vec<f64> = (0..=20).map(|i| i as f64 * 5.0).collect();
        for window in marks_steps.windows(2) {
            // lower marks must never score lower
            assert!(policy.score(window[0], 80.0) >= policy.score(window[1], 80.0));
            assert!(policy.score(50.0, window[0]) >= policy.score(50.0, window[1]));
        }
    }

    #[test]
    fn spec_example_two_students() {
        let records = vec![record("STU001", 30.0, 65.0), record("STU002", 90.0, 95.0)];
        let rollup = class_rollup(&records, 40.0);
        assert!((rollup.average_marks - 60.0).abs() < 1e-9);

        let policy = RiskPolicy::default();
        let stats = aggregate_by(&records, by_student);
        let levels: Vec<RiskLevel> = stats.iter().map(|s| policy.assess(s).risk_level).collect();
        assert_eq!(levels, vec![RiskLevel::High, RiskLevel::Low]);
    }

    #[test]
    fn empty_rollup_is_all_zeros_without_panicking() {
        let rollup = class_rollup(&[], 40.0);
        assert_eq!(rollup.total_students, 0);
        assert_eq!(rollup.average_marks, 0.0);
        assert_eq!(rollup.pass_rate, 0.0);
        assert_eq!(rollup.health_status, "No Data");
    }

    #[test]
    fn rollup_counts_and_health() {
        let records = vec![
            record("STU001", 80.0, 90.0),
            record("STU002", 20.0, 50.0),
            PerformanceRecord {
                subject: "Physics".to_string(),
                ..record("STU001", 60.0, 70.0)
            },
        ];
        let rollup = class_rollup(&records, 40.0);
        assert_eq!(rollup.total_students, 2);
        assert_eq!(rollup.total_subjects, 2);
        assert!((rollup.pass_rate - (2.0 / 3.0 * 100.0)).abs() < 1e-9);
        let expected = rollup.average_marks * 0.7 + rollup.average_attendance * 0.3;
        assert!((rollup.health_score - expected).abs() < 1e-9);
    }

    #[test]
    fn grade_mapping_default_cutoffs() {
        let grading = GradePolicy::default();
        assert_eq!(grading.grade(85.0), Grade::A);
        assert_eq!(grading.grade(69.0), Grade::C);
        assert_eq!(grading.grade(70.0), Grade::B);
        assert_eq!(grading.grade(55.0), Grade::D);
        assert_eq!(grading.grade(20.0), Grade::F);
    }

    #[test]
    fn grade_mapping_alternate_cutoffs() {
        let grading = GradePolicy {
            a: 75.0,
            b: 60.0,
            c: 50.0,
            d: 40.0,
        };
        assert_eq!(grading.grade(69.0), Grade::B);
        assert_eq!(grading.grade(45.0), Grade::D);
    }
}
