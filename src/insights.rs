use ndarray::Array1;
use serde::Serialize;

use crate::model::PassModel;
use crate::models::{PerformanceRecord, RiskLevel};
use crate::risk::class_rollup;

/// Per-student feature vector driving the insight score, forecast, and
/// suggestions. Trends are least-squares slopes over the student's rows in
/// semester order.
#[derive(Debug, Clone, Serialize)]
pub struct StudentFeatures {
    pub average_marks: f64,
    pub attendance_rate: f64,
    pub failed_subjects: usize,
    pub marks_variance: f64,
    pub performance_trend: f64,
    pub attendance_trend: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentInsight {
    pub student_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub predicted_next_marks: f64,
    pub pass_probability: f64,
    pub features: StudentFeatures,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRanking {
    pub student_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectDifficulty {
    pub subject: String,
    pub average_marks: f64,
    /// Percentage of rows below the pass mark, 0-100.
    pub fail_rate: f64,
    pub difficulty_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassHealth {
    pub health_score: f64,
    pub status: String,
    pub predicted_marks: f64,
    pub pass_probability: f64,
    pub current_avg: f64,
}

/// Least-squares slope of values over their index, 0 for fewer than 2 points.
fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x = Array1::from_iter((0..n).map(|i| i as f64));
    let y = Array1::from_vec(values.to_vec());
    let x_mean = x.mean().unwrap_or(0.0);
    let y_mean = y.mean().unwrap_or(0.0);

    let covariance = ((&x - x_mean) * (&y - y_mean)).sum();
    let variance = (&x - x_mean).mapv(|v| v * v).sum();
    if variance == 0.0 {
        0.0
    } else {
        covariance / variance
    }
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Sorts a student's rows into semester order. Semesters are compared
/// numerically when both parse, falling back to string order, with
/// recorded_at as the tie-breaker.
fn sort_history(rows: &mut [PerformanceRecord]) {
    rows.sort_by(|a, b| {
        let numeric = match (a.semester.parse::<i64>(), b.semester.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.semester.cmp(&b.semester),
        };
        numeric.then(a.recorded_at.cmp(&b.recorded_at))
    });
}

pub fn build_student_features(history: &[PerformanceRecord], pass_mark: f64) -> StudentFeatures {
    let count = history.len() as f64;
    if history.is_empty() {
        return StudentFeatures {
            average_marks: 0.0,
            attendance_rate: 0.0,
            failed_subjects: 0,
            marks_variance: 0.0,
            performance_trend: 0.0,
            attendance_trend: 0.0,
        };
    }

    let marks: Vec<f64> = history.iter().map(|r| r.marks).collect();
    let attendance: Vec<f64> = history.iter().map(|r| r.attendance).collect();

    StudentFeatures {
        average_marks: marks.iter().sum::<f64>() / count,
        attendance_rate: attendance.iter().sum::<f64>() / count,
        failed_subjects: marks.iter().filter(|&&m| m < pass_mark).count(),
        marks_variance: sample_variance(&marks),
        performance_trend: trend_slope(&marks),
        attendance_trend: trend_slope(&attendance),
    }
}

/// Weighted insight score: marks deficit carries 40%, attendance deficit 30%,
/// plus 5 points per failed subject and a penalty for a declining trend.
/// Capped at 100. Bands: >= 70 High, >= 40 Medium, else Low.
pub fn insight_score(features: &StudentFeatures) -> (f64, RiskLevel) {
    let mut score = (100.0 - features.average_marks) * 0.4;
    score += (100.0 - features.attendance_rate) * 0.3;
    score += features.failed_subjects as f64 * 5.0;
    if features.performance_trend < 0.0 {
        score += features.performance_trend.abs() * 2.0;
    }
    let score = score.min(100.0);

    let level = if score >= 70.0 {
        RiskLevel::High
    } else if score >= 40.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    (score, level)
}

/// Next-semester marks forecast: linear extrapolation one step past the
/// fitted line, mean of marks when the history is too short to fit.
pub fn forecast_next_marks(history: &[PerformanceRecord]) -> f64 {
    let marks: Vec<f64> = history.iter().map(|r| r.marks).collect();
    let n = marks.len();
    if n == 0 {
        return 0.0;
    }
    let mean = marks.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return mean;
    }

    let slope = trend_slope(&marks);
    let x_mean = (n - 1) as f64 / 2.0;
    let intercept = mean - slope * x_mean;
    (intercept + slope * n as f64).clamp(0.0, 100.0)
}

pub fn generate_suggestions(features: &StudentFeatures) -> Vec<String> {
    let mut suggestions = Vec::new();

    if features.attendance_rate < 75.0 {
        suggestions.push("Improve attendance to at least 75%".to_string());
    }
    if features.average_marks < 50.0 {
        suggestions.push("Focus on improving low-performing subjects".to_string());
    }
    if features.failed_subjects > 0 {
        suggestions.push("Arrange remedial support for failed subjects".to_string());
    }
    if features.performance_trend < 0.0 {
        suggestions.push("Performance declining, schedule mentoring session".to_string());
    }
    if suggestions.is_empty() {
        suggestions.push("Performance stable. Continue consistent effort.".to_string());
    }

    suggestions
}

/// Full insight for one student, or None when the student has no rows.
pub fn student_insight(
    student_id: &str,
    records: &[PerformanceRecord],
    pass_mark: f64,
    pass_model: Option<&PassModel>,
) -> Option<StudentInsight> {
    let mut history: Vec<PerformanceRecord> = records
        .iter()
        .filter(|r| r.student_id == student_id)
        .cloned()
        .collect();
    if history.is_empty() {
        return None;
    }
    sort_history(&mut history);

    let features = build_student_features(&history, pass_mark);
    let (risk_score, risk_level) = insight_score(&features);
    let predicted_next_marks = forecast_next_marks(&history);
    let suggestions = generate_suggestions(&features);
    let pass_probability = pass_model
        .map(|m| m.pass_probability(features.average_marks, features.attendance_rate))
        .unwrap_or(0.0);

    Some(StudentInsight {
        student_id: student_id.to_string(),
        risk_score,
        risk_level,
        predicted_next_marks,
        pass_probability,
        features,
        suggestions,
    })
}

/// All students scored by the insight formula, worst first, top `limit`.
pub fn top_risk_students(
    records: &[PerformanceRecord],
    pass_mark: f64,
    limit: usize,
) -> Vec<RiskRanking> {
    let mut seen: Vec<&str> = Vec::new();
    for record in records {
        if !seen.contains(&record.student_id.as_str()) {
            seen.push(&record.student_id);
        }
    }

    let mut rankings: Vec<RiskRanking> = seen
        .into_iter()
        .map(|student_id| {
            let mut history: Vec<PerformanceRecord> = records
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect();
            sort_history(&mut history);
            let features = build_student_features(&history, pass_mark);
            let (risk_score, risk_level) = insight_score(&features);
            RiskRanking {
                student_id: student_id.to_string(),
                risk_score,
                risk_level,
            }
        })
        .collect();

    rankings.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rankings.truncate(limit);
    rankings
}

/// Subjects ranked hardest first: 60% weight on the marks deficit, 40% on
/// the fail rate.
pub fn subject_difficulty(records: &[PerformanceRecord], pass_mark: f64) -> Vec<SubjectDifficulty> {
    let stats = crate::aggregate::aggregate_by(records, crate::aggregate::by_subject);

    let mut subjects: Vec<SubjectDifficulty> = stats
        .into_iter()
        .map(|stat| {
            let failed = records
                .iter()
                .filter(|r| r.subject == stat.key && r.marks < pass_mark)
                .count();
            let fail_rate = failed as f64 / stat.count as f64 * 100.0;
            SubjectDifficulty {
                difficulty_score: (100.0 - stat.average_marks) * 0.6 + fail_rate * 0.4,
                subject: stat.key,
                average_marks: stat.average_marks,
                fail_rate,
            }
        })
        .collect();

    subjects.sort_by(|a, b| {
        b.difficulty_score
            .partial_cmp(&a.difficulty_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    subjects
}

pub fn class_health(records: &[PerformanceRecord], pass_mark: f64) -> ClassHealth {
    let rollup = class_rollup(records, pass_mark);
    let predicted_marks = if records.is_empty() {
        0.0
    } else {
        (rollup.average_marks + 2.0).min(100.0)
    };

    ClassHealth {
        health_score: rollup.health_score,
        status: rollup.health_status,
        predicted_marks,
        pass_probability: rollup.pass_rate,
        current_avg: rollup.average_marks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(student: &str, subject: &str, semester: &str, marks: f64, attendance: f64) -> PerformanceRecord {
        PerformanceRecord {
            student_id: student.to_string(),
            subject: subject.to_string(),
            semester: semester.to_string(),
            marks,
            attendance,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn trend_slope_fits_a_straight_line() {
        assert!((trend_slope(&[50.0, 55.0, 60.0, 65.0]) - 5.0).abs() < 1e-9);
        assert!((trend_slope(&[80.0, 70.0, 60.0]) + 10.0).abs() < 1e-9);
        assert_eq!(trend_slope(&[42.0]), 0.0);
        assert_eq!(trend_slope(&[]), 0.0);
    }

    #[test]
    fn features_count_failed_subjects_against_pass_mark() {
        let history = vec![
            record("STU001", "Maths", "1", 30.0, 60.0),
            record("STU001", "Physics", "1", 55.0, 80.0),
            record("STU001", "Chemistry", "1", 38.0, 70.0),
        ];
        let features = build_student_features(&history, 40.0);
        assert_eq!(features.failed_subjects, 2);
        assert!((features.average_marks - 41.0).abs() < 1e-9);
        assert!((features.attendance_rate - 70.0).abs() < 1e-9);
    }

    #[test]
    fn declining_trend_raises_insight_score() {
        let steady = StudentFeatures {
            average_marks: 60.0,
            attendance_rate: 80.0,
            failed_subjects: 0,
            marks_variance: 0.0,
            performance_trend: 0.0,
            attendance_trend: 0.0,
        };
        let declining = StudentFeatures {
            performance_trend: -5.0,
            ..steady.clone()
        };
        let (steady_score, _) = insight_score(&steady);
        let (declining_score, _) = insight_score(&declining);
        assert!((declining_score - steady_score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn insight_score_caps_at_100() {
        let features = StudentFeatures {
            average_marks: 0.0,
            attendance_rate: 0.0,
            failed_subjects: 10,
            marks_variance: 0.0,
            performance_trend: -20.0,
            attendance_trend: 0.0,
        };
        let (score, level) = insight_score(&features);
        assert_eq!(score, 100.0);
        assert_eq!(level, RiskLevel::High);
    }

    #[test]
    fn forecast_extrapolates_one_semester_ahead() {
        let history = vec![
            record("STU001", "Maths", "1", 50.0, 80.0),
            record("STU001", "Maths", "2", 60.0, 80.0),
            record("STU001", "Maths", "3", 70.0, 80.0),
        ];
        assert!((forecast_next_marks(&history) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn forecast_falls_back_to_mean_for_short_history() {
        let history = vec![record("STU001", "Maths", "1", 64.0, 80.0)];
        assert!((forecast_next_marks(&history) - 64.0).abs() < 1e-9);
        assert_eq!(forecast_next_marks(&[]), 0.0);
    }

    #[test]
    fn suggestions_cover_each_weakness() {
        let features = StudentFeatures {
            average_marks: 45.0,
            attendance_rate: 60.0,
            failed_subjects: 1,
            marks_variance: 10.0,
            performance_trend: -1.0,
            attendance_trend: 0.0,
        };
        let suggestions = generate_suggestions(&features);
        assert_eq!(suggestions.len(), 4);

        let healthy = StudentFeatures {
            average_marks: 85.0,
            attendance_rate: 95.0,
            failed_subjects: 0,
            marks_variance: 1.0,
            performance_trend: 0.5,
            attendance_trend: 0.0,
        };
        let suggestions = generate_suggestions(&healthy);
        assert_eq!(suggestions, vec!["Performance stable. Continue consistent effort."]);
    }

    #[test]
    fn student_insight_missing_student_is_none() {
        let records = vec![record("STU001", "Maths", "1", 50.0, 80.0)];
        assert!(student_insight("STU999", &records, 40.0, None).is_none());
    }

    #[test]
    fn top_risk_orders_worst_first_and_truncates() {
        let records = vec![
            record("GOOD", "Maths", "1", 90.0, 95.0),
            record("BAD", "Maths", "1", 20.0, 40.0),
            record("MID", "Maths", "1", 55.0, 75.0),
        ];
        let rankings = top_risk_students(&records, 40.0, 2);
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].student_id, "BAD");
        assert_eq!(rankings[0].risk_level, RiskLevel::High);
        assert!(rankings[0].risk_score >= rankings[1].risk_score);
    }

    #[test]
    fn subject_difficulty_ranks_hardest_first() {
        let records = vec![
            record("STU001", "Easy", "1", 90.0, 90.0),
            record("STU002", "Easy", "1", 85.0, 90.0),
            record("STU001", "Hard", "1", 30.0, 90.0),
            record("STU002", "Hard", "1", 45.0, 90.0),
        ];
        let subjects = subject_difficulty(&records, 40.0);
        assert_eq!(subjects[0].subject, "Hard");
        assert!((subjects[0].fail_rate - 50.0).abs() < 1e-9);
        assert!(subjects[0].difficulty_score > subjects[1].difficulty_score);
    }

    #[test]
    fn class_health_empty_store_reports_no_data() {
        let health = class_health(&[], 40.0);
        assert_eq!(health.health_score, 0.0);
        assert_eq!(health.status, "No Data");
        assert_eq!(health.predicted_marks, 0.0);
    }
}
