use anyhow::anyhow;
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{arr2, Array1, Array2};

use crate::models::PerformanceRecord;

/// Logistic-regression pass/fail model over (marks, attendance) rows,
/// trained once at startup and shared as app data.
pub struct PassModel {
    fitted: FittedLogisticRegression<f64, bool>,
    pub accuracy: f64,
}

impl PassModel {
    /// Probability that a student with these averages passes.
    pub fn pass_probability(&self, marks: f64, attendance: f64) -> f64 {
        let features = arr2(&[[marks, attendance]]);
        let prediction = self.fitted.predict(&features);
        let probabilities = self.fitted.predict_probabilities(&features);
        if prediction[0] {
            probabilities[0]
        } else {
            1.0 - probabilities[0]
        }
    }
}

fn calculate_accuracy(predictions: &Array1<bool>, targets: &Array1<bool>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .filter(|(&predicted, &actual)| predicted == actual)
        .count() as f64
        / targets.len() as f64
}

/// Builds the (marks, attendance) feature matrix, padding with synthetic
/// anchor rows when the stored data does not contain at least two examples
/// of each class. Logistic regression cannot be fit on a single class.
fn training_matrix(records: &[PerformanceRecord], pass_mark: f64) -> (Array2<f64>, Array1<bool>) {
    let mut rows: Vec<[f64; 2]> = records.iter().map(|r| [r.marks, r.attendance]).collect();
    let mut targets: Vec<bool> = records.iter().map(|r| r.marks >= pass_mark).collect();

    let pass_count = targets.iter().filter(|&&t| t).count();
    let fail_count = targets.len() - pass_count;

    if pass_count < 2 || fail_count < 2 {
        tracing::warn!(
            pass_count,
            fail_count,
            "padding training data with synthetic anchor rows"
        );
        let anchors: [([f64; 2], bool); 4] = [
            ([15.0, 40.0], false),
            ([25.0, 55.0], false),
            ([85.0, 95.0], true),
            ([90.0, 90.0], true),
        ];
        for (row, target) in anchors {
            rows.push(row);
            targets.push(target);
        }
    }

    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let features = Array2::from_shape_vec((rows.len(), 2), flat)
        .expect("row-major (n, 2) matrix from n rows of 2");
    (features, Array1::from_vec(targets))
}

pub fn train_pass_model(records: &[PerformanceRecord], pass_mark: f64) -> anyhow::Result<PassModel> {
    let (features, targets) = training_matrix(records, pass_mark);

    let dataset = Dataset::new(features.clone(), targets.clone());
    let fitted = LogisticRegression::default()
        .max_iterations(100)
        .fit(&dataset)
        .map_err(|e| anyhow!("failed to train pass model: {e}"))?;

    let predictions = fitted.predict(&features);
    let accuracy = calculate_accuracy(&predictions, &targets);

    Ok(PassModel { fitted, accuracy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(marks: f64, attendance: f64) -> PerformanceRecord {
        PerformanceRecord {
            student_id: "STU001".to_string(),
            subject: "Maths".to_string(),
            semester: "1".to_string(),
            marks,
            attendance,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn trains_on_empty_store_via_synthetic_anchors() {
        let model = train_pass_model(&[], 40.0).unwrap();
        assert!(model.accuracy > 0.0);
    }

    #[test]
    fn separates_strong_and_weak_students() {
        let records = vec![
            record(20.0, 45.0),
            record(25.0, 50.0),
            record(30.0, 55.0),
            record(80.0, 90.0),
            record(85.0, 92.0),
            record(90.0, 95.0),
        ];
        let model = train_pass_model(&records, 40.0).unwrap();
        let strong = model.pass_probability(88.0, 93.0);
        let weak = model.pass_probability(22.0, 48.0);
        assert!(strong > weak);
        assert!((0.0..=1.0).contains(&strong));
        assert!((0.0..=1.0).contains(&weak));
    }

    #[test]
    fn accuracy_counts_matching_predictions() {
        let predictions = Array1::from_vec(vec![true, true, false, true]);
        let targets = Array1::from_vec(vec![true, false, false, true]);
        assert!((calculate_accuracy(&predictions, &targets) - 0.75).abs() < 1e-9);
    }
}
