use crate::error::ApiError;
use crate::models::AggregateStat;
use crate::risk::RiskPolicy;

/// Serializes per-student aggregates, with their risk assessment, into a CSV
/// document for download. XLSX stays with the front-end tooling.
pub fn aggregates_to_csv(stats: &[AggregateStat], policy: &RiskPolicy) -> Result<Vec<u8>, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "key",
            "average_marks",
            "average_attendance",
            "count",
            "risk_score",
            "risk_level",
        ])
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {e}")))?;

    for stat in stats {
        let assessment = policy.assess(stat);
        writer
            .write_record([
                stat.key.as_str(),
                &format!("{:.2}", stat.average_marks),
                &format!("{:.2}", stat.average_attendance),
                &stat.count.to_string(),
                &format!("{:.2}", assessment.risk_score),
                assessment.risk_level.as_str(),
            ])
            .map_err(|e| ApiError::Internal(format!("CSV export failed: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {e}")))
}
