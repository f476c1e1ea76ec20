use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

use super::{new_id, round_to};
use crate::models::{
    AnomalyAlgorithm, AnomalyDetection, AnomalyExplanation, AnomalyRecord, ColumnAnomalySummary,
    DetectionStatus, FeatureContribution, Source,
};

/// Rows a mock detection pretends to scan at most.
const MAX_SCANNED_ROWS: u64 = 50_000;
/// Flagged rows returned inline with a detection.
const MAX_INLINE_ANOMALIES: usize = 50;

/// Rows a detection over `source` analyses.
pub fn scanned_rows(source: &Source) -> u64 {
    source.row_count.clamp(100, MAX_SCANNED_ROWS)
}

/// Draw `count` distinct row indices below `total_rows`.
pub fn anomaly_indices(rng: &mut impl Rng, total_rows: u64, count: usize) -> BTreeSet<u64> {
    let count = count.min(total_rows as usize);
    let mut indices = BTreeSet::new();
    while indices.len() < count {
        indices.insert(rng.random_range(0..total_rows));
    }
    indices
}

/// Plausible values for a flagged row.
pub fn column_values(rng: &mut impl Rng, columns: &[String]) -> BTreeMap<String, f64> {
    columns
        .iter()
        .map(|c| (c.clone(), round_to(rng.random_range(-500.0..5_000.0), 2)))
        .collect()
}

/// A finished detection run of `algorithm` over `columns` of `source`.
pub fn detection(
    rng: &mut impl Rng,
    source: &Source,
    algorithm: AnomalyAlgorithm,
    columns: &[String],
    config: serde_json::Value,
) -> AnomalyDetection {
    let total_rows = scanned_rows(source);
    let rate = rng.random_range(0.005..0.08);
    let anomaly_count = ((total_rows as f64) * rate).round().max(1.0) as u64;
    let indices = anomaly_indices(rng, total_rows, anomaly_count as usize);

    let anomalies: Vec<AnomalyRecord> = indices
        .iter()
        .take(MAX_INLINE_ANOMALIES)
        .map(|&row_index| AnomalyRecord {
            row_index,
            anomaly_score: round_to(rng.random_range(0.6..1.0), 4),
            column_values: column_values(rng, columns),
            is_anomaly: true,
        })
        .collect();

    let column_summaries = columns
        .iter()
        .map(|column| {
            let flagged = rng.random_range(0..=anomaly_count);
            let min_value = round_to(rng.random_range(-500.0..0.0), 2);
            ColumnAnomalySummary {
                column: column.clone(),
                dtype: "float64".to_string(),
                anomaly_count: flagged,
                anomaly_rate: round_to(flagged as f64 / total_rows as f64, 6),
                mean_anomaly_score: round_to(rng.random_range(0.55..0.95), 4),
                min_value,
                max_value: round_to(min_value + rng.random_range(100.0..10_000.0), 2),
                top_anomaly_indices: indices.iter().take(5).copied().collect(),
            }
        })
        .collect();

    let duration_ms = rng.random_range(120..8_000);
    let completed_at = Utc::now();
    let started_at = completed_at - Duration::milliseconds(duration_ms as i64);

    AnomalyDetection {
        id: new_id(rng),
        source_id: source.id.clone(),
        status: DetectionStatus::Success,
        algorithm,
        config,
        total_rows,
        anomaly_count,
        anomaly_rate: round_to(anomaly_count as f64 / total_rows as f64, 6),
        columns_analyzed: columns.to_vec(),
        column_summaries,
        anomalies,
        duration_ms,
        error_message: None,
        created_at: started_at,
        started_at: Some(started_at),
        completed_at: Some(completed_at),
    }
}

/// Shift a detection's timestamps so the run finished at `completed_at`.
pub fn finished_at(mut detection: AnomalyDetection, completed_at: DateTime<Utc>) -> AnomalyDetection {
    let started_at = completed_at - Duration::milliseconds(detection.duration_ms as i64);
    detection.created_at = started_at;
    detection.started_at = Some(started_at);
    detection.completed_at = Some(completed_at);
    detection
}

/// A detection run that failed before producing results.
pub fn failed_detection(
    rng: &mut impl Rng,
    source: &Source,
    algorithm: AnomalyAlgorithm,
    message: impl Into<String>,
) -> AnomalyDetection {
    let now = Utc::now();
    AnomalyDetection {
        id: new_id(rng),
        source_id: source.id.clone(),
        status: DetectionStatus::Error,
        algorithm,
        config: serde_json::Value::Null,
        total_rows: 0,
        anomaly_count: 0,
        anomaly_rate: 0.0,
        columns_analyzed: Vec::new(),
        column_summaries: Vec::new(),
        anomalies: Vec::new(),
        duration_ms: rng.random_range(10..500),
        error_message: Some(message.into()),
        created_at: now,
        started_at: Some(now),
        completed_at: Some(now),
    }
}

/// SHAP-style explanation of one row of a detection.
///
/// Contributions are sorted by absolute SHAP value and normalised so
/// `contribution` sums to 1 across the returned features.
pub fn explanation(
    rng: &mut impl Rng,
    detection: &AnomalyDetection,
    row_index: u64,
    max_features: usize,
) -> AnomalyExplanation {
    let inline = detection
        .anomalies
        .iter()
        .find(|a| a.row_index == row_index);
    let anomaly_score = inline
        .map(|a| a.anomaly_score)
        .unwrap_or_else(|| round_to(rng.random_range(0.5..1.0), 4));

    let mut raw: Vec<(String, f64, f64)> = detection
        .columns_analyzed
        .iter()
        .map(|feature| {
            let value = inline
                .and_then(|a| a.column_values.get(feature).copied())
                .unwrap_or_else(|| round_to(rng.random_range(-500.0..5_000.0), 2));
            (feature.clone(), value, round_to(rng.random_range(-0.5..0.8), 4))
        })
        .collect();
    raw.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
    raw.truncate(max_features.max(1));

    let mass: f64 = raw.iter().map(|(_, _, shap)| shap.abs()).sum();
    let feature_contributions: Vec<FeatureContribution> = raw
        .into_iter()
        .map(|(feature, value, shap_value)| FeatureContribution {
            contribution: if mass > 0.0 {
                round_to(shap_value.abs() / mass, 4)
            } else {
                0.0
            },
            feature,
            value,
            shap_value,
        })
        .collect();
    let total_shap = round_to(feature_contributions.iter().map(|f| f.shap_value).sum(), 4);

    let summary = match feature_contributions.first() {
        Some(top) => format!(
            "Row {} is anomalous mainly because of '{}' ({:.0}% of the explanation).",
            row_index,
            top.feature,
            top.contribution * 100.0
        ),
        None => format!("Row {} has no analysed features to explain.", row_index),
    };

    AnomalyExplanation {
        id: new_id(rng),
        detection_id: detection.id.clone(),
        row_index,
        anomaly_score,
        feature_contributions,
        total_shap,
        summary,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factories::source;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_detection_rates_are_consistent() {
        let mut rng = StdRng::seed_from_u64(9);
        let src = source(&mut rng, 0);
        let columns = src.numeric_columns();
        let d = detection(
            &mut rng,
            &src,
            AnomalyAlgorithm::Lof,
            &columns,
            serde_json::json!({}),
        );
        assert_eq!(d.status, DetectionStatus::Success);
        assert!(d.anomaly_count >= 1);
        assert!(d.anomaly_count <= d.total_rows);
        let expected = d.anomaly_count as f64 / d.total_rows as f64;
        assert!((d.anomaly_rate - expected).abs() < 1e-5);
        assert!(d.anomalies.len() <= MAX_INLINE_ANOMALIES);
        assert_eq!(d.column_summaries.len(), columns.len());
    }

    #[test]
    fn test_finished_at_keeps_duration() {
        let mut rng = StdRng::seed_from_u64(5);
        let src = source(&mut rng, 0);
        let d = detection(
            &mut rng,
            &src,
            AnomalyAlgorithm::Lof,
            &src.numeric_columns(),
            serde_json::json!({}),
        );
        let when = Utc::now() - Duration::days(3);
        let moved = finished_at(d.clone(), when);
        assert_eq!(moved.completed_at, Some(when));
        assert_eq!(moved.created_at, when - Duration::milliseconds(d.duration_ms as i64));
        assert_eq!(moved.started_at, Some(moved.created_at));
        assert_eq!(moved.id, d.id);
    }

    #[test]
    fn test_failed_detection_has_no_results() {
        let mut rng = StdRng::seed_from_u64(6);
        let src = source(&mut rng, 0);
        let d = failed_detection(&mut rng, &src, AnomalyAlgorithm::Dbscan, "boom");
        assert_eq!(d.status, DetectionStatus::Error);
        assert_eq!(d.error_message.as_deref(), Some("boom"));
        assert!(d.anomalies.is_empty());
    }

    #[test]
    fn test_anomaly_indices_are_distinct_and_bounded() {
        let mut rng = StdRng::seed_from_u64(2);
        let idx = anomaly_indices(&mut rng, 50, 200);
        assert_eq!(idx.len(), 50);
        assert!(idx.iter().all(|&i| i < 50));
    }

    #[test]
    fn test_explanation_contributions_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(4);
        let src = source(&mut rng, 1);
        let d = detection(
            &mut rng,
            &src,
            AnomalyAlgorithm::IsolationForest,
            &src.numeric_columns(),
            serde_json::json!({}),
        );
        let row = d.anomalies[0].row_index;
        let e = explanation(&mut rng, &d, row, 10);
        let total: f64 = e.feature_contributions.iter().map(|f| f.contribution).sum();
        assert!((total - 1.0).abs() < 0.01, "total = {}", total);
        assert!(e.summary.contains(&row.to_string()));
    }
}
