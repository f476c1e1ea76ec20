//! Side-by-side comparison of several algorithms on one source.

use chrono::{Duration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use super::{parse_algorithm, resolve_columns};
use crate::error::{ApiError, ApiResult};
use crate::factories::{self, round_to};
use crate::models::{
    AgreementLevel, AgreementRecord, AgreementSummary, AlgorithmComparisonResult,
    AlgorithmRunResult, AnomalyAlgorithm, DetectionStatus, Source,
};

/// Fewest algorithms a comparison accepts.
pub const MIN_ALGORITHMS: usize = 2;
/// Most algorithms a comparison accepts.
pub const MAX_ALGORITHMS: usize = 6;
/// Share of each later algorithm's anomalies reused from earlier sets.
const OVERLAP_RATIO: f64 = 0.3;
/// Agreement records returned with column values attached.
const MAX_RECORDS: usize = 200;

/// Body of a comparison request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareRequest {
    /// Algorithm names.
    pub algorithms: Vec<String>,
    /// Columns to analyse.
    pub columns: Option<Vec<String>>,
    /// Shared configuration.
    pub config: Option<Value>,
}

/// Parse and check the requested algorithm list.
pub fn validate_algorithms(names: &[String]) -> ApiResult<Vec<AnomalyAlgorithm>> {
    if names.len() < MIN_ALGORITHMS || names.len() > MAX_ALGORITHMS {
        return Err(ApiError::bad_request(format!(
            "Between {} and {} algorithms are required, got {}",
            MIN_ALGORITHMS,
            MAX_ALGORITHMS,
            names.len()
        )));
    }
    let mut seen = BTreeSet::new();
    names
        .iter()
        .map(|name| {
            let algorithm = parse_algorithm(name)?;
            if !seen.insert(algorithm) {
                return Err(ApiError::bad_request(format!(
                    "Duplicate algorithm: {}",
                    name
                )));
            }
            Ok(algorithm)
        })
        .collect()
}

/// Agreement tier of a row flagged by `count` of `total` algorithms.
pub fn agreement_level(count: usize, total: usize) -> AgreementLevel {
    if count >= total {
        AgreementLevel::All
    } else if count * 2 > total {
        AgreementLevel::Majority
    } else if count >= 2 {
        AgreementLevel::Some
    } else {
        AgreementLevel::One
    }
}

/// Per-row agreement and the summary over `sets[i]` flagged by
/// `algorithms[i]`. Records come back without column values, strongest
/// agreement first and then by row index.
pub fn summarize(
    algorithms: &[AnomalyAlgorithm],
    sets: &[BTreeSet<u64>],
) -> (AgreementSummary, Vec<AgreementRecord>) {
    let total = algorithms.len();
    let mut detected_by: BTreeMap<u64, Vec<AnomalyAlgorithm>> = BTreeMap::new();
    for (algorithm, set) in algorithms.iter().zip(sets) {
        for &row in set {
            detected_by.entry(row).or_default().push(*algorithm);
        }
    }

    let mut records: Vec<AgreementRecord> = detected_by
        .into_iter()
        .map(|(row_index, detected_by)| {
            let detection_count = detected_by.len();
            AgreementRecord {
                row_index,
                agreement_level: agreement_level(detection_count, total),
                confidence_score: round_to(detection_count as f64 / total as f64, 4),
                detected_by,
                detection_count,
                column_values: BTreeMap::new(),
            }
        })
        .collect();
    records.sort_by(|a, b| {
        b.detection_count
            .cmp(&a.detection_count)
            .then(a.row_index.cmp(&b.row_index))
    });

    let count_level = |level| records.iter().filter(|r| r.agreement_level == level).count();
    let agreement_matrix = sets
        .iter()
        .map(|a| sets.iter().map(|b| a.intersection(b).count()).collect())
        .collect();

    let summary = AgreementSummary {
        total_algorithms: total,
        total_unique_anomalies: records.len(),
        all_agree_count: count_level(AgreementLevel::All),
        majority_agree_count: count_level(AgreementLevel::Majority),
        some_agree_count: count_level(AgreementLevel::Some),
        one_only_count: count_level(AgreementLevel::One),
        agreement_matrix,
    };
    (summary, records)
}

/// Draw overlapping anomaly sets, one per algorithm.
fn draw_sets(rng: &mut impl Rng, total_rows: u64, count: usize) -> Vec<BTreeSet<u64>> {
    let mut sets: Vec<BTreeSet<u64>> = Vec::with_capacity(count);
    for _ in 0..count {
        let size = ((total_rows as f64) * rng.random_range(0.01..0.06)).round().max(1.0) as usize;
        let mut set = BTreeSet::new();
        if !sets.is_empty() {
            let earlier: Vec<u64> = sets.iter().flatten().copied().collect::<BTreeSet<_>>().into_iter().collect();
            let reuse = ((size as f64) * OVERLAP_RATIO).round() as usize;
            set.extend(earlier.choose_multiple(rng, reuse.min(earlier.len())).copied());
        }
        let fresh = factories::anomaly_indices(rng, total_rows, size);
        set.extend(fresh.into_iter().take(size.saturating_sub(set.len())));
        sets.push(set);
    }
    sets
}

/// Compare `algorithms` on `source`.
pub fn compare(
    rng: &mut impl Rng,
    source: &Source,
    request: &CompareRequest,
) -> ApiResult<AlgorithmComparisonResult> {
    let algorithms = validate_algorithms(&request.algorithms)?;
    let columns = resolve_columns(source, request.columns.as_deref())?;
    let total_rows = factories::scanned_rows(source);
    let sets = draw_sets(rng, total_rows, algorithms.len());

    let algorithm_results: Vec<AlgorithmRunResult> = algorithms
        .iter()
        .zip(&sets)
        .map(|(algorithm, set)| AlgorithmRunResult {
            algorithm: *algorithm,
            display_name: algorithm.display_name().to_string(),
            status: DetectionStatus::Success,
            anomaly_count: set.len(),
            anomaly_rate: round_to(set.len() as f64 / total_rows as f64, 6),
            duration_ms: rng.random_range(80..4_000),
            anomaly_indices: set.iter().copied().collect(),
            error_message: None,
        })
        .collect();

    let (agreement_summary, mut agreement_records) = summarize(&algorithms, &sets);
    agreement_records.truncate(MAX_RECORDS);
    for record in &mut agreement_records {
        record.column_values = factories::column_values(rng, &columns);
    }

    let total_duration_ms = algorithm_results.iter().map(|r| r.duration_ms).sum();
    let completed_at = Utc::now();
    info!(
        source_id = %source.id,
        algorithms = algorithms.len(),
        unique_anomalies = agreement_summary.total_unique_anomalies,
        "Algorithm comparison finished"
    );

    Ok(AlgorithmComparisonResult {
        id: factories::new_id(rng),
        source_id: source.id.clone(),
        status: DetectionStatus::Success,
        total_rows,
        columns_analyzed: columns,
        algorithm_results,
        agreement_summary,
        agreement_records,
        total_duration_ms,
        created_at: completed_at - Duration::milliseconds(total_duration_ms as i64),
        completed_at: Some(completed_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_agreement_levels() {
        assert_eq!(agreement_level(2, 2), AgreementLevel::All);
        assert_eq!(agreement_level(1, 2), AgreementLevel::One);
        assert_eq!(agreement_level(3, 4), AgreementLevel::Majority);
        assert_eq!(agreement_level(2, 4), AgreementLevel::Some);
        assert_eq!(agreement_level(1, 5), AgreementLevel::One);
    }

    #[test]
    fn test_two_set_agreement() {
        let algorithms = [AnomalyAlgorithm::Lof, AnomalyAlgorithm::Dbscan];
        let sets = [BTreeSet::from([1, 2, 3]), BTreeSet::from([3, 4])];
        let (summary, records) = summarize(&algorithms, &sets);

        assert_eq!(records[0].row_index, 3);
        assert_eq!(records[0].agreement_level, AgreementLevel::All);
        assert_eq!(records[0].detection_count, 2);
        assert!(records[1..]
            .iter()
            .all(|r| r.agreement_level == AgreementLevel::One));
        let rows: Vec<u64> = records.iter().map(|r| r.row_index).collect();
        assert_eq!(rows, vec![3, 1, 2, 4]);

        assert_eq!(summary.total_unique_anomalies, 4);
        assert_eq!(summary.all_agree_count, 1);
        assert_eq!(summary.one_only_count, 3);
        assert_eq!(summary.agreement_matrix, vec![vec![3, 1], vec![1, 2]]);
    }

    #[test]
    fn test_validate_algorithms() {
        assert!(validate_algorithms(&names(&["lof"])).is_err());
        assert!(validate_algorithms(&names(&["lof", "lof"])).is_err());
        assert!(validate_algorithms(&names(&["lof", "magic"])).is_err());
        assert!(validate_algorithms(&names(&[
            "lof",
            "dbscan",
            "statistical",
            "autoencoder",
            "one_class_svm",
            "isolation_forest",
            "lof"
        ]))
        .is_err());
        assert_eq!(
            validate_algorithms(&names(&["lof", "dbscan"])).unwrap(),
            vec![AnomalyAlgorithm::Lof, AnomalyAlgorithm::Dbscan]
        );
    }

    #[test]
    fn test_compare_matrix_is_symmetric() {
        let mut rng = StdRng::seed_from_u64(21);
        let source = factories::source(&mut rng, 0);
        let request = CompareRequest {
            algorithms: names(&["isolation_forest", "lof", "statistical"]),
            ..Default::default()
        };
        let result = compare(&mut rng, &source, &request).unwrap();
        let matrix = &result.agreement_summary.agreement_matrix;
        for i in 0..3 {
            assert_eq!(matrix[i][i], result.algorithm_results[i].anomaly_count);
            for j in 0..3 {
                assert_eq!(matrix[i][j], matrix[j][i]);
            }
        }
        let s = &result.agreement_summary;
        assert_eq!(
            s.all_agree_count + s.majority_agree_count + s.some_agree_count + s.one_only_count,
            s.total_unique_anomalies
        );
    }

    #[test]
    fn test_later_sets_overlap_earlier_ones() {
        let mut rng = StdRng::seed_from_u64(5);
        let sets = draw_sets(&mut rng, 10_000, 2);
        assert!(sets[0].intersection(&sets[1]).count() > 0);
    }
}
