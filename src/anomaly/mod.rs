//! Anomaly detection: algorithm catalogue, single-source runs and
//! explanations.
//!
//! Batch jobs, algorithm comparison and streaming sessions live in the
//! submodules. Nothing here inspects real data; results are drawn from the
//! store's random source so they look plausible and stay reproducible.

pub mod batch;
pub mod comparison;
pub mod streaming;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::factories;
use crate::models::{
    AlgorithmInfo, AlgorithmParameter, AnomalyAlgorithm, AnomalyDetection, AnomalyExplanation,
    Source,
};
use crate::storage::FixtureStore;

/// Default number of features in an explanation.
pub const DEFAULT_MAX_FEATURES: usize = 10;

/// Body of a detection request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectRequest {
    /// Algorithm name; defaults to `isolation_forest`.
    pub algorithm: Option<String>,
    /// Columns to analyse; defaults to every numeric column.
    pub columns: Option<Vec<String>>,
    /// Algorithm configuration, echoed back.
    pub config: Option<Value>,
}

/// Body of an explanation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExplainRequest {
    /// Rows to explain.
    pub row_indices: Vec<u64>,
    /// Features per explanation.
    pub max_features: Option<usize>,
}

/// Explanations generated for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainResponse {
    /// Explained detection.
    pub detection_id: String,
    /// Algorithm of the detection.
    pub algorithm: AnomalyAlgorithm,
    /// Rows explained.
    pub row_indices: Vec<u64>,
    /// Features considered.
    pub feature_names: Vec<String>,
    /// One explanation per row.
    pub explanations: Vec<AnomalyExplanation>,
    /// When the explanations were generated.
    pub generated_at: DateTime<Utc>,
}

/// Parse a wire algorithm name.
pub fn parse_algorithm(name: &str) -> ApiResult<AnomalyAlgorithm> {
    AnomalyAlgorithm::ALL
        .into_iter()
        .find(|a| a.as_str() == name)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown algorithm: {}", name)))
}

/// Resolve requested columns against the source's numeric columns.
pub fn resolve_columns(source: &Source, requested: Option<&[String]>) -> ApiResult<Vec<String>> {
    let numeric = source.numeric_columns();
    match requested {
        None | Some([]) => Ok(numeric),
        Some(columns) => {
            if let Some(unknown) = columns.iter().find(|c| !numeric.contains(*c)) {
                return Err(ApiError::bad_request(format!(
                    "Column '{}' is not a numeric column of source '{}'",
                    unknown, source.name
                )));
            }
            Ok(columns.to_vec())
        }
    }
}

/// Run a detection over a source and store the result.
pub fn detect(
    store: &mut FixtureStore,
    source_id: &str,
    request: &DetectRequest,
) -> ApiResult<AnomalyDetection> {
    let source = store.sources.require(source_id)?.clone();
    let algorithm = match request.algorithm.as_deref() {
        Some(name) => parse_algorithm(name)?,
        None => AnomalyAlgorithm::default(),
    };
    let columns = resolve_columns(&source, request.columns.as_deref())?;
    let config = request.config.clone().unwrap_or_else(|| json!({}));

    let detection = factories::detection(&mut store.rng, &source, algorithm, &columns, config);
    info!(
        source_id,
        detection_id = %detection.id,
        algorithm = %algorithm,
        anomalies = detection.anomaly_count,
        "Anomaly detection finished"
    );
    Ok(store.detections.add(detection)?.clone())
}

/// Explain rows of a stored detection and keep the explanations.
pub fn explain(
    store: &mut FixtureStore,
    detection_id: &str,
    request: &ExplainRequest,
) -> ApiResult<ExplainResponse> {
    if request.row_indices.is_empty() {
        return Err(ApiError::bad_request("row_indices must not be empty"));
    }
    let detection = store.detections.require(detection_id)?.clone();
    if let Some(row) = request
        .row_indices
        .iter()
        .find(|&&row| row >= detection.total_rows)
    {
        return Err(ApiError::bad_request(format!(
            "Row {} is outside the {} analysed rows",
            row, detection.total_rows
        )));
    }

    let max_features = request.max_features.unwrap_or(DEFAULT_MAX_FEATURES);
    let mut explanations = Vec::with_capacity(request.row_indices.len());
    for &row in &request.row_indices {
        let explanation = factories::explanation(&mut store.rng, &detection, row, max_features);
        explanations.push(store.explanations.add(explanation)?.clone());
    }

    Ok(ExplainResponse {
        detection_id: detection.id.clone(),
        algorithm: detection.algorithm,
        row_indices: request.row_indices.clone(),
        feature_names: detection.columns_analyzed.clone(),
        explanations,
        generated_at: Utc::now(),
    })
}

fn int_param(name: &str, label: &str, default: i64, min: f64, max: f64, description: &str) -> AlgorithmParameter {
    AlgorithmParameter {
        name: name.to_string(),
        label: label.to_string(),
        param_type: "integer".to_string(),
        default: json!(default),
        min_value: Some(min),
        max_value: Some(max),
        options: None,
        description: description.to_string(),
    }
}

fn float_param(name: &str, label: &str, default: f64, min: f64, max: f64, description: &str) -> AlgorithmParameter {
    AlgorithmParameter {
        name: name.to_string(),
        label: label.to_string(),
        param_type: "float".to_string(),
        default: json!(default),
        min_value: Some(min),
        max_value: Some(max),
        options: None,
        description: description.to_string(),
    }
}

fn select_param(name: &str, label: &str, options: &[&str], description: &str) -> AlgorithmParameter {
    AlgorithmParameter {
        name: name.to_string(),
        label: label.to_string(),
        param_type: "select".to_string(),
        default: json!(options.first().copied().unwrap_or_default()),
        min_value: None,
        max_value: None,
        options: Some(options.iter().map(|o| o.to_string()).collect()),
        description: description.to_string(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The algorithm catalogue.
pub fn algorithms() -> Vec<AlgorithmInfo> {
    let contamination = || {
        float_param(
            "contamination",
            "Contamination",
            0.1,
            0.001,
            0.5,
            "Expected proportion of anomalies",
        )
    };

    AnomalyAlgorithm::ALL
        .into_iter()
        .map(|algorithm| {
            let (description, category, parameters, pros, cons, best_for, requires_scaling) =
                match algorithm {
                    AnomalyAlgorithm::IsolationForest => (
                        "Isolates observations with random splits; anomalies need fewer splits.",
                        "tree",
                        vec![
                            int_param("n_estimators", "Trees", 100, 10.0, 1000.0, "Number of trees"),
                            contamination(),
                        ],
                        strings(&["Fast on large datasets", "No distance metric needed"]),
                        strings(&["Struggles with local anomalies"]),
                        "High-dimensional tabular data",
                        false,
                    ),
                    AnomalyAlgorithm::Lof => (
                        "Compares the local density of a point with its neighbours.",
                        "density",
                        vec![
                            int_param("n_neighbors", "Neighbours", 20, 1.0, 100.0, "Neighbourhood size"),
                            contamination(),
                        ],
                        strings(&["Finds local anomalies", "Handles varying density"]),
                        strings(&["Quadratic in the number of rows"]),
                        "Clustered data with local outliers",
                        true,
                    ),
                    AnomalyAlgorithm::OneClassSvm => (
                        "Learns a boundary around normal observations.",
                        "svm",
                        vec![
                            select_param("kernel", "Kernel", &["rbf", "linear", "poly", "sigmoid"], "Kernel function"),
                            float_param("nu", "Nu", 0.1, 0.001, 1.0, "Upper bound on training errors"),
                        ],
                        strings(&["Flexible decision boundary"]),
                        strings(&["Sensitive to kernel choice", "Slow to train"]),
                        "Small, well-scaled datasets",
                        true,
                    ),
                    AnomalyAlgorithm::Dbscan => (
                        "Treats points outside any dense cluster as noise.",
                        "clustering",
                        vec![
                            float_param("eps", "Epsilon", 0.5, 0.01, 10.0, "Neighbourhood radius"),
                            int_param("min_samples", "Min samples", 5, 1.0, 100.0, "Points needed to form a cluster"),
                        ],
                        strings(&["No need to fix the anomaly rate"]),
                        strings(&["Hard to tune epsilon"]),
                        "Spatial or clustered data",
                        true,
                    ),
                    AnomalyAlgorithm::Statistical => (
                        "Flags values far from the mean in standard deviations or IQRs.",
                        "statistical",
                        vec![
                            select_param("method", "Method", &["zscore", "iqr", "mad"], "Statistic used"),
                            float_param("threshold", "Threshold", 3.0, 1.0, 10.0, "Cut-off for the statistic"),
                        ],
                        strings(&["Easy to explain", "Very fast"]),
                        strings(&["Assumes roughly normal data", "Misses multivariate patterns"]),
                        "Single-column sanity checks",
                        false,
                    ),
                    AnomalyAlgorithm::Autoencoder => (
                        "Scores rows by how badly a neural network reconstructs them.",
                        "deep",
                        vec![
                            int_param("encoding_dim", "Encoding size", 8, 2.0, 128.0, "Bottleneck width"),
                            int_param("epochs", "Epochs", 50, 1.0, 500.0, "Training epochs"),
                            contamination(),
                        ],
                        strings(&["Captures non-linear structure"]),
                        strings(&["Needs more data", "Slow to train"]),
                        "Large datasets with complex correlations",
                        true,
                    ),
                };
            AlgorithmInfo {
                name: algorithm,
                display_name: algorithm.display_name().to_string(),
                description: description.to_string(),
                category: category.to_string(),
                parameters,
                pros,
                cons,
                best_for: best_for.to_string(),
                requires_scaling,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureConfig;

    fn store() -> FixtureStore {
        FixtureStore::seeded(&FixtureConfig::default())
    }

    #[test]
    fn test_catalogue_covers_every_algorithm() {
        let catalogue = algorithms();
        assert_eq!(catalogue.len(), AnomalyAlgorithm::ALL.len());
        assert!(catalogue.iter().all(|a| !a.parameters.is_empty()));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("lof").unwrap(), AnomalyAlgorithm::Lof);
        assert!(parse_algorithm("magic").is_err());
    }

    #[test]
    fn test_detect_stores_result() {
        let mut store = store();
        let source_id = store.sources.all()[0].id.clone();
        let before = store.detections.len();
        let d = detect(
            &mut store,
            &source_id,
            &DetectRequest {
                algorithm: Some("dbscan".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(d.algorithm, AnomalyAlgorithm::Dbscan);
        assert_eq!(store.detections.len(), before + 1);
        assert_eq!(store.latest_detection(&source_id).map(|l| &l.id), Some(&d.id));
    }

    #[test]
    fn test_detect_rejects_unknown_column() {
        let mut store = store();
        let source_id = store.sources.all()[0].id.clone();
        let err = detect(
            &mut store,
            &source_id,
            &DetectRequest {
                columns: Some(vec!["nope".to_string()]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_explain_requires_rows() {
        let mut store = store();
        let detection_id = store.detections.all()[0].id.clone();
        let err = explain(&mut store, &detection_id, &ExplainRequest::default()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));

        let resp = explain(
            &mut store,
            &detection_id,
            &ExplainRequest {
                row_indices: vec![0, 1],
                max_features: Some(2),
            },
        )
        .unwrap();
        assert_eq!(resp.explanations.len(), 2);
        assert!(resp.explanations.iter().all(|e| e.feature_contributions.len() <= 2));
    }
}
