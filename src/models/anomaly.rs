use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Algorithms
// ============================================================================

/// Batch anomaly detection algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyAlgorithm {
    /// Isolation Forest.
    #[default]
    IsolationForest,
    /// Local Outlier Factor.
    Lof,
    /// One-Class SVM.
    OneClassSvm,
    /// DBSCAN noise points.
    Dbscan,
    /// Z-score / IQR statistics.
    Statistical,
    /// Reconstruction error of an autoencoder.
    Autoencoder,
}

impl AnomalyAlgorithm {
    /// Every algorithm in catalogue order.
    pub const ALL: [AnomalyAlgorithm; 6] = [
        AnomalyAlgorithm::IsolationForest,
        AnomalyAlgorithm::Lof,
        AnomalyAlgorithm::OneClassSvm,
        AnomalyAlgorithm::Dbscan,
        AnomalyAlgorithm::Statistical,
        AnomalyAlgorithm::Autoencoder,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyAlgorithm::IsolationForest => "isolation_forest",
            AnomalyAlgorithm::Lof => "lof",
            AnomalyAlgorithm::OneClassSvm => "one_class_svm",
            AnomalyAlgorithm::Dbscan => "dbscan",
            AnomalyAlgorithm::Statistical => "statistical",
            AnomalyAlgorithm::Autoencoder => "autoencoder",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            AnomalyAlgorithm::IsolationForest => "Isolation Forest",
            AnomalyAlgorithm::Lof => "Local Outlier Factor",
            AnomalyAlgorithm::OneClassSvm => "One-Class SVM",
            AnomalyAlgorithm::Dbscan => "DBSCAN",
            AnomalyAlgorithm::Statistical => "Statistical",
            AnomalyAlgorithm::Autoencoder => "Autoencoder",
        }
    }
}

impl std::fmt::Display for AnomalyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tunable parameter advertised for an algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParameter {
    /// Parameter name.
    pub name: String,
    /// Label shown in the form.
    pub label: String,
    /// `integer`, `float` or `select`.
    #[serde(rename = "type")]
    pub param_type: String,
    /// Default value.
    pub default: serde_json::Value,
    /// Lower bound for numeric parameters.
    pub min_value: Option<f64>,
    /// Upper bound for numeric parameters.
    pub max_value: Option<f64>,
    /// Options for `select` parameters.
    pub options: Option<Vec<String>>,
    /// Help text.
    pub description: String,
}

/// Catalogue entry for an algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    /// Algorithm name.
    pub name: AnomalyAlgorithm,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// `tree`, `density`, `svm`, `clustering`, `statistical` or `deep`.
    pub category: String,
    /// Tunable parameters.
    pub parameters: Vec<AlgorithmParameter>,
    /// Strengths.
    pub pros: Vec<String>,
    /// Weaknesses.
    pub cons: Vec<String>,
    /// Typical use case.
    pub best_for: String,
    /// Whether inputs should be standardised.
    pub requires_scaling: bool,
}

// ============================================================================
// Single-source detection
// ============================================================================

/// Status of a detection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// Queued.
    #[default]
    Pending,
    /// Executing.
    Running,
    /// Finished.
    Success,
    /// Failed.
    Error,
}

/// Per-column breakdown of a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAnomalySummary {
    /// Column name.
    pub column: String,
    /// Column data type.
    pub dtype: String,
    /// Rows flagged on this column.
    pub anomaly_count: u64,
    /// `anomaly_count / total_rows`.
    pub anomaly_rate: f64,
    /// Mean anomaly score across flagged rows.
    pub mean_anomaly_score: f64,
    /// Minimum observed value.
    pub min_value: f64,
    /// Maximum observed value.
    pub max_value: f64,
    /// Highest-scoring row indices.
    pub top_anomaly_indices: Vec<u64>,
}

/// One row flagged by a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Row index in the source.
    pub row_index: u64,
    /// Anomaly score (0.0-1.0).
    pub anomaly_score: f64,
    /// Values of the analysed columns.
    pub column_values: BTreeMap<String, f64>,
    /// Whether the score crossed the threshold.
    pub is_anomaly: bool,
}

/// Result of a single-source detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetection {
    /// Unique detection identifier.
    pub id: String,
    /// Analysed source.
    pub source_id: String,
    /// Run status.
    pub status: DetectionStatus,
    /// Algorithm used.
    pub algorithm: AnomalyAlgorithm,
    /// Algorithm configuration.
    pub config: serde_json::Value,
    /// Rows analysed.
    pub total_rows: u64,
    /// Rows flagged.
    pub anomaly_count: u64,
    /// `anomaly_count / total_rows`.
    pub anomaly_rate: f64,
    /// Columns analysed.
    pub columns_analyzed: Vec<String>,
    /// Per-column breakdown.
    pub column_summaries: Vec<ColumnAnomalySummary>,
    /// Flagged rows (sample).
    pub anomalies: Vec<AnomalyRecord>,
    /// Run time in milliseconds.
    pub duration_ms: u64,
    /// Failure reason.
    pub error_message: Option<String>,
    /// When the run was requested.
    pub created_at: DateTime<Utc>,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Contribution of one feature to an anomaly score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    /// Feature (column) name.
    pub feature: String,
    /// Feature value on the row.
    pub value: f64,
    /// SHAP value.
    pub shap_value: f64,
    /// Share of the total absolute SHAP mass (0.0-1.0).
    pub contribution: f64,
}

/// Explanation of one flagged row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyExplanation {
    /// Unique explanation identifier.
    pub id: String,
    /// Explained detection.
    pub detection_id: String,
    /// Explained row.
    pub row_index: u64,
    /// Anomaly score of the row.
    pub anomaly_score: f64,
    /// Feature contributions, strongest first.
    pub feature_contributions: Vec<FeatureContribution>,
    /// Sum of SHAP values.
    pub total_shap: f64,
    /// One-line summary.
    pub summary: String,
    /// When the explanation was generated.
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Batch detection
// ============================================================================

/// Status of a batch detection job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    /// Created, not started.
    #[default]
    Pending,
    /// Processing sources.
    Running,
    /// Every source processed and at least one succeeded.
    Completed,
    /// Every source failed.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl BatchJobStatus {
    /// Whether the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchJobStatus::Completed | BatchJobStatus::Failed | BatchJobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchJobStatus::Pending => write!(f, "pending"),
            BatchJobStatus::Running => write!(f, "running"),
            BatchJobStatus::Completed => write!(f, "completed"),
            BatchJobStatus::Failed => write!(f, "failed"),
            BatchJobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome for one source of a batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSourceResult {
    /// Source processed.
    pub source_id: String,
    /// Source name.
    pub source_name: String,
    /// Detection created for the source.
    pub detection_id: Option<String>,
    /// Detection status.
    pub status: DetectionStatus,
    /// Rows flagged.
    pub anomaly_count: u64,
    /// Anomaly rate.
    pub anomaly_rate: f64,
    /// Rows analysed.
    pub total_rows: u64,
    /// Failure reason.
    pub error_message: Option<String>,
}

/// A detection run over several sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDetectionJob {
    /// Unique job identifier.
    pub id: String,
    /// Job name.
    pub name: String,
    /// Sources to process, in order.
    pub source_ids: Vec<String>,
    /// Algorithm applied to every source.
    pub algorithm: AnomalyAlgorithm,
    /// Algorithm configuration.
    pub config: serde_json::Value,
    /// Job status.
    pub status: BatchJobStatus,
    /// Number of sources.
    pub total_sources: usize,
    /// Sources processed successfully.
    pub completed_sources: usize,
    /// Sources that failed.
    pub failed_sources: usize,
    /// Processed share (0-100).
    pub progress_percent: f64,
    /// Source being processed next.
    pub current_source_id: Option<String>,
    /// Anomalies across finished sources.
    pub total_anomalies: u64,
    /// Per-source outcomes.
    pub results: Vec<BatchSourceResult>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When processing started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Algorithm comparison
// ============================================================================

/// How many of the compared algorithms flagged a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    /// Every algorithm.
    All,
    /// More than half.
    Majority,
    /// At least two.
    Some,
    /// Exactly one.
    One,
}

/// Outcome of one algorithm in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmRunResult {
    /// Algorithm.
    pub algorithm: AnomalyAlgorithm,
    /// Display name.
    pub display_name: String,
    /// Run status.
    pub status: DetectionStatus,
    /// Rows flagged.
    pub anomaly_count: usize,
    /// Anomaly rate.
    pub anomaly_rate: f64,
    /// Run time in milliseconds.
    pub duration_ms: u64,
    /// Flagged row indices, ascending.
    pub anomaly_indices: Vec<u64>,
    /// Failure reason.
    pub error_message: Option<String>,
}

/// Agreement for one flagged row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementRecord {
    /// Row index.
    pub row_index: u64,
    /// Algorithms that flagged the row.
    pub detected_by: Vec<AnomalyAlgorithm>,
    /// `detected_by.len()`.
    pub detection_count: usize,
    /// Agreement tier.
    pub agreement_level: AgreementLevel,
    /// `detection_count / total_algorithms`.
    pub confidence_score: f64,
    /// Values of the analysed columns.
    pub column_values: BTreeMap<String, f64>,
}

/// Aggregate agreement statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementSummary {
    /// Algorithms compared.
    pub total_algorithms: usize,
    /// Rows flagged by at least one algorithm.
    pub total_unique_anomalies: usize,
    /// Rows flagged by every algorithm.
    pub all_agree_count: usize,
    /// Rows flagged by a majority but not all.
    pub majority_agree_count: usize,
    /// Rows flagged by at least two, not a majority.
    pub some_agree_count: usize,
    /// Rows flagged by exactly one.
    pub one_only_count: usize,
    /// Symmetric pairwise overlap counts; diagonal holds set sizes.
    pub agreement_matrix: Vec<Vec<usize>>,
}

/// Result of comparing several algorithms on one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmComparisonResult {
    /// Unique comparison identifier.
    pub id: String,
    /// Compared source.
    pub source_id: String,
    /// Overall status.
    pub status: DetectionStatus,
    /// Rows analysed.
    pub total_rows: u64,
    /// Columns analysed.
    pub columns_analyzed: Vec<String>,
    /// Per-algorithm outcomes.
    pub algorithm_results: Vec<AlgorithmRunResult>,
    /// Aggregate agreement.
    pub agreement_summary: AgreementSummary,
    /// Per-row agreement, strongest first.
    pub agreement_records: Vec<AgreementRecord>,
    /// Total run time in milliseconds.
    pub total_duration_ms: u64,
    /// When the comparison was requested.
    pub created_at: DateTime<Utc>,
    /// When the comparison finished.
    pub completed_at: Option<DateTime<Utc>>,
}
