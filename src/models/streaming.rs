use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Online detection algorithm for streaming sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingAlgorithm {
    /// Rolling z-score.
    #[default]
    Zscore,
    /// Exponentially weighted moving average.
    Ewma,
    /// Online isolation forest.
    IsolationForest,
    /// Half-space trees.
    HalfSpaceTrees,
    /// Robust random cut forest.
    Rrcf,
}

impl StreamingAlgorithm {
    /// Every algorithm in catalogue order.
    pub const ALL: [StreamingAlgorithm; 5] = [
        StreamingAlgorithm::Zscore,
        StreamingAlgorithm::Ewma,
        StreamingAlgorithm::IsolationForest,
        StreamingAlgorithm::HalfSpaceTrees,
        StreamingAlgorithm::Rrcf,
    ];

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            StreamingAlgorithm::Zscore => "Rolling Z-Score",
            StreamingAlgorithm::Ewma => "EWMA",
            StreamingAlgorithm::IsolationForest => "Online Isolation Forest",
            StreamingAlgorithm::HalfSpaceTrees => "Half-Space Trees",
            StreamingAlgorithm::Rrcf => "Robust Random Cut Forest",
        }
    }
}

/// Status of a streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingStatus {
    /// Accepting data.
    #[default]
    Running,
    /// Closed; data pushes are rejected.
    Stopped,
}

/// Rolling statistics for one streamed column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Values observed.
    pub count: u64,
    /// Mean over the current window.
    pub mean: f64,
    /// Standard deviation over the current window.
    pub std: f64,
    /// Minimum observed value.
    pub min: f64,
    /// Maximum observed value.
    pub max: f64,
    /// Points flagged on this column.
    pub anomaly_count: u64,
}

/// An online detection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSession {
    /// Unique session identifier.
    pub id: String,
    /// Optional source the stream belongs to.
    pub source_id: Option<String>,
    /// Detection algorithm.
    pub algorithm: StreamingAlgorithm,
    /// Rolling window length.
    pub window_size: usize,
    /// Score threshold.
    pub threshold: f64,
    /// Columns tracked; empty means all numeric keys seen.
    pub columns: Vec<String>,
    /// Session status.
    pub status: StreamingStatus,
    /// Points received.
    pub total_points: u64,
    /// Alerts raised.
    pub total_alerts: u64,
    /// Per-column rolling statistics.
    pub statistics: BTreeMap<String, ColumnStatistics>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session stopped.
    pub stopped_at: Option<DateTime<Utc>>,
}

/// A point pushed into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingDataPoint {
    /// Sequence number within the session (0-based).
    pub point_index: u64,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Column values.
    pub data: BTreeMap<String, f64>,
    /// Whether the point raised an alert.
    pub is_anomaly: bool,
}

/// Details of the column that triggered an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDetails {
    /// Column with the highest score.
    pub column: String,
    /// Its value.
    pub value: f64,
    /// Baseline mean.
    pub mean: f64,
    /// Baseline standard deviation.
    pub std: f64,
    /// Computed score.
    pub score: f64,
}

/// Alert raised by a streaming session. Alerts are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingAlert {
    /// Unique alert identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Index of the offending point.
    pub point_index: u64,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// The offending point.
    pub data_point: BTreeMap<String, f64>,
    /// Highest column score.
    pub anomaly_score: f64,
    /// Algorithm that raised the alert.
    pub algorithm: StreamingAlgorithm,
    /// Breakdown of the triggering column.
    pub details: AlertDetails,
}
