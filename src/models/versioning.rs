use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How version labels are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningStrategy {
    /// `v1`, `v2`, ...
    #[default]
    Incremental,
    /// `1.0.0`, `1.1.0`, ...
    Semantic,
    /// `20260101T000000`.
    Timestamp,
    /// Short content hash.
    Gitlike,
}

/// Issue counts captured with a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Issues found.
    pub total_issues: u32,
    /// Critical issues.
    pub critical: u32,
    /// High-severity issues.
    pub high: u32,
    /// Medium-severity issues.
    pub medium: u32,
    /// Low-severity issues.
    pub low: u32,
    /// Whether the validation passed.
    pub passed: bool,
}

/// A versioned validation snapshot of a source.
///
/// Versions of one source form a backward chain through
/// `parent_version_id`; `version_number` increases monotonically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Unique version identifier.
    pub id: String,
    /// Owning source.
    pub source_id: String,
    /// Monotonic number within the source.
    pub version_number: u32,
    /// Label derived from `strategy`.
    pub version_label: String,
    /// Labelling strategy.
    pub strategy: VersioningStrategy,
    /// Validation run captured.
    pub validation_id: Option<String>,
    /// Previous version of the same source.
    pub parent_version_id: Option<String>,
    /// Hash of the captured result.
    pub content_hash: String,
    /// Issue counts.
    pub summary: VersionSummary,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// When the version was created.
    pub created_at: DateTime<Utc>,
}

/// Change in one summary counter between two versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryChange {
    /// Counter name.
    pub field: String,
    /// Value in the older version.
    pub before: i64,
    /// Value in the newer version.
    pub after: i64,
    /// `after - before`.
    pub delta: i64,
}

/// Difference between two versions of the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    /// Older version.
    pub version_a: VersionInfo,
    /// Newer version.
    pub version_b: VersionInfo,
    /// Changed summary counters.
    pub summary_changes: Vec<SummaryChange>,
    /// Severities whose count went up.
    pub issues_added: Vec<String>,
    /// Severities whose count went down.
    pub issues_removed: Vec<String>,
    /// Whether anything differs.
    pub has_changes: bool,
}
