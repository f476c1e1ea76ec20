use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of backing store a data source points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Local or remote file (CSV, Parquet).
    #[default]
    File,
    /// PostgreSQL table.
    Postgresql,
    /// MySQL table.
    Mysql,
    /// Snowflake table.
    Snowflake,
    /// BigQuery table.
    Bigquery,
}

/// Column declared by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Column name.
    pub name: String,
    /// Logical data type (`int64`, `float64`, `string`, `datetime`).
    pub dtype: String,
}

impl SourceColumn {
    /// Whether the column can be fed to numeric detectors.
    pub fn is_numeric(&self) -> bool {
        matches!(self.dtype.as_str(), "int64" | "float64")
    }
}

/// A registered data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Unique source identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Backing store kind.
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Optional description.
    pub description: Option<String>,
    /// Whether the source is active.
    pub is_active: bool,
    /// Approximate row count.
    pub row_count: u64,
    /// Declared columns.
    pub columns: Vec<SourceColumn>,
    /// When the source was registered.
    pub created_at: DateTime<Utc>,
    /// When the source was last modified.
    pub updated_at: DateTime<Utc>,
    /// When the source was last validated, if ever.
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl Source {
    /// Names of numeric columns.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }
}
