use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Temperature class of a storage tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierType {
    /// Fast, expensive.
    #[default]
    Hot,
    /// Balanced.
    Warm,
    /// Cheap, slower.
    Cold,
    /// Cheapest, slowest.
    Archive,
}

/// Backend a tier stores data in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Local disk.
    #[default]
    Local,
    /// Amazon S3.
    S3,
    /// Google Cloud Storage.
    Gcs,
    /// Azure Blob Storage.
    Azure,
}

/// A storage tier. Tiers are ordered by ascending `priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTier {
    /// Unique tier identifier.
    pub id: String,
    /// Tier name.
    pub name: String,
    /// Temperature class.
    pub tier_type: TierType,
    /// Storage backend.
    pub storage_backend: StorageBackend,
    /// Ordering key (0 = hottest).
    pub priority: u32,
    /// Monthly cost per GB.
    pub cost_per_gb: f64,
    /// Expected retrieval latency.
    pub retrieval_time_ms: u64,
    /// Backend-specific settings.
    pub config: serde_json::Value,
    /// Whether the tier accepts data.
    pub is_active: bool,
    /// When the tier was created.
    pub created_at: DateTime<Utc>,
    /// When the tier was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Migration predicate family of a policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Items older than `after_days`.
    #[default]
    AgeBased,
    /// Items accessed fewer than `access_threshold` times.
    AccessBased,
    /// Items larger than `min_size_mb`.
    SizeBased,
    /// Cron-scheduled sweep.
    Scheduled,
    /// Combination of child policies.
    Composite,
    /// Custom expression.
    Custom,
}

/// Direction of movement between tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    /// Towards colder tiers.
    #[default]
    Demote,
    /// Towards hotter tiers.
    Promote,
}

/// How a composite policy combines its children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOperator {
    /// Every child must match.
    #[default]
    And,
    /// Any child may match.
    Or,
}

/// A tier migration policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Unique policy identifier.
    pub id: String,
    /// Policy name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Predicate family.
    pub policy_type: PolicyType,
    /// Tier items move from.
    pub from_tier_id: String,
    /// Tier items move to.
    pub to_tier_id: String,
    /// Movement direction.
    pub direction: MigrationDirection,
    /// Predicate settings.
    pub config: serde_json::Value,
    /// Whether the policy runs.
    pub is_active: bool,
    /// Evaluation priority (lower first).
    pub priority: i32,
    /// Parent composite policy.
    pub parent_id: Option<String>,
    /// Combination operator (composites only).
    pub logic_operator: Option<LogicOperator>,
    /// Number of attached children (derived).
    #[serde(default)]
    pub child_count: usize,
    /// When the policy was created.
    pub created_at: DateTime<Utc>,
    /// When the policy was last modified.
    pub updated_at: DateTime<Utc>,
}

impl TierPolicy {
    /// Whether this policy combines children.
    pub fn is_composite(&self) -> bool {
        self.policy_type == PolicyType::Composite
    }
}

/// A composite policy with its children resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTree {
    /// The policy at this node.
    #[serde(flatten)]
    pub policy: TierPolicy,
    /// Resolved children.
    pub children: Vec<PolicyTree>,
}

/// Global tiering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieringConfig {
    /// Unique config identifier.
    pub id: String,
    /// Config name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Tier new data lands in.
    pub default_tier_id: Option<String>,
    /// Whether hot-access promotion runs.
    pub enable_promotion: bool,
    /// Accesses that trigger promotion.
    pub promotion_threshold: u32,
    /// Sweep interval.
    pub check_interval_hours: u32,
    /// Items per migration batch.
    pub batch_size: u32,
    /// Whether migrations run in parallel.
    pub enable_parallel_migration: bool,
    /// Parallel migration cap.
    pub max_parallel_migrations: u32,
    /// Whether this config is in effect.
    pub is_active: bool,
    /// When the config was created.
    pub created_at: DateTime<Utc>,
    /// When the config was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a single item migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Queued.
    Pending,
    /// Copying.
    InProgress,
    /// Done.
    #[default]
    Completed,
    /// Failed.
    Failed,
    /// Reverted.
    RolledBack,
}

/// A recorded item migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationHistory {
    /// Unique migration identifier.
    pub id: String,
    /// Policy that triggered it.
    pub policy_id: String,
    /// Item moved.
    pub item_id: String,
    /// Source tier.
    pub from_tier_id: String,
    /// Destination tier.
    pub to_tier_id: String,
    /// Bytes moved.
    pub size_bytes: u64,
    /// Outcome.
    pub status: MigrationStatus,
    /// Failure reason.
    pub error_message: Option<String>,
    /// When the migration started.
    pub started_at: DateTime<Utc>,
    /// When it finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at`.
    pub duration_ms: Option<u64>,
}
