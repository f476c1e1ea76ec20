use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::json;

use super::{new_id, pick, recent, round_to};
use crate::models::{
    MigrationDirection, MigrationHistory, MigrationStatus, PolicyType, StorageBackend,
    StorageTier, TierPolicy, TierType, TieringConfig,
};

/// The four standard tiers, hottest first.
pub fn default_tiers(rng: &mut impl Rng) -> Vec<StorageTier> {
    [
        ("Hot SSD", TierType::Hot, StorageBackend::Local, 0.23, 5),
        ("Warm Object Store", TierType::Warm, StorageBackend::S3, 0.0125, 80),
        ("Cold Nearline", TierType::Cold, StorageBackend::Gcs, 0.004, 1_500),
        ("Archive Vault", TierType::Archive, StorageBackend::Azure, 0.00099, 43_200_000),
    ]
    .into_iter()
    .enumerate()
    .map(|(priority, (name, tier_type, backend, cost, retrieval))| {
        let created_at = recent(rng, 365);
        StorageTier {
            id: new_id(rng),
            name: name.to_string(),
            tier_type,
            storage_backend: backend,
            priority: priority as u32,
            cost_per_gb: cost,
            retrieval_time_ms: retrieval,
            config: json!({ "path": format!("/data/{}", name.to_lowercase().replace(' ', "-")) }),
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    })
    .collect()
}

/// Defaults for a tier created through the API.
pub fn new_tier(rng: &mut impl Rng, priority: u32) -> StorageTier {
    let now = Utc::now();
    StorageTier {
        id: new_id(rng),
        name: format!("Tier {}", priority),
        tier_type: TierType::Warm,
        storage_backend: StorageBackend::Local,
        priority,
        cost_per_gb: 0.01,
        retrieval_time_ms: 100,
        config: json!({}),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Predicate settings matching a policy type.
pub fn policy_config(rng: &mut impl Rng, policy_type: PolicyType) -> serde_json::Value {
    match policy_type {
        PolicyType::AgeBased => json!({ "after_days": rng.random_range(7..365) }),
        PolicyType::AccessBased => json!({
            "access_threshold": rng.random_range(1..50),
            "window_days": rng.random_range(7..90),
        }),
        PolicyType::SizeBased => json!({ "min_size_mb": rng.random_range(10..10_240) }),
        PolicyType::Scheduled => json!({ "cron": "0 3 * * *" }),
        PolicyType::Composite => json!({}),
        PolicyType::Custom => json!({ "expression": "size_mb > 100 and days_since_access > 30" }),
    }
}

/// A policy moving items from `from_tier_id` to `to_tier_id`.
pub fn policy(
    rng: &mut impl Rng,
    name: &str,
    policy_type: PolicyType,
    from_tier_id: &str,
    to_tier_id: &str,
) -> TierPolicy {
    let created_at = recent(rng, 200);
    TierPolicy {
        id: new_id(rng),
        name: name.to_string(),
        description: Some(format!("{} policy", name)),
        policy_type,
        from_tier_id: from_tier_id.to_string(),
        to_tier_id: to_tier_id.to_string(),
        direction: MigrationDirection::Demote,
        config: policy_config(rng, policy_type),
        is_active: true,
        priority: rng.random_range(0..10),
        parent_id: None,
        logic_operator: (policy_type == PolicyType::Composite).then_some(Default::default()),
        child_count: 0,
        created_at,
        updated_at: created_at,
    }
}

/// Defaults for a policy created through the API.
pub fn new_policy(rng: &mut impl Rng) -> TierPolicy {
    let now = Utc::now();
    TierPolicy {
        id: new_id(rng),
        name: "New policy".to_string(),
        description: None,
        policy_type: PolicyType::AgeBased,
        from_tier_id: String::new(),
        to_tier_id: String::new(),
        direction: MigrationDirection::Demote,
        config: json!({ "after_days": 30 }),
        is_active: true,
        priority: 0,
        parent_id: None,
        logic_operator: None,
        child_count: 0,
        created_at: now,
        updated_at: now,
    }
}

/// A tiering configuration.
pub fn tiering_config(
    rng: &mut impl Rng,
    name: &str,
    default_tier_id: Option<&str>,
) -> TieringConfig {
    let created_at = recent(rng, 200);
    TieringConfig {
        id: new_id(rng),
        name: name.to_string(),
        description: None,
        default_tier_id: default_tier_id.map(str::to_string),
        enable_promotion: rng.random_bool(0.5),
        promotion_threshold: rng.random_range(5..100),
        check_interval_hours: pick(rng, &[1, 6, 12, 24]),
        batch_size: pick(rng, &[100, 500, 1_000]),
        enable_parallel_migration: rng.random_bool(0.5),
        max_parallel_migrations: rng.random_range(1..8),
        is_active: false,
        created_at,
        updated_at: created_at,
    }
}

/// One item migration triggered by `policy`.
pub fn migration(
    rng: &mut impl Rng,
    policy: &TierPolicy,
    status: MigrationStatus,
) -> MigrationHistory {
    let started_at = recent(rng, 30);
    let duration_ms = rng.random_range(50..120_000);
    let finished = matches!(
        status,
        MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::RolledBack
    );
    MigrationHistory {
        id: new_id(rng),
        policy_id: policy.id.clone(),
        item_id: format!("item-{:06}", rng.random_range(0..1_000_000)),
        from_tier_id: policy.from_tier_id.clone(),
        to_tier_id: policy.to_tier_id.clone(),
        size_bytes: rng.random_range(1_024..5 * 1_024 * 1_024 * 1_024_u64),
        status,
        error_message: (status == MigrationStatus::Failed)
            .then(|| "Destination tier rejected write: quota exceeded".to_string()),
        started_at,
        completed_at: finished.then(|| started_at + Duration::milliseconds(duration_ms)),
        duration_ms: finished.then_some(duration_ms as u64),
    }
}

/// Estimated monthly cost of `bytes` in a tier.
pub fn monthly_cost(tier: &StorageTier, bytes: u64) -> f64 {
    round_to(tier.cost_per_gb * bytes as f64 / 1_073_741_824.0, 4)
}
