//! Storage tiering: policy validation, composite trees and statistics.

pub mod executor;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::factories;
use crate::models::{MigrationStatus, PolicyTree, TierPolicy, TierType, TieringConfig};
use crate::storage::FixtureStore;

/// Fewest children a composite needs under strict validation.
pub const MIN_COMPOSITE_CHILDREN: usize = 2;

/// Per-tier figures in the tiering statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierBreakdown {
    /// Tier.
    pub tier_id: String,
    /// Tier name.
    pub tier_name: String,
    /// Tier class.
    pub tier_type: TierType,
    /// Items migrated into the tier.
    pub item_count: usize,
    /// Bytes migrated into the tier.
    pub total_bytes: u64,
    /// Monthly cost of those bytes.
    pub estimated_monthly_cost: f64,
}

/// Aggregate tiering statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieringStats {
    /// Tiers defined.
    pub total_tiers: usize,
    /// Tiers accepting data.
    pub active_tiers: usize,
    /// Policies defined.
    pub total_policies: usize,
    /// Active policies.
    pub active_policies: usize,
    /// Composite policies.
    pub composite_policies: usize,
    /// Migrations recorded.
    pub total_migrations: usize,
    /// Completed migrations.
    pub completed_migrations: usize,
    /// Failed migrations.
    pub failed_migrations: usize,
    /// Bytes moved by completed migrations.
    pub total_bytes_migrated: u64,
    /// Per-tier breakdown, hottest first.
    pub tiers: Vec<TierBreakdown>,
}

/// Check a policy's tier references and, under strict validation, that it
/// moves data between two different tiers.
pub fn validate_policy(store: &FixtureStore, policy: &TierPolicy, strict: bool) -> ApiResult<()> {
    for (field, tier_id) in [
        ("from_tier_id", &policy.from_tier_id),
        ("to_tier_id", &policy.to_tier_id),
    ] {
        if !store.tiers.contains(tier_id) {
            return Err(ApiError::bad_request(format!(
                "{} references an unknown tier: '{}'",
                field, tier_id
            )));
        }
    }
    if strict && policy.from_tier_id == policy.to_tier_id {
        return Err(ApiError::bad_request(
            "from_tier_id and to_tier_id must reference different tiers",
        ));
    }
    if let Some(parent_id) = &policy.parent_id {
        if parent_id == &policy.id {
            return Err(ApiError::bad_request("A policy cannot be its own parent"));
        }
    }
    Ok(())
}

/// Fill in derived fields of a stored policy.
pub fn with_child_count(store: &FixtureStore, policy: &TierPolicy) -> TierPolicy {
    let mut policy = policy.clone();
    policy.child_count = store.policy_children(&policy.id).len();
    policy
}

/// Normalise a policy before it is stored.
pub fn normalize(mut policy: TierPolicy) -> TierPolicy {
    if policy.is_composite() {
        policy.logic_operator.get_or_insert_with(Default::default);
    } else {
        policy.logic_operator = None;
    }
    policy.child_count = 0;
    policy
}

/// Check that an edited policy still fits its place in a composite tree.
///
/// A policy with children must stay composite, and a policy that is a
/// child must stay non-composite.
pub fn check_membership(store: &FixtureStore, policy: &TierPolicy) -> ApiResult<()> {
    if policy.is_composite() && policy.parent_id.is_some() {
        return Err(ApiError::bad_request(
            "A child of a composite policy cannot become a composite",
        ));
    }
    if !policy.is_composite() && !store.policy_children(&policy.id).is_empty() {
        return Err(ApiError::bad_request(
            "A policy with children must remain a composite",
        ));
    }
    Ok(())
}

/// Attach `child_id` under the composite `parent_id`.
pub fn attach_child(store: &mut FixtureStore, parent_id: &str, child_id: &str) -> ApiResult<TierPolicy> {
    let parent = store.policies.require(parent_id)?;
    if !parent.is_composite() {
        return Err(ApiError::bad_request(format!(
            "Policy '{}' is not a composite policy",
            parent.name
        )));
    }
    if parent_id == child_id {
        return Err(ApiError::bad_request("A policy cannot be its own child"));
    }
    let child = store.policies.require(child_id)?;
    if child.is_composite() {
        return Err(ApiError::bad_request("Composite policies cannot be nested"));
    }
    if let Some(existing) = &child.parent_id {
        return Err(ApiError::bad_request(format!(
            "Policy '{}' already belongs to composite {}",
            child.name, existing
        )));
    }

    store.policies.update(child_id, |c| {
        c.parent_id = Some(parent_id.to_string());
        c.updated_at = Utc::now();
    })?;
    info!(parent_id, child_id, "Policy attached to composite");
    let parent = store.policies.require(parent_id)?;
    Ok(with_child_count(store, parent))
}

/// Detach `child_id` from `parent_id`.
pub fn detach_child(store: &mut FixtureStore, parent_id: &str, child_id: &str) -> ApiResult<TierPolicy> {
    store.policies.require(parent_id)?;
    let child = store.policies.require(child_id)?;
    if child.parent_id.as_deref() != Some(parent_id) {
        return Err(ApiError::bad_request(format!(
            "Policy {} is not a child of {}",
            child_id, parent_id
        )));
    }
    store.policies.update(child_id, |c| {
        c.parent_id = None;
        c.updated_at = Utc::now();
    })?;
    info!(parent_id, child_id, "Policy detached from composite");
    let parent = store.policies.require(parent_id)?;
    Ok(with_child_count(store, parent))
}

/// The policy with its children resolved recursively.
pub fn tree(store: &FixtureStore, policy_id: &str) -> ApiResult<PolicyTree> {
    let policy = store.policies.require(policy_id)?;
    Ok(build_tree(store, policy, 0))
}

fn build_tree(store: &FixtureStore, policy: &TierPolicy, depth: usize) -> PolicyTree {
    // Children are non-composite, so real trees are one level deep; the
    // depth cap only guards against hand-edited parent cycles.
    let children = if depth < 8 {
        store
            .policy_children(&policy.id)
            .into_iter()
            .map(|child| build_tree(store, child, depth + 1))
            .collect()
    } else {
        Vec::new()
    };
    PolicyTree {
        policy: with_child_count(store, policy),
        children,
    }
}

/// Make `config_id` the only active configuration.
pub fn activate_config(store: &mut FixtureStore, config_id: &str) -> ApiResult<TieringConfig> {
    store.tiering_configs.require(config_id)?;
    let now = Utc::now();
    for id in store
        .tiering_configs
        .iter()
        .map(|c| c.id.clone())
        .collect::<Vec<_>>()
    {
        store.tiering_configs.update(&id, |c| {
            let active = c.id == config_id;
            if c.is_active != active {
                c.is_active = active;
                c.updated_at = now;
            }
        })?;
    }
    info!(config_id, "Tiering config activated");
    Ok(store.tiering_configs.require(config_id)?.clone())
}

/// Aggregate statistics over tiers, policies and migrations.
pub fn stats(store: &FixtureStore) -> TieringStats {
    let completed = || {
        store
            .migrations
            .iter()
            .filter(|m| m.status == MigrationStatus::Completed)
    };

    let mut tiers: Vec<TierBreakdown> = store
        .tiers
        .iter()
        .map(|tier| {
            let (item_count, total_bytes) = completed()
                .filter(|m| m.to_tier_id == tier.id)
                .fold((0, 0), |(n, bytes), m| (n + 1, bytes + m.size_bytes));
            TierBreakdown {
                tier_id: tier.id.clone(),
                tier_name: tier.name.clone(),
                tier_type: tier.tier_type,
                item_count,
                total_bytes,
                estimated_monthly_cost: factories::monthly_cost(tier, total_bytes),
            }
        })
        .collect();
    tiers.sort_by_key(|t| {
        store
            .tiers
            .get(&t.tier_id)
            .map(|tier| tier.priority)
            .unwrap_or(u32::MAX)
    });

    TieringStats {
        total_tiers: store.tiers.len(),
        active_tiers: store.tiers.iter().filter(|t| t.is_active).count(),
        total_policies: store.policies.len(),
        active_policies: store.policies.iter().filter(|p| p.is_active).count(),
        composite_policies: store.policies.iter().filter(|p| p.is_composite()).count(),
        total_migrations: store.migrations.len(),
        completed_migrations: completed().count(),
        failed_migrations: store
            .migrations
            .iter()
            .filter(|m| m.status == MigrationStatus::Failed)
            .count(),
        total_bytes_migrated: completed().map(|m| m.size_bytes).sum(),
        tiers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureConfig;
    use crate::models::PolicyType;

    fn store() -> FixtureStore {
        FixtureStore::seeded(&FixtureConfig::default())
    }

    fn policy_of(store: &mut FixtureStore, policy_type: PolicyType) -> String {
        let tiers: Vec<String> = store.tiers.iter().map(|t| t.id.clone()).collect();
        let p = factories::policy(&mut store.rng, "test", policy_type, &tiers[0], &tiers[1]);
        let id = p.id.clone();
        store.policies.add(normalize(p)).unwrap();
        id
    }

    #[test]
    fn test_same_tier_policy_only_rejected_when_strict() {
        let store = store();
        let tier = store.tiers.all()[0].id.clone();
        let mut p = store.policies.all()[0].clone();
        p.from_tier_id = tier.clone();
        p.to_tier_id = tier;
        assert!(validate_policy(&store, &p, false).is_ok());
        assert!(validate_policy(&store, &p, true).is_err());
    }

    #[test]
    fn test_unknown_tier_is_rejected() {
        let store = store();
        let mut p = store.policies.all()[0].clone();
        p.to_tier_id = "nowhere".to_string();
        assert!(validate_policy(&store, &p, false).is_err());
    }

    #[test]
    fn test_attach_and_detach_children() {
        let mut store = store();
        let parent = policy_of(&mut store, PolicyType::Composite);
        let child = policy_of(&mut store, PolicyType::AgeBased);

        let updated = attach_child(&mut store, &parent, &child).unwrap();
        assert_eq!(updated.child_count, 1);
        let t = tree(&store, &parent).unwrap();
        assert_eq!(t.children.len(), 1);
        assert_eq!(t.children[0].policy.id, child);

        // Already parented.
        assert!(attach_child(&mut store, &parent, &child).is_err());

        let updated = detach_child(&mut store, &parent, &child).unwrap();
        assert_eq!(updated.child_count, 0);
        assert!(detach_child(&mut store, &parent, &child).is_err());
    }

    #[test]
    fn test_attach_rules() {
        let mut store = store();
        let composite = policy_of(&mut store, PolicyType::Composite);
        let other_composite = policy_of(&mut store, PolicyType::Composite);
        let plain = policy_of(&mut store, PolicyType::SizeBased);

        assert!(attach_child(&mut store, &plain, &composite).is_err());
        assert!(attach_child(&mut store, &composite, &composite).is_err());
        assert!(attach_child(&mut store, &composite, &other_composite).is_err());
    }

    #[test]
    fn test_membership_survives_type_changes() {
        let mut store = store();
        let parent = policy_of(&mut store, PolicyType::Composite);
        let child = policy_of(&mut store, PolicyType::AgeBased);
        attach_child(&mut store, &parent, &child).unwrap();

        let mut promoted = store.policies.require(&child).unwrap().clone();
        promoted.policy_type = PolicyType::Composite;
        let err = check_membership(&store, &promoted).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));

        let mut demoted = store.policies.require(&parent).unwrap().clone();
        demoted.policy_type = PolicyType::SizeBased;
        assert!(check_membership(&store, &demoted).is_err());

        let mut renamed = store.policies.require(&child).unwrap().clone();
        renamed.name = "renamed".to_string();
        assert!(check_membership(&store, &renamed).is_ok());
    }

    #[test]
    fn test_activate_config_is_exclusive() {
        let mut store = store();
        let last = store.tiering_configs.all().last().unwrap().id.clone();
        activate_config(&mut store, &last).unwrap();
        let active: Vec<&str> = store
            .tiering_configs
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(active, vec![last.as_str()]);
    }

    #[test]
    fn test_stats_are_consistent() {
        let store = store();
        let s = stats(&store);
        assert_eq!(s.total_tiers, 4);
        let per_tier: u64 = s.tiers.iter().map(|t| t.total_bytes).sum();
        assert_eq!(per_tier, s.total_bytes_migrated);
        assert!(s.completed_migrations + s.failed_migrations <= s.total_migrations);
    }
}
