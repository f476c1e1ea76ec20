//! Simulated policy execution.

use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::MIN_COMPOSITE_CHILDREN;
use crate::error::{ApiError, ApiResult};
use crate::factories;
use crate::models::{MigrationStatus, TierPolicy};
use crate::storage::FixtureStore;

/// Chance that one item migration fails.
const ITEM_FAILURE_RATE: f64 = 0.05;
/// Most items a single run migrates.
const MAX_ITEMS_PER_RUN: usize = 20;

/// Body of an execute request.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ExecuteRequest {
    /// Report what would move without recording migrations.
    pub dry_run: bool,
}

/// Outcome of running one policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Executed policy.
    pub policy_id: String,
    /// Whether the policy ran.
    pub success: bool,
    /// Whether migrations were only simulated.
    pub dry_run: bool,
    /// Items evaluated.
    pub items_scanned: usize,
    /// Items moved (or that would move).
    pub items_migrated: usize,
    /// Items that failed to move.
    pub items_failed: usize,
    /// Bytes moved.
    pub bytes_migrated: u64,
    /// Recorded migrations.
    pub migration_ids: Vec<String>,
    /// Simulated run time.
    pub duration_ms: u64,
    /// Outcome message.
    pub message: String,
}

/// Outcome of running every active root policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessAllResult {
    /// Policies executed.
    pub policies_executed: usize,
    /// Items moved across all policies.
    pub total_items_migrated: usize,
    /// Bytes moved across all policies.
    pub total_bytes_migrated: u64,
    /// Per-policy outcomes.
    pub results: Vec<ExecutionResult>,
}

impl ExecutionResult {
    fn skipped(policy: &TierPolicy, dry_run: bool, message: impl Into<String>) -> Self {
        Self {
            policy_id: policy.id.clone(),
            success: false,
            dry_run,
            message: message.into(),
            ..Default::default()
        }
    }

    fn absorb(&mut self, other: ExecutionResult) {
        self.items_scanned += other.items_scanned;
        self.items_migrated += other.items_migrated;
        self.items_failed += other.items_failed;
        self.bytes_migrated += other.bytes_migrated;
        self.migration_ids.extend(other.migration_ids);
        self.duration_ms += other.duration_ms;
    }
}

/// Execute a policy. Composite policies run their active children.
pub fn execute(
    store: &mut FixtureStore,
    policy_id: &str,
    dry_run: bool,
    strict: bool,
) -> ApiResult<ExecutionResult> {
    let policy = store.policies.require(policy_id)?.clone();
    if !policy.is_active {
        warn!(policy_id, "Execution requested for inactive policy");
        return Ok(ExecutionResult::skipped(&policy, dry_run, "Policy is inactive"));
    }

    if !policy.is_composite() {
        return Ok(run_leaf(store, &policy, dry_run));
    }

    let children: Vec<TierPolicy> = store
        .policy_children(policy_id)
        .into_iter()
        .cloned()
        .collect();
    if strict && children.len() < MIN_COMPOSITE_CHILDREN {
        return Err(ApiError::bad_request(format!(
            "Composite policy '{}' needs at least {} children, has {}",
            policy.name,
            MIN_COMPOSITE_CHILDREN,
            children.len()
        )));
    }

    let mut total = ExecutionResult {
        policy_id: policy.id.clone(),
        success: true,
        dry_run,
        ..Default::default()
    };
    let mut ran = 0;
    for child in children.iter().filter(|c| c.is_active) {
        total.absorb(run_leaf(store, child, dry_run));
        ran += 1;
    }
    total.message = format!(
        "Executed {} of {} child policies ({:?})",
        ran,
        children.len(),
        policy.logic_operator.unwrap_or_default()
    );
    Ok(total)
}

fn run_leaf(store: &mut FixtureStore, policy: &TierPolicy, dry_run: bool) -> ExecutionResult {
    let rng = &mut store.rng;
    let items_scanned = rng.random_range(20..500);
    let candidates = rng.random_range(0..=MAX_ITEMS_PER_RUN.min(items_scanned));
    let duration_ms = rng.random_range(30..5_000);

    let mut result = ExecutionResult {
        policy_id: policy.id.clone(),
        success: true,
        dry_run,
        items_scanned,
        duration_ms,
        ..Default::default()
    };

    let started_at = Utc::now();
    for _ in 0..candidates {
        let failed = store.rng.random_bool(ITEM_FAILURE_RATE);
        let status = if failed {
            MigrationStatus::Failed
        } else {
            MigrationStatus::Completed
        };
        let mut migration = factories::migration(&mut store.rng, policy, status);
        migration.started_at = started_at;
        if let Some(took) = migration.duration_ms {
            migration.completed_at = Some(started_at + Duration::milliseconds(took as i64));
        }

        if failed {
            result.items_failed += 1;
        } else {
            result.items_migrated += 1;
            result.bytes_migrated += migration.size_bytes;
        }
        if !dry_run {
            result.migration_ids.push(migration.id.clone());
            // Ids come from the seeded generator and cannot collide in practice.
            if let Err(err) = store.migrations.add(migration) {
                warn!(error = %err, "Dropping migration record");
            }
        }
    }

    result.message = if dry_run {
        format!("Dry run: {} items would be migrated", result.items_migrated)
    } else {
        format!(
            "Migrated {} items ({} failed)",
            result.items_migrated, result.items_failed
        )
    };
    info!(
        policy_id = %policy.id,
        dry_run,
        migrated = result.items_migrated,
        failed = result.items_failed,
        "Policy executed"
    );
    result
}

/// Execute every active root policy in priority order.
pub fn process_all(store: &mut FixtureStore, dry_run: bool, strict: bool) -> ApiResult<ProcessAllResult> {
    let mut roots: Vec<(i32, String)> = store
        .policies
        .iter()
        .filter(|p| p.is_active && p.parent_id.is_none())
        .map(|p| (p.priority, p.id.clone()))
        .collect();
    roots.sort_by_key(|(priority, _)| *priority);

    let mut results = Vec::with_capacity(roots.len());
    for (_, id) in roots {
        match execute(store, &id, dry_run, strict) {
            Ok(result) => results.push(result),
            Err(ApiError::BadRequest { message }) => {
                warn!(policy_id = %id, reason = %message, "Skipping policy");
                if let Some(policy) = store.policies.get(&id) {
                    results.push(ExecutionResult::skipped(policy, dry_run, message));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok(ProcessAllResult {
        policies_executed: results.iter().filter(|r| r.success).count(),
        total_items_migrated: results.iter().map(|r| r.items_migrated).sum(),
        total_bytes_migrated: results.iter().map(|r| r.bytes_migrated).sum(),
        results,
    })
}
