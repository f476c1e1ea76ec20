//! Validation result versioning.
//!
//! Versions of a source form a backward chain through `parent_version_id`.
//! New versions, rollbacks included, always become the latest.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::factories;
use crate::models::{SummaryChange, VersionDiff, VersionInfo, VersionSummary, VersioningStrategy};
use crate::storage::FixtureStore;

/// Default number of entries a history walk returns.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Body of a version create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateVersionRequest {
    /// Source to version.
    pub source_id: String,
    /// Validation run captured.
    pub validation_id: Option<String>,
    /// Labelling strategy.
    pub strategy: Option<VersioningStrategy>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
}

/// Result of a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResponse {
    /// Whether a new version was created.
    pub success: bool,
    /// Owning source.
    pub source_id: String,
    /// Version whose content was restored.
    pub rolled_back_to: String,
    /// The new latest version.
    pub new_version: Option<VersionInfo>,
    /// Outcome message.
    pub message: String,
}

/// Append a version to a source's chain.
fn append(
    store: &mut FixtureStore,
    source_id: &str,
    strategy: VersioningStrategy,
    build: impl FnOnce(&mut VersionInfo),
) -> ApiResult<VersionInfo> {
    store.sources.require(source_id)?;
    let parent = store.latest_version(source_id).map(|latest| latest.id.clone());
    let number = store.next_version_number(source_id);

    let mut version = factories::version(&mut store.rng, source_id, number, parent.as_deref(), strategy);
    version.created_at = chrono::Utc::now();
    build(&mut version);
    version.version_label = factories::version_label(
        strategy,
        version.version_number,
        version.created_at,
        &version.content_hash,
    );
    info!(
        source_id,
        version_id = %version.id,
        version_number = version.version_number,
        "Version created"
    );
    Ok(store.versions.add(version)?.clone())
}

/// Create a new latest version for a source.
pub fn create(store: &mut FixtureStore, request: &CreateVersionRequest) -> ApiResult<VersionInfo> {
    if request.source_id.is_empty() {
        return Err(ApiError::bad_request("source_id is required"));
    }
    let strategy = request.strategy.unwrap_or_default();
    append(store, &request.source_id, strategy, |v| {
        if request.validation_id.is_some() {
            v.validation_id = request.validation_id.clone();
        }
        if let Some(metadata) = &request.metadata {
            v.metadata = metadata.clone();
        }
    })
}

/// Walk the parent chain backward from `version_id`, newest first.
pub fn history(store: &FixtureStore, version_id: &str, limit: usize) -> ApiResult<Vec<VersionInfo>> {
    let mut chain = vec![store.versions.require(version_id)?.clone()];
    while chain.len() < limit {
        let Some(parent_id) = chain.last().and_then(|v| v.parent_version_id.clone()) else {
            break;
        };
        match store.versions.get(&parent_id) {
            Some(parent) if !chain.iter().any(|v| v.id == parent.id) => chain.push(parent.clone()),
            _ => break,
        }
    }
    Ok(chain)
}

fn summary_fields(s: &VersionSummary) -> [(&'static str, i64); 6] {
    [
        ("total_issues", s.total_issues.into()),
        ("critical", s.critical.into()),
        ("high", s.high.into()),
        ("medium", s.medium.into()),
        ("low", s.low.into()),
        ("passed", i64::from(s.passed)),
    ]
}

/// Compare two versions of the same source, older first.
pub fn diff(a: &VersionInfo, b: &VersionInfo) -> ApiResult<VersionDiff> {
    if a.source_id != b.source_id {
        return Err(ApiError::bad_request(
            "Versions belong to different sources and cannot be compared",
        ));
    }
    let (older, newer) = if a.version_number <= b.version_number {
        (a, b)
    } else {
        (b, a)
    };

    let summary_changes: Vec<SummaryChange> = summary_fields(&older.summary)
        .into_iter()
        .zip(summary_fields(&newer.summary))
        .filter(|((_, before), (_, after))| before != after)
        .map(|((field, before), (_, after))| SummaryChange {
            field: field.to_string(),
            before,
            after,
            delta: after - before,
        })
        .collect();

    let severities = |pred: fn(i64) -> bool| -> Vec<String> {
        summary_changes
            .iter()
            .filter(|c| matches!(c.field.as_str(), "critical" | "high" | "medium" | "low"))
            .filter(|c| pred(c.delta))
            .map(|c| c.field.clone())
            .collect()
    };
    let issues_added = severities(|d| d > 0);
    let issues_removed = severities(|d| d < 0);
    let has_changes = !summary_changes.is_empty() || older.content_hash != newer.content_hash;

    Ok(VersionDiff {
        version_a: older.clone(),
        version_b: newer.clone(),
        summary_changes,
        issues_added,
        issues_removed,
        has_changes,
    })
}

/// Restore the content of `version_id` as a new latest version.
pub fn rollback(store: &mut FixtureStore, version_id: &str) -> ApiResult<RollbackResponse> {
    let target = store.versions.require(version_id)?.clone();
    let is_latest = store
        .latest_version(&target.source_id)
        .is_some_and(|latest| latest.id == target.id);
    if is_latest {
        warn!(version_id, "Rollback to the latest version ignored");
        return Ok(RollbackResponse {
            success: false,
            source_id: target.source_id.clone(),
            rolled_back_to: target.id.clone(),
            new_version: None,
            message: format!("Version {} is already the latest", target.version_label),
        });
    }

    let new_version = append(store, &target.source_id, target.strategy, |v| {
        v.summary = target.summary.clone();
        v.content_hash = target.content_hash.clone();
        v.validation_id = target.validation_id.clone();
        let mut metadata = match &target.metadata {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        metadata.insert("rolled_back_from".to_string(), json!(target.id));
        v.metadata = Value::Object(metadata);
    })?;

    Ok(RollbackResponse {
        success: true,
        source_id: target.source_id.clone(),
        rolled_back_to: target.id.clone(),
        message: format!(
            "Rolled back to {} as {}",
            target.version_label, new_version.version_label
        ),
        new_version: Some(new_version),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureConfig;

    fn store() -> FixtureStore {
        FixtureStore::seeded(&FixtureConfig::default())
    }

    fn source_id(store: &FixtureStore) -> String {
        store.sources.all()[0].id.clone()
    }

    #[test]
    fn test_create_extends_chain() {
        let mut store = store();
        let source = source_id(&store);
        let latest = store.latest_version(&source).cloned().unwrap();
        let v = create(
            &mut store,
            &CreateVersionRequest {
                source_id: source.clone(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(v.version_number, latest.version_number + 1);
        assert_eq!(v.parent_version_id.as_deref(), Some(latest.id.as_str()));
        assert_eq!(v.version_label, format!("v{}", v.version_number));
    }

    #[test]
    fn test_numbers_are_not_reused_after_delete() {
        let mut store = store();
        let source = source_id(&store);
        let request = CreateVersionRequest {
            source_id: source.clone(),
            ..Default::default()
        };
        let first = create(&mut store, &request).unwrap();
        store.versions.remove(&first.id).unwrap();

        let second = create(&mut store, &request).unwrap();
        assert_eq!(second.version_number, first.version_number + 1);
        assert_ne!(second.parent_version_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(
            store.latest_version(&source).map(|v| v.id.as_str()),
            Some(second.id.as_str())
        );
    }

    #[test]
    fn test_create_for_unknown_source() {
        let mut store = store();
        let err = create(
            &mut store,
            &CreateVersionRequest {
                source_id: "ghost".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[test]
    fn test_history_walks_to_root() {
        let store = store();
        let source = source_id(&store);
        let latest = store.latest_version(&source).unwrap();
        let chain = history(&store, &latest.id, 100).unwrap();
        assert_eq!(chain.len(), store.versions_for_source(&source).len());
        assert!(chain.last().unwrap().parent_version_id.is_none());
        let limited = history(&store, &latest.id, 2).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_history_stops_at_missing_parent() {
        let mut store = store();
        let source = source_id(&store);
        let versions: Vec<String> = store
            .versions_for_source(&source)
            .iter()
            .map(|v| v.id.clone())
            .collect();
        // versions are newest first; drop the second newest.
        store.versions.remove(&versions[1]).unwrap();
        let chain = history(&store, &versions[0], 100).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_diff_orders_and_counts() {
        let store = store();
        let source = source_id(&store);
        let versions = store.versions_for_source(&source);
        let (newer, older) = (versions[0], versions[1]);
        let d = diff(newer, older).unwrap();
        assert_eq!(d.version_a.id, older.id);
        for change in &d.summary_changes {
            assert_eq!(change.delta, change.after - change.before);
        }
        assert_eq!(d.has_changes, !d.summary_changes.is_empty() || older.content_hash != newer.content_hash);
    }

    #[test]
    fn test_diff_across_sources_fails() {
        let store = store();
        let a = store.versions_for_source(&store.sources.all()[0].id)[0];
        let b = store.versions_for_source(&store.sources.all()[1].id)[0];
        assert!(diff(a, b).is_err());
    }

    #[test]
    fn test_rollback_copies_content() {
        let mut store = store();
        let source = source_id(&store);
        let target = store.versions_for_source(&source)[2].clone();
        let resp = rollback(&mut store, &target.id).unwrap();
        assert!(resp.success);
        let new_version = resp.new_version.unwrap();
        assert_eq!(new_version.summary, target.summary);
        assert_eq!(new_version.content_hash, target.content_hash);
        assert_eq!(new_version.metadata["rolled_back_from"], json!(target.id));
        assert_eq!(store.latest_version(&source).unwrap().id, new_version.id);

        let again = rollback(&mut store, &new_version.id).unwrap();
        assert!(!again.success);
    }
}
