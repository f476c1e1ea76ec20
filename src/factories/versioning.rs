use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;

use super::{new_id, recent};
use crate::models::{VersionInfo, VersionSummary, VersioningStrategy};

/// Label for the `number`th version under `strategy`.
pub fn version_label(
    strategy: VersioningStrategy,
    number: u32,
    created_at: DateTime<Utc>,
    content_hash: &str,
) -> String {
    match strategy {
        VersioningStrategy::Incremental => format!("v{}", number),
        VersioningStrategy::Semantic => format!("1.{}.0", number.saturating_sub(1)),
        VersioningStrategy::Timestamp => created_at.format("%Y%m%dT%H%M%S").to_string(),
        VersioningStrategy::Gitlike => content_hash.chars().take(7).collect(),
    }
}

/// A 64-character hex digest.
pub fn content_hash(rng: &mut impl Rng) -> String {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Issue counts whose total matches the per-severity breakdown.
pub fn version_summary(rng: &mut impl Rng) -> VersionSummary {
    let critical = if rng.random_bool(0.25) {
        rng.random_range(1..3)
    } else {
        0
    };
    let high = rng.random_range(0..5);
    let medium = rng.random_range(0..10);
    let low = rng.random_range(0..15);
    VersionSummary {
        total_issues: critical + high + medium + low,
        critical,
        high,
        medium,
        low,
        passed: critical == 0 && high == 0,
    }
}

/// Version `number` of `source_id`, chained to `parent_version_id`.
pub fn version(
    rng: &mut impl Rng,
    source_id: &str,
    number: u32,
    parent_version_id: Option<&str>,
    strategy: VersioningStrategy,
) -> VersionInfo {
    let content_hash = content_hash(rng);
    let created_at = recent(rng, 90);
    VersionInfo {
        id: new_id(rng),
        source_id: source_id.to_string(),
        version_number: number,
        version_label: version_label(strategy, number, created_at, &content_hash),
        strategy,
        validation_id: Some(new_id(rng)),
        parent_version_id: parent_version_id.map(str::to_string),
        summary: version_summary(rng),
        content_hash,
        metadata: json!({}),
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_version_labels() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let hash = "abcdef0123456789";
        assert_eq!(version_label(VersioningStrategy::Incremental, 3, at, hash), "v3");
        assert_eq!(version_label(VersioningStrategy::Semantic, 3, at, hash), "1.2.0");
        assert_eq!(
            version_label(VersioningStrategy::Timestamp, 3, at, hash),
            "20260304T050607"
        );
        assert_eq!(version_label(VersioningStrategy::Gitlike, 3, at, hash), "abcdef0");
    }

    #[test]
    fn test_summary_totals_match() {
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..50 {
            let s = version_summary(&mut rng);
            assert_eq!(s.total_issues, s.critical + s.high + s.medium + s.low);
            assert_eq!(s.passed, s.critical == 0 && s.high == 0);
        }
    }

    #[test]
    fn test_version_links_parent() {
        let mut rng = StdRng::seed_from_u64(6);
        let v = version(&mut rng, "src", 2, Some("parent"), VersioningStrategy::Incremental);
        assert_eq!(v.version_label, "v2");
        assert_eq!(v.parent_version_id.as_deref(), Some("parent"));
        assert_eq!(v.content_hash.len(), 64);
    }
}
