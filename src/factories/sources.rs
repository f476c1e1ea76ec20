use rand::Rng;

use super::{new_id, pick, recent};
use crate::models::{Source, SourceColumn, SourceType};

const SOURCE_NAMES: [&str; 12] = [
    "customers",
    "orders",
    "payments",
    "inventory",
    "shipments",
    "web_events",
    "sensor_readings",
    "invoices",
    "subscriptions",
    "support_tickets",
    "product_catalog",
    "ad_impressions",
];

const COLUMN_POOL: [(&str, &str); 12] = [
    ("amount", "float64"),
    ("quantity", "int64"),
    ("price", "float64"),
    ("latency_ms", "float64"),
    ("temperature", "float64"),
    ("age", "int64"),
    ("score", "float64"),
    ("discount", "float64"),
    ("email", "string"),
    ("country", "string"),
    ("status", "string"),
    ("created_at", "datetime"),
];

const SOURCE_TYPES: [SourceType; 5] = [
    SourceType::File,
    SourceType::Postgresql,
    SourceType::Mysql,
    SourceType::Snowflake,
    SourceType::Bigquery,
];

/// A data source with at least three numeric columns.
pub fn source(rng: &mut impl Rng, index: usize) -> Source {
    let base = SOURCE_NAMES[index % SOURCE_NAMES.len()];
    let name = if index < SOURCE_NAMES.len() {
        base.to_string()
    } else {
        format!("{}_{}", base, index / SOURCE_NAMES.len() + 1)
    };

    // Numeric columns come first in the pool; always take the first three
    // so detectors have something to work with.
    let extra = rng.random_range(1..=5);
    let columns = COLUMN_POOL
        .iter()
        .take(3)
        .chain(COLUMN_POOL.iter().skip(3 + rng.random_range(0..3)).take(extra))
        .map(|(name, dtype)| SourceColumn {
            name: (*name).to_string(),
            dtype: (*dtype).to_string(),
        })
        .collect();

    let created_at = recent(rng, 180);
    let updated_at = created_at.max(recent(rng, 30));

    Source {
        id: new_id(rng),
        description: Some(format!("Fixture dataset for {}", name.replace('_', " "))),
        name,
        source_type: pick(rng, &SOURCE_TYPES),
        is_active: rng.random_bool(0.9),
        row_count: rng.random_range(1_000..500_000),
        columns,
        created_at,
        updated_at,
        last_validated_at: rng.random_bool(0.7).then(|| recent(rng, 7)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_source_has_numeric_columns() {
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..20 {
            let s = source(&mut rng, i);
            assert!(s.numeric_columns().len() >= 3, "{:?}", s.columns);
            assert!(s.updated_at >= s.created_at);
        }
    }

    #[test]
    fn test_source_names_are_unique_past_the_pool() {
        let mut rng = StdRng::seed_from_u64(3);
        let names: std::collections::HashSet<String> =
            (0..30).map(|i| source(&mut rng, i).name).collect();
        assert_eq!(names.len(), 30);
    }
}
