//! Custom validators and reporters contributed by plugins.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::models::{CustomReporter, CustomValidator, ReportFormat};

/// Categories every deployment knows about, even when empty.
pub const BUILTIN_CATEGORIES: [&str; 6] = [
    "completeness",
    "uniqueness",
    "validity",
    "consistency",
    "accuracy",
    "timeliness",
];

/// Body of a validator test run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidatorTestRequest {
    /// Rows to run against; an array of objects.
    pub test_data: Value,
    /// Parameter values keyed by name.
    pub param_values: Map<String, Value>,
}

/// Outcome of a validator test run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorTestResult {
    /// Whether the validator executed.
    pub success: bool,
    /// Whether the data passed.
    pub passed: bool,
    /// Simulated run time.
    pub execution_time_ms: u64,
    /// Row-level figures.
    pub result: Option<Value>,
    /// Why execution failed.
    pub error: Option<String>,
    /// Non-fatal concerns.
    pub warnings: Vec<String>,
}

/// Category with its validator count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    /// Category name.
    pub name: String,
    /// Validators in the category.
    pub count: usize,
}

fn failure(error: String) -> ValidatorTestResult {
    ValidatorTestResult {
        success: false,
        passed: false,
        execution_time_ms: 0,
        result: None,
        error: Some(error),
        warnings: Vec::new(),
    }
}

/// Run a validator against sample rows.
///
/// A row fails when the checked column is missing or null. The pass ratio is
/// compared against the `threshold` parameter (default 0.95).
pub fn test_validator(
    rng: &mut impl Rng,
    validator: &CustomValidator,
    request: &ValidatorTestRequest,
) -> ValidatorTestResult {
    let missing: Vec<&str> = validator
        .parameters
        .iter()
        .filter(|p| p.required && !request.param_values.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        return failure(format!(
            "Missing required parameters: {}",
            missing.join(", ")
        ));
    }

    let rows = match &request.test_data {
        Value::Array(rows) => rows,
        Value::Null => return failure("test_data is required".to_string()),
        _ => return failure("test_data must be an array of row objects".to_string()),
    };

    let param = |name: &str| {
        request.param_values.get(name).cloned().or_else(|| {
            validator
                .parameters
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.default.clone())
        })
    };
    let column = param("column").and_then(|v| v.as_str().map(str::to_string));
    let threshold = param("threshold").and_then(|v| v.as_f64()).unwrap_or(0.95);

    let mut warnings = Vec::new();
    if rows.is_empty() {
        warnings.push("test_data is empty; nothing was checked".to_string());
    }
    if !validator.is_verified {
        warnings.push("Validator code has not been reviewed".to_string());
    }

    let failed_rows: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| match (&column, row) {
            (Some(column), Value::Object(fields)) => {
                fields.get(column).map_or(true, Value::is_null)
            }
            (None, Value::Object(fields)) => fields.values().any(Value::is_null),
            _ => true,
        })
        .map(|(i, _)| i)
        .collect();

    let checked = rows.len();
    let pass_ratio = if checked == 0 {
        1.0
    } else {
        (checked - failed_rows.len()) as f64 / checked as f64
    };

    ValidatorTestResult {
        success: true,
        passed: pass_ratio >= threshold,
        execution_time_ms: rng.random_range(2..120),
        result: Some(json!({
            "rows_checked": checked,
            "rows_failed": failed_rows.len(),
            "failed_row_indices": failed_rows,
            "pass_ratio": pass_ratio,
            "threshold": threshold,
        })),
        error: None,
        warnings,
    }
}

/// Category counts across `validators`, built-in categories included.
pub fn categories<'a>(validators: impl IntoIterator<Item = &'a CustomValidator>) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<String, usize> = BUILTIN_CATEGORIES
        .iter()
        .map(|c| (c.to_string(), 0))
        .collect();
    for v in validators {
        *counts.entry(v.category.clone()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| CategoryCount { name, count })
        .collect()
}

/// Whether `reporter` can render `format`.
pub fn supports_format(reporter: &CustomReporter, format: ReportFormat) -> bool {
    reporter.output_formats.contains(&format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factories;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn validator() -> CustomValidator {
        let mut rng = StdRng::seed_from_u64(3);
        factories::custom_validator(&mut rng, "p")
    }

    fn request(data: Value, params: Value) -> ValidatorTestRequest {
        serde_json::from_value(json!({ "test_data": data, "param_values": params })).unwrap()
    }

    #[test]
    fn test_missing_required_parameter() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = test_validator(&mut rng, &validator(), &request(json!([]), json!({})));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("column"));
    }

    #[test]
    fn test_null_values_fail_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let data = json!([{"email": "a@x"}, {"email": null}, {"email": "c@x"}, {}]);
        let result = test_validator(
            &mut rng,
            &validator(),
            &request(data, json!({"column": "email", "threshold": 0.5})),
        );
        assert!(result.success);
        assert!(result.passed);
        let figures = result.result.unwrap();
        assert_eq!(figures["rows_failed"], 2);
        assert_eq!(figures["failed_row_indices"], json!([1, 3]));
    }

    #[test]
    fn test_default_threshold_applies() {
        let mut rng = StdRng::seed_from_u64(1);
        let data = json!([{"v": 1}, {"v": null}]);
        let result = test_validator(&mut rng, &validator(), &request(data, json!({"column": "v"})));
        assert!(result.success);
        assert!(!result.passed);
    }

    #[test]
    fn test_non_array_data_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = test_validator(
            &mut rng,
            &validator(),
            &request(json!({"v": 1}), json!({"column": "v"})),
        );
        assert!(!result.success);
    }

    #[test]
    fn test_categories_include_builtins() {
        let mut v = validator();
        v.category = "custom_rules".to_string();
        let cats = categories([&v]);
        assert_eq!(cats.len(), BUILTIN_CATEGORIES.len() + 1);
        let custom = cats.iter().find(|c| c.name == "custom_rules").unwrap();
        assert_eq!(custom.count, 1);
    }
}
