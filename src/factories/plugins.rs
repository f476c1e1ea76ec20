use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::json;

use super::{new_id, pick, recent, round_to};
use crate::plugins::extensions::BUILTIN_CATEGORIES;
use crate::models::{
    CustomReporter, CustomValidator, HookRegistration, HookType, HotReloadConfig, Plugin,
    PluginStatus, PluginType, ReportFormat, ReporterConfigField, SecurityLevel, Severity,
    TrustLevel, TrustedSigner, ValidatorParameter,
};

const PLUGIN_NAMES: [(&str, &str); 10] = [
    ("pii-guard", "PII Guard"),
    ("geo-validators", "Geo Validators"),
    ("finance-rules", "Finance Rules"),
    ("slack-reporter", "Slack Reporter"),
    ("pdf-export", "PDF Export"),
    ("schema-drift", "Schema Drift Toolkit"),
    ("regex-pack", "Regex Pack"),
    ("iot-sanity", "IoT Sanity Checks"),
    ("hipaa-suite", "HIPAA Compliance Suite"),
    ("markdown-digest", "Markdown Digest"),
];

const AUTHORS: [&str; 5] = [
    "Data Platform Team",
    "Quality Guild",
    "Acme Analytics",
    "OpenDQ Community",
    "Internal Tools",
];

const TAGS: [&str; 8] = [
    "pii",
    "finance",
    "geo",
    "compliance",
    "export",
    "notifications",
    "iot",
    "schema",
];

fn semver(rng: &mut impl Rng) -> (u32, u32, u32) {
    (
        rng.random_range(0..3),
        rng.random_range(0..10),
        rng.random_range(0..20),
    )
}

/// A marketplace plugin in a random install state.
pub fn plugin(rng: &mut impl Rng, index: usize) -> Plugin {
    let (base, display) = PLUGIN_NAMES[index % PLUGIN_NAMES.len()];
    let suffix = index / PLUGIN_NAMES.len();
    let (name, display_name) = if suffix == 0 {
        (base.to_string(), display.to_string())
    } else {
        (format!("{}-{}", base, suffix + 1), format!("{} {}", display, suffix + 1))
    };

    let plugin_type = pick(
        rng,
        &[PluginType::Validator, PluginType::Reporter, PluginType::Mixed],
    );
    let status = pick(
        rng,
        &[
            PluginStatus::Available,
            PluginStatus::Available,
            PluginStatus::Enabled,
            PluginStatus::Disabled,
        ],
    );
    let is_installed = status != PluginStatus::Available;

    let (major, minor, patch) = semver(rng);
    let version = format!("{}.{}.{}", major, minor, patch);
    let latest_version = if rng.random_bool(0.3) {
        format!("{}.{}.{}", major, minor + 1, 0)
    } else {
        version.clone()
    };

    let validators_count = match plugin_type {
        PluginType::Reporter => 0,
        _ => rng.random_range(1..=3),
    };
    let reporters_count = match plugin_type {
        PluginType::Validator => 0,
        _ => rng.random_range(1..=2),
    };

    let created_at = recent(rng, 365);
    let tag_count = rng.random_range(1..=3);
    let mut tags: Vec<String> = (0..tag_count)
        .map(|_| pick(rng, &TAGS).to_string())
        .collect();
    tags.sort();
    tags.dedup();

    Plugin {
        id: new_id(rng),
        description: format!("{} for data quality pipelines.", display_name),
        name,
        display_name,
        version,
        latest_version: Some(latest_version),
        plugin_type,
        status,
        is_installed,
        install_count: rng.random_range(10..50_000),
        installed_at: is_installed.then(|| recent(rng, 60)),
        rating: round_to(rng.random_range(2.5..5.0), 1),
        author: pick(rng, &AUTHORS).to_string(),
        tags,
        security_level: pick(
            rng,
            &[
                SecurityLevel::Trusted,
                SecurityLevel::Verified,
                SecurityLevel::Unverified,
                SecurityLevel::Sandboxed,
            ],
        ),
        validators_count,
        reporters_count,
        created_at,
        updated_at: created_at,
    }
}

/// Defaults for a plugin created through the API: listed, not installed.
pub fn new_plugin(rng: &mut impl Rng) -> Plugin {
    let now = Utc::now();
    Plugin {
        id: new_id(rng),
        name: "new-plugin".to_string(),
        display_name: "New Plugin".to_string(),
        description: String::new(),
        version: "0.1.0".to_string(),
        latest_version: Some("0.1.0".to_string()),
        plugin_type: PluginType::Validator,
        status: PluginStatus::Available,
        is_installed: false,
        install_count: 0,
        installed_at: None,
        rating: 0.0,
        author: "unknown".to_string(),
        tags: Vec::new(),
        security_level: SecurityLevel::Unverified,
        validators_count: 0,
        reporters_count: 0,
        created_at: now,
        updated_at: now,
    }
}

/// A validator owned by `plugin_id`.
pub fn custom_validator(rng: &mut impl Rng, plugin_id: &str) -> CustomValidator {
    let category = pick(rng, &BUILTIN_CATEGORIES);
    let name = format!("{}_check_{}", category, rng.random_range(100..1000));
    let created_at = recent(rng, 120);

    CustomValidator {
        id: new_id(rng),
        plugin_id: plugin_id.to_string(),
        display_name: name.replace('_', " "),
        description: format!("Custom {} validator.", category),
        name,
        category: category.to_string(),
        severity: pick(
            rng,
            &[Severity::Low, Severity::Medium, Severity::High, Severity::Critical],
        ),
        tags: vec![category.to_string()],
        parameters: vec![
            ValidatorParameter {
                name: "column".to_string(),
                param_type: "column".to_string(),
                required: true,
                default: None,
                description: "Column to check".to_string(),
            },
            ValidatorParameter {
                name: "threshold".to_string(),
                param_type: "float".to_string(),
                required: false,
                default: Some(json!(0.95)),
                description: "Minimum pass ratio".to_string(),
            },
        ],
        code: format!(
            "def validate(df, column, threshold=0.95):\n    ratio = df[column].notna().mean()\n    return ratio >= threshold  # {}\n",
            category
        ),
        is_enabled: rng.random_bool(0.8),
        is_verified: rng.random_bool(0.5),
        usage_count: rng.random_range(0..5_000),
        created_at,
        updated_at: created_at,
    }
}

/// A reporter owned by `plugin_id`.
pub fn custom_reporter(rng: &mut impl Rng, plugin_id: &str) -> CustomReporter {
    let mut output_formats: Vec<ReportFormat> = ReportFormat::ALL
        .iter()
        .copied()
        .filter(|_| rng.random_bool(0.6))
        .collect();
    if output_formats.is_empty() {
        output_formats.push(ReportFormat::Html);
    }
    let suffix = rng.random_range(100..1000);
    let created_at = recent(rng, 120);

    CustomReporter {
        id: new_id(rng),
        plugin_id: plugin_id.to_string(),
        name: format!("digest_reporter_{}", suffix),
        display_name: format!("Digest Reporter {}", suffix),
        description: "Summarises validation results.".to_string(),
        output_formats,
        config_fields: vec![
            ReporterConfigField {
                name: "title".to_string(),
                field_type: "string".to_string(),
                label: "Report title".to_string(),
                required: false,
                default: Some(json!("Validation Report")),
            },
            ReporterConfigField {
                name: "include_samples".to_string(),
                field_type: "boolean".to_string(),
                label: "Include failing samples".to_string(),
                required: false,
                default: Some(json!(true)),
            },
        ],
        template: "<h1>{{ title }}</h1>\n<p>{{ summary.pass_rate }}% passed</p>\n".to_string(),
        is_enabled: rng.random_bool(0.8),
        is_verified: rng.random_bool(0.5),
        usage_count: rng.random_range(0..2_000),
        created_at,
        updated_at: created_at,
    }
}

/// A hook registration for `plugin_id`.
pub fn hook(rng: &mut impl Rng, plugin_id: &str) -> HookRegistration {
    HookRegistration {
        id: new_id(rng),
        plugin_id: plugin_id.to_string(),
        hook_type: pick(
            rng,
            &[
                HookType::BeforeValidation,
                HookType::AfterValidation,
                HookType::OnReportGenerate,
                HookType::OnSchemaChange,
                HookType::OnAnomalyDetected,
            ],
        ),
        priority: rng.random_range(0..100),
        enabled: true,
        created_at: recent(rng, 60),
    }
}

/// A trust-store signer.
pub fn signer(rng: &mut impl Rng) -> TrustedSigner {
    let fingerprint: String = (0..20)
        .map(|_| format!("{:02X}", rng.random::<u8>()))
        .collect::<Vec<_>>()
        .join(":");
    let added_at = recent(rng, 400);
    TrustedSigner {
        id: new_id(rng),
        name: pick(rng, &AUTHORS).to_string(),
        fingerprint,
        algorithm: pick(rng, &["ed25519", "rsa-4096", "ecdsa-p256"]).to_string(),
        trust_level: pick(
            rng,
            &[TrustLevel::Trusted, TrustLevel::Verified, TrustLevel::Limited],
        ),
        added_at,
        expires_at: rng
            .random_bool(0.5)
            .then(|| added_at + Duration::days(730)),
    }
}

/// Default hot-reload settings for a plugin.
pub fn hot_reload_config(plugin_id: &str) -> HotReloadConfig {
    HotReloadConfig {
        plugin_id: plugin_id.to_string(),
        enabled: true,
        watch_paths: vec![format!("plugins/{}/", plugin_id)],
        debounce_ms: 500,
        last_reload_at: None,
        reload_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_plugin_install_fields_are_consistent() {
        let mut rng = StdRng::seed_from_u64(11);
        for i in 0..40 {
            let p = plugin(&mut rng, i);
            assert_eq!(p.is_installed, p.status != PluginStatus::Available);
            assert_eq!(p.is_installed, p.installed_at.is_some());
            assert!((0.0..=5.0).contains(&p.rating));
            match p.plugin_type {
                PluginType::Validator => assert_eq!(p.reporters_count, 0),
                PluginType::Reporter => assert_eq!(p.validators_count, 0),
                PluginType::Mixed => {
                    assert!(p.validators_count > 0 && p.reporters_count > 0)
                }
            }
        }
    }

    #[test]
    fn test_new_plugin_defaults_to_available() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = new_plugin(&mut rng);
        assert_eq!(p.status, PluginStatus::Available);
        assert!(!p.is_installed);
    }

    #[test]
    fn test_reporter_always_has_a_format() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            assert!(!custom_reporter(&mut rng, "p").output_formats.is_empty());
        }
    }

    #[test]
    fn test_signer_fingerprint_shape() {
        let mut rng = StdRng::seed_from_u64(5);
        let s = signer(&mut rng);
        assert_eq!(s.fingerprint.split(':').count(), 20);
    }
}
