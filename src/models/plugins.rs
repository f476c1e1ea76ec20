use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Plugin catalogue
// ============================================================================

/// What a plugin contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    /// Contributes custom validators.
    #[default]
    Validator,
    /// Contributes custom reporters.
    Reporter,
    /// Contributes both.
    Mixed,
}

/// Marketplace status of a plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Listed but not active.
    #[default]
    Available,
    /// Installed and active.
    Enabled,
    /// Installed but switched off.
    Disabled,
}

/// Trust classification shown on plugin cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Signed by a trusted signer.
    Trusted,
    /// Signature verified.
    Verified,
    /// No signature.
    #[default]
    Unverified,
    /// Runs in a restricted sandbox.
    Sandboxed,
}

/// A plugin listed in the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    /// Unique plugin identifier.
    pub id: String,
    /// Machine name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Short description.
    pub description: String,
    /// Currently installed (or listed) version.
    pub version: String,
    /// Newest published version.
    pub latest_version: Option<String>,
    /// Declared plugin type.
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    /// Marketplace status.
    pub status: PluginStatus,
    /// Whether the plugin is installed.
    pub is_installed: bool,
    /// Marketplace install counter.
    pub install_count: u64,
    /// When the plugin was installed.
    pub installed_at: Option<DateTime<Utc>>,
    /// Average rating (0.0-5.0).
    pub rating: f64,
    /// Author name.
    pub author: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Trust classification.
    pub security_level: SecurityLevel,
    /// Number of validators shipped.
    pub validators_count: u32,
    /// Number of reporters shipped.
    pub reporters_count: u32,
    /// When the plugin was listed.
    pub created_at: DateTime<Utc>,
    /// When the plugin was last modified.
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Runtime lifecycle state of a loaded plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Not loaded.
    #[default]
    Unloaded,
    /// Module is being loaded.
    Loading,
    /// Module loaded.
    Loaded,
    /// Running initialisation hooks.
    Initializing,
    /// Initialised and ready to start.
    Initialized,
    /// Starting.
    Starting,
    /// Active.
    Running,
    /// Stopping.
    Stopping,
    /// Stopped, may be restarted.
    Stopped,
    /// Failed; only recoverable by unloading.
    Error,
    /// Administratively disabled.
    Disabled,
}

impl LifecycleState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Loading => "loading",
            LifecycleState::Loaded => "loaded",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Error => "error",
            LifecycleState::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// State before the transition.
    pub from_state: LifecycleState,
    /// State after the transition.
    pub to_state: LifecycleState,
    /// What caused it (`manual`, `hot_reload`, ...).
    pub trigger: String,
    /// Whether adjacency was bypassed.
    pub forced: bool,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle record of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginLifecycle {
    /// Owning plugin.
    pub plugin_id: String,
    /// Current state.
    pub current_state: LifecycleState,
    /// States reachable without forcing.
    pub allowed_transitions: Vec<LifecycleState>,
    /// Append-only transition log.
    pub state_history: Vec<StateTransition>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// Hot-reload watcher settings of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotReloadConfig {
    /// Owning plugin.
    pub plugin_id: String,
    /// Whether reloads are allowed.
    pub enabled: bool,
    /// Paths watched for changes.
    pub watch_paths: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// When the last reload happened.
    pub last_reload_at: Option<DateTime<Utc>>,
    /// Number of reloads performed.
    pub reload_count: u32,
}

/// Extension point a hook attaches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    /// Before a validation run.
    #[default]
    BeforeValidation,
    /// After a validation run.
    AfterValidation,
    /// When a report is generated.
    OnReportGenerate,
    /// When a schema change is detected.
    OnSchemaChange,
    /// When an anomaly is detected.
    OnAnomalyDetected,
}

/// A hook registered by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRegistration {
    /// Unique hook identifier.
    pub id: String,
    /// Owning plugin.
    pub plugin_id: String,
    /// Extension point.
    pub hook_type: HookType,
    /// Execution priority (lower runs first).
    pub priority: i32,
    /// Whether the hook is active.
    pub enabled: bool,
    /// When the hook was registered.
    pub created_at: DateTime<Utc>,
}

/// Trust level assigned to a signer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Fully trusted.
    Trusted,
    /// Verified identity.
    #[default]
    Verified,
    /// Known but limited.
    Limited,
}

/// A signer in the plugin trust store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedSigner {
    /// Unique signer identifier.
    pub id: String,
    /// Signer name.
    pub name: String,
    /// Public key fingerprint.
    pub fingerprint: String,
    /// Signature algorithm.
    pub algorithm: String,
    /// Assigned trust level.
    pub trust_level: TrustLevel,
    /// When the signer was added.
    pub added_at: DateTime<Utc>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Custom validators and reporters
// ============================================================================

/// Severity of issues raised by a validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Default severity.
    #[default]
    Medium,
    /// Needs attention.
    High,
    /// Blocks the pipeline.
    Critical,
}

/// Parameter accepted by a custom validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type (`string`, `integer`, `float`, `boolean`, `column`).
    #[serde(rename = "type")]
    pub param_type: String,
    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Help text.
    #[serde(default)]
    pub description: String,
}

/// A validator contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomValidator {
    /// Unique validator identifier.
    pub id: String,
    /// Owning plugin.
    pub plugin_id: String,
    /// Machine name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// Category (`completeness`, `uniqueness`, ...).
    pub category: String,
    /// Severity of raised issues.
    pub severity: Severity,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Declared parameters.
    pub parameters: Vec<ValidatorParameter>,
    /// Source body, stored for display only.
    pub code: String,
    /// Whether the validator is enabled.
    pub is_enabled: bool,
    /// Whether the code has been reviewed.
    pub is_verified: bool,
    /// Times the validator has been used.
    pub usage_count: u64,
    /// When the validator was created.
    pub created_at: DateTime<Utc>,
    /// When the validator was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Output format a reporter can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Standalone HTML document.
    #[default]
    Html,
    /// JSON document.
    Json,
    /// Comma-separated values.
    Csv,
    /// Markdown document.
    Markdown,
}

impl ReportFormat {
    /// All supported formats.
    pub const ALL: [ReportFormat; 4] = [
        ReportFormat::Html,
        ReportFormat::Json,
        ReportFormat::Csv,
        ReportFormat::Markdown,
    ];

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Markdown => "md",
        }
    }

    /// MIME type of the rendered file.
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Html => "text/html; charset=utf-8",
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

/// Configuration field exposed by a reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfigField {
    /// Field name.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Display label.
    pub label: String,
    /// Whether the field must be set.
    #[serde(default)]
    pub required: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// A reporter contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomReporter {
    /// Unique reporter identifier.
    pub id: String,
    /// Owning plugin.
    pub plugin_id: String,
    /// Machine name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// Formats the reporter can render.
    pub output_formats: Vec<ReportFormat>,
    /// Configuration fields.
    pub config_fields: Vec<ReporterConfigField>,
    /// Template body, stored for display only.
    pub template: String,
    /// Whether the reporter is enabled.
    pub is_enabled: bool,
    /// Whether the template has been reviewed.
    pub is_verified: bool,
    /// Times the reporter has been used.
    pub usage_count: u64,
    /// When the reporter was created.
    pub created_at: DateTime<Utc>,
    /// When the reporter was last modified.
    pub updated_at: DateTime<Utc>,
}
