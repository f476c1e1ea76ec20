use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use super::Collection;
use crate::anomaly::batch;
use crate::anomaly::streaming::StreamDetector;
use crate::config::FixtureConfig;
use crate::factories;
use crate::models::{
    AnomalyAlgorithm, AnomalyDetection, AnomalyExplanation, BatchDetectionJob, CustomReporter,
    CustomValidator, HookRegistration, HotReloadConfig, MigrationHistory, MigrationStatus,
    Plugin, PluginLifecycle, PluginType, PolicyType, Source, StorageTier, StreamingAlert,
    StreamingDataPoint, StreamingSession, TierPolicy, TieringConfig, TrustedSigner, VersionInfo,
    VersioningStrategy,
};

const SIGNER_COUNT: usize = 4;
const SEEDED_MIGRATIONS: usize = 12;

/// Record counts per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    /// Data sources.
    pub sources: usize,
    /// Marketplace plugins.
    pub plugins: usize,
    /// Hook registrations.
    pub hooks: usize,
    /// Trusted signers.
    pub signers: usize,
    /// Custom validators.
    pub validators: usize,
    /// Custom reporters.
    pub reporters: usize,
    /// Single-source detections.
    pub detections: usize,
    /// Stored explanations.
    pub explanations: usize,
    /// Batch jobs.
    pub batch_jobs: usize,
    /// Streaming sessions.
    pub streaming_sessions: usize,
    /// Streaming alerts.
    pub streaming_alerts: usize,
    /// Storage tiers.
    pub tiers: usize,
    /// Tier policies.
    pub policies: usize,
    /// Tiering configs.
    pub tiering_configs: usize,
    /// Migration records.
    pub migrations: usize,
    /// Result versions.
    pub versions: usize,
}

/// Every collection the mock API serves, plus the random source that
/// fills them.
///
/// A store is always built from an explicit seed; two stores built from
/// the same [`FixtureConfig`] hold the same ids and figures.
#[derive(Debug)]
pub struct FixtureStore {
    seed: u64,
    config: FixtureConfig,
    pub(crate) rng: StdRng,

    /// Data sources.
    pub sources: Collection<Source>,
    /// Marketplace plugins.
    pub plugins: Collection<Plugin>,
    /// Lifecycle records keyed by plugin id.
    pub lifecycles: Collection<PluginLifecycle>,
    /// Hot-reload settings keyed by plugin id.
    pub hot_reload: Collection<HotReloadConfig>,
    /// Hook registrations.
    pub hooks: Collection<HookRegistration>,
    /// Trust store.
    pub signers: Collection<TrustedSigner>,
    /// Custom validators.
    pub validators: Collection<CustomValidator>,
    /// Custom reporters.
    pub reporters: Collection<CustomReporter>,
    /// Single-source detections.
    pub detections: Collection<AnomalyDetection>,
    /// Stored explanations.
    pub explanations: Collection<AnomalyExplanation>,
    /// Batch jobs.
    pub batch_jobs: Collection<BatchDetectionJob>,
    /// Streaming sessions.
    pub streaming_sessions: Collection<StreamingSession>,
    /// Streaming alerts.
    pub streaming_alerts: Collection<StreamingAlert>,
    /// Storage tiers.
    pub tiers: Collection<StorageTier>,
    /// Tier policies.
    pub policies: Collection<TierPolicy>,
    /// Tiering configs.
    pub tiering_configs: Collection<TieringConfig>,
    /// Migration records.
    pub migrations: Collection<MigrationHistory>,
    /// Result versions.
    pub versions: Collection<VersionInfo>,

    pub(crate) detectors: HashMap<String, StreamDetector>,
    pub(crate) stream_points: HashMap<String, VecDeque<StreamingDataPoint>>,
    /// Highest version number ever issued per source, deleted versions included.
    version_numbers: HashMap<String, u32>,
}

impl FixtureStore {
    /// An empty store with a seeded random source.
    pub fn empty(config: &FixtureConfig) -> Self {
        Self {
            seed: config.seed,
            config: config.clone(),
            rng: StdRng::seed_from_u64(config.seed),
            sources: Collection::new(),
            plugins: Collection::new(),
            lifecycles: Collection::new(),
            hot_reload: Collection::new(),
            hooks: Collection::new(),
            signers: Collection::new(),
            validators: Collection::new(),
            reporters: Collection::new(),
            detections: Collection::new(),
            explanations: Collection::new(),
            batch_jobs: Collection::new(),
            streaming_sessions: Collection::new(),
            streaming_alerts: Collection::new(),
            tiers: Collection::new(),
            policies: Collection::new(),
            tiering_configs: Collection::new(),
            migrations: Collection::new(),
            versions: Collection::new(),
            detectors: HashMap::new(),
            stream_points: HashMap::new(),
            version_numbers: HashMap::new(),
        }
    }

    /// A store populated from `config`.
    pub fn seeded(config: &FixtureConfig) -> Self {
        let mut store = Self::empty(config);
        store.populate();
        info!(seed = config.seed, counts = ?store.counts(), "Fixture store initialised");
        store
    }

    /// Seed the store was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Rebuild from the original seed, discarding every change.
    pub fn reset(&mut self) {
        self.reinit(self.seed);
    }

    /// Rebuild from a new seed.
    pub fn reinit(&mut self, seed: u64) {
        let config = FixtureConfig {
            seed,
            ..self.config.clone()
        };
        *self = Self::seeded(&config);
    }

    /// Record counts per collection.
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            sources: self.sources.len(),
            plugins: self.plugins.len(),
            hooks: self.hooks.len(),
            signers: self.signers.len(),
            validators: self.validators.len(),
            reporters: self.reporters.len(),
            detections: self.detections.len(),
            explanations: self.explanations.len(),
            batch_jobs: self.batch_jobs.len(),
            streaming_sessions: self.streaming_sessions.len(),
            streaming_alerts: self.streaming_alerts.len(),
            tiers: self.tiers.len(),
            policies: self.policies.len(),
            tiering_configs: self.tiering_configs.len(),
            migrations: self.migrations.len(),
            versions: self.versions.len(),
        }
    }

    // ------------------------------------------------------------------
    // Derived queries
    // ------------------------------------------------------------------

    /// Detections of a source, most recently finished first.
    ///
    /// Runs that finished at the same instant keep reverse insertion order.
    pub fn detections_for_source(&self, source_id: &str) -> Vec<&AnomalyDetection> {
        let mut found: Vec<(usize, &AnomalyDetection)> = self
            .detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.source_id == source_id)
            .collect();
        found.sort_by(|(ia, a), (ib, b)| {
            let finished = |d: &AnomalyDetection| d.completed_at.unwrap_or(d.created_at);
            finished(b).cmp(&finished(a)).then(ib.cmp(ia))
        });
        found.into_iter().map(|(_, d)| d).collect()
    }

    /// The most recent detection of a source.
    pub fn latest_detection(&self, source_id: &str) -> Option<&AnomalyDetection> {
        self.detections_for_source(source_id).into_iter().next()
    }

    /// Explanations generated for a detection.
    pub fn explanations_for_detection(&self, detection_id: &str) -> Vec<&AnomalyExplanation> {
        self.explanations
            .iter()
            .filter(|e| e.detection_id == detection_id)
            .collect()
    }

    /// Alerts of a session, oldest first.
    pub fn alerts_for_session(&self, session_id: &str) -> Vec<&StreamingAlert> {
        self.streaming_alerts
            .iter()
            .filter(|a| a.session_id == session_id)
            .collect()
    }

    /// Versions of a source, newest first.
    pub fn versions_for_source(&self, source_id: &str) -> Vec<&VersionInfo> {
        let mut found: Vec<&VersionInfo> = self
            .versions
            .iter()
            .filter(|v| v.source_id == source_id)
            .collect();
        found.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        found
    }

    /// The highest-numbered version of a source.
    pub fn latest_version(&self, source_id: &str) -> Option<&VersionInfo> {
        self.versions
            .iter()
            .filter(|v| v.source_id == source_id)
            .max_by_key(|v| v.version_number)
    }

    /// Reserve the next version number of a source.
    ///
    /// Numbers never repeat, even after the latest version is deleted.
    pub fn next_version_number(&mut self, source_id: &str) -> u32 {
        let latest = self.latest_version(source_id).map_or(0, |v| v.version_number);
        let issued = self.version_numbers.entry(source_id.to_string()).or_insert(0);
        *issued = (*issued).max(latest) + 1;
        *issued
    }

    /// Children attached to a composite policy, by priority.
    pub fn policy_children(&self, policy_id: &str) -> Vec<&TierPolicy> {
        let mut children: Vec<&TierPolicy> = self
            .policies
            .iter()
            .filter(|p| p.parent_id.as_deref() == Some(policy_id))
            .collect();
        children.sort_by_key(|p| p.priority);
        children
    }

    /// Migrations triggered by a policy.
    pub fn migrations_for_policy(&self, policy_id: &str) -> Vec<&MigrationHistory> {
        self.migrations
            .iter()
            .filter(|m| m.policy_id == policy_id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    fn populate(&mut self) {
        // Ids come from the seeded generator and are unique; an add can
        // only fail on a collision, which is logged and skipped.
        self.populate_sources();
        self.populate_plugins();
        self.populate_detections();
        self.populate_tiering();
        self.populate_versions();
    }

    fn keep<T: super::Entity>(collection: &mut Collection<T>, item: T) {
        if let Err(err) = collection.add(item) {
            debug!(error = %err, "Skipping fixture");
        }
    }

    fn populate_sources(&mut self) {
        for index in 0..self.config.source_count {
            let source = factories::source(&mut self.rng, index);
            Self::keep(&mut self.sources, source);
        }
    }

    fn populate_plugins(&mut self) {
        for index in 0..self.config.plugin_count {
            let plugin = factories::plugin(&mut self.rng, index);
            if plugin.plugin_type != PluginType::Reporter {
                for _ in 0..plugin.validators_count {
                    let validator = factories::custom_validator(&mut self.rng, &plugin.id);
                    Self::keep(&mut self.validators, validator);
                }
            }
            if plugin.plugin_type != PluginType::Validator {
                for _ in 0..plugin.reporters_count {
                    let reporter = factories::custom_reporter(&mut self.rng, &plugin.id);
                    Self::keep(&mut self.reporters, reporter);
                }
            }
            if plugin.is_installed {
                for _ in 0..self.rng.random_range(0..=2) {
                    let hook = factories::hook(&mut self.rng, &plugin.id);
                    Self::keep(&mut self.hooks, hook);
                }
            }
            Self::keep(&mut self.plugins, plugin);
        }
        for _ in 0..SIGNER_COUNT {
            let signer = factories::signer(&mut self.rng);
            Self::keep(&mut self.signers, signer);
        }
    }

    fn populate_detections(&mut self) {
        let sources: Vec<Source> = self.sources.all().to_vec();
        for source in &sources {
            let runs = self.rng.random_range(1..=3);
            for _ in 0..runs {
                let algorithm = factories::pick(&mut self.rng, &AnomalyAlgorithm::ALL);
                let columns = source.numeric_columns();
                let detection =
                    factories::detection(&mut self.rng, source, algorithm, &columns, json!({}));
                let completed_at = factories::recent(&mut self.rng, 30);
                Self::keep(&mut self.detections, factories::finished_at(detection, completed_at));
            }
        }

        if sources.len() >= 2 {
            let ids: Vec<String> = sources.iter().take(3).map(|s| s.id.clone()).collect();
            let job = batch::new_job(
                &mut self.rng,
                "Nightly sweep".to_string(),
                ids,
                AnomalyAlgorithm::IsolationForest,
                json!({ "contamination": 0.05 }),
            );
            let job_id = job.id.clone();
            Self::keep(&mut self.batch_jobs, job);
            if let Err(err) = batch::run_to_completion(self, &job_id) {
                debug!(error = %err, "Seed batch job did not finish");
            }
        }
    }

    fn populate_tiering(&mut self) {
        let tiers = factories::default_tiers(&mut self.rng);
        let ids: Vec<String> = tiers.iter().map(|t| t.id.clone()).collect();
        for tier in tiers {
            Self::keep(&mut self.tiers, tier);
        }

        let plan = [
            ("Demote stale hot data", PolicyType::AgeBased, 0, 1),
            ("Cold after low access", PolicyType::AccessBased, 1, 2),
            ("Archive large cold files", PolicyType::SizeBased, 2, 3),
            ("Weekly warm sweep", PolicyType::Composite, 1, 2),
            ("Sunday cleanup", PolicyType::Scheduled, 1, 2),
            ("Custom retention rule", PolicyType::Custom, 1, 2),
        ];
        let mut composite_id = None;
        for (name, policy_type, from, to) in plan {
            let mut policy = factories::policy(&mut self.rng, name, policy_type, &ids[from], &ids[to]);
            match policy_type {
                PolicyType::Composite => composite_id = Some(policy.id.clone()),
                PolicyType::Scheduled | PolicyType::Custom => policy.parent_id = composite_id.clone(),
                _ => {}
            }
            Self::keep(&mut self.policies, policy);
        }

        let leaves: Vec<TierPolicy> = self
            .policies
            .iter()
            .filter(|p| !p.is_composite())
            .cloned()
            .collect();
        for i in 0..SEEDED_MIGRATIONS {
            let policy = &leaves[i % leaves.len()];
            let status = match self.rng.random_range(0..10) {
                0 => MigrationStatus::Failed,
                1 => MigrationStatus::InProgress,
                _ => MigrationStatus::Completed,
            };
            let migration = factories::migration(&mut self.rng, policy, status);
            Self::keep(&mut self.migrations, migration);
        }

        for (i, name) in ["Default tiering", "Cost saver"].into_iter().enumerate() {
            let mut config = factories::tiering_config(&mut self.rng, name, Some(&ids[0]));
            config.is_active = i == 0;
            Self::keep(&mut self.tiering_configs, config);
        }
    }

    fn populate_versions(&mut self) {
        let source_ids: Vec<String> = self.sources.iter().map(|s| s.id.clone()).collect();
        for source_id in source_ids {
            let mut parent: Option<String> = None;
            let mut versions = Vec::with_capacity(self.config.versions_per_source);
            for number in 1..=self.config.versions_per_source as u32 {
                let version = factories::version(
                    &mut self.rng,
                    &source_id,
                    number,
                    parent.as_deref(),
                    VersioningStrategy::Incremental,
                );
                parent = Some(version.id.clone());
                versions.push(version);
            }
            // Timestamps are drawn independently; order them along the chain.
            let mut stamps: Vec<_> = versions.iter().map(|v| v.created_at).collect();
            stamps.sort();
            for (version, created_at) in versions.iter_mut().zip(stamps) {
                version.created_at = created_at;
                Self::keep(&mut self.versions, version.clone());
            }
        }
    }
}
