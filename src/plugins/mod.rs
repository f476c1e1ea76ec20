//! Plugin marketplace operations.
//!
//! Install-style actions report failure in the response body rather than as
//! an HTTP error, so callers always get `{success, message}` back.

pub mod extensions;
pub mod lifecycle;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::factories;
use crate::models::{
    HotReloadConfig, LifecycleState, Plugin, PluginLifecycle, PluginStatus, SecurityLevel,
};
use crate::storage::FixtureStore;

/// Result of an install request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallResponse {
    /// Whether the plugin was installed.
    pub success: bool,
    /// Target plugin.
    pub plugin_id: String,
    /// Version now installed.
    pub installed_version: Option<String>,
    /// Outcome message.
    pub message: String,
    /// Non-fatal concerns.
    pub warnings: Vec<String>,
}

/// Result of an uninstall request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UninstallResponse {
    /// Whether the plugin was removed.
    pub success: bool,
    /// Target plugin.
    pub plugin_id: String,
    /// Outcome message.
    pub message: String,
}

/// Result of an update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// Whether the plugin moved to a new version.
    pub success: bool,
    /// Target plugin.
    pub plugin_id: String,
    /// Version before the update.
    pub previous_version: Option<String>,
    /// Version after the update.
    pub installed_version: Option<String>,
    /// Outcome message.
    pub message: String,
}

/// Result of a hot reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotReloadResponse {
    /// Whether the reload ran.
    pub success: bool,
    /// Target plugin.
    pub plugin_id: String,
    /// Version before the reload.
    pub old_version: String,
    /// Version after the reload.
    pub new_version: String,
    /// Simulated reload time.
    pub reload_duration_ms: u64,
    /// Whether runtime state survived.
    pub state_preserved: bool,
    /// Outcome message.
    pub message: String,
}

fn install_warnings(plugin: &Plugin) -> Vec<String> {
    match plugin.security_level {
        SecurityLevel::Unverified => {
            vec!["Plugin is not signed by a trusted publisher".to_string()]
        }
        SecurityLevel::Sandboxed => {
            vec!["Plugin will run in a sandbox with restricted permissions".to_string()]
        }
        SecurityLevel::Trusted | SecurityLevel::Verified => Vec::new(),
    }
}

/// Install a listed plugin.
pub fn install(store: &mut FixtureStore, plugin_id: &str, version: Option<String>) -> InstallResponse {
    let Some(plugin) = store.plugins.get_mut(plugin_id) else {
        warn!(plugin_id, "Install requested for unknown plugin");
        return InstallResponse {
            success: false,
            plugin_id: plugin_id.to_string(),
            installed_version: None,
            message: format!("Plugin not found: {}", plugin_id),
            warnings: Vec::new(),
        };
    };

    if plugin.is_installed {
        return InstallResponse {
            success: false,
            plugin_id: plugin_id.to_string(),
            installed_version: Some(plugin.version.clone()),
            message: format!("Plugin '{}' is already installed", plugin.name),
            warnings: Vec::new(),
        };
    }

    let version = version
        .or_else(|| plugin.latest_version.clone())
        .unwrap_or_else(|| plugin.version.clone());
    let now = Utc::now();
    plugin.version = version.clone();
    plugin.is_installed = true;
    plugin.status = PluginStatus::Enabled;
    plugin.installed_at = Some(now);
    plugin.install_count += 1;
    plugin.updated_at = now;
    info!(plugin_id, version = %version, "Plugin installed");

    InstallResponse {
        success: true,
        plugin_id: plugin_id.to_string(),
        installed_version: Some(version.clone()),
        message: format!("Installed '{}' {}", plugin.name, version),
        warnings: install_warnings(plugin),
    }
}

/// Uninstall a plugin.
pub fn uninstall(store: &mut FixtureStore, plugin_id: &str) -> UninstallResponse {
    let respond = |success: bool, message: String| UninstallResponse {
        success,
        plugin_id: plugin_id.to_string(),
        message,
    };

    let Some(plugin) = store.plugins.get_mut(plugin_id) else {
        warn!(plugin_id, "Uninstall requested for unknown plugin");
        return respond(false, format!("Plugin not found: {}", plugin_id));
    };
    if !plugin.is_installed {
        return respond(false, format!("Plugin '{}' is not installed", plugin.name));
    }

    plugin.is_installed = false;
    plugin.status = PluginStatus::Available;
    plugin.installed_at = None;
    plugin.updated_at = Utc::now();
    info!(plugin_id, "Plugin uninstalled");
    respond(true, format!("Uninstalled '{}'", plugin.name))
}

/// Switch an installed plugin on or off.
pub fn set_enabled(store: &mut FixtureStore, plugin_id: &str, enabled: bool) -> ApiResult<Plugin> {
    let plugin = store.plugins.require_mut(plugin_id)?;
    if !plugin.is_installed {
        let action = if enabled { "enabled" } else { "disabled" };
        return Err(ApiError::bad_request(format!(
            "Plugin '{}' must be installed before it can be {}",
            plugin.name, action
        )));
    }
    plugin.status = if enabled {
        PluginStatus::Enabled
    } else {
        PluginStatus::Disabled
    };
    plugin.updated_at = Utc::now();
    info!(plugin_id, enabled, "Plugin status changed");
    Ok(plugin.clone())
}

/// Move an installed plugin to its latest published version.
pub fn update(store: &mut FixtureStore, plugin_id: &str) -> UpdateResponse {
    let Some(plugin) = store.plugins.get_mut(plugin_id) else {
        return UpdateResponse {
            success: false,
            plugin_id: plugin_id.to_string(),
            previous_version: None,
            installed_version: None,
            message: format!("Plugin not found: {}", plugin_id),
        };
    };

    let previous = plugin.version.clone();
    let target = plugin.latest_version.clone().unwrap_or_else(|| previous.clone());
    let (success, message) = if !plugin.is_installed {
        (false, format!("Plugin '{}' is not installed", plugin.name))
    } else if target == previous {
        (false, format!("Plugin '{}' is already up to date", plugin.name))
    } else {
        plugin.version = target.clone();
        plugin.updated_at = Utc::now();
        info!(plugin_id, from = %previous, to = %target, "Plugin updated");
        (true, format!("Updated '{}' from {} to {}", plugin.name, previous, target))
    };

    UpdateResponse {
        success,
        plugin_id: plugin_id.to_string(),
        installed_version: Some(plugin.version.clone()),
        previous_version: Some(previous),
        message,
    }
}

/// Lifecycle record of a plugin, created in `unloaded` on first access.
pub fn lifecycle_mut<'a>(
    store: &'a mut FixtureStore,
    plugin_id: &str,
) -> ApiResult<&'a mut PluginLifecycle> {
    store.plugins.require(plugin_id)?;
    if !store.lifecycles.contains(plugin_id) {
        store.lifecycles.add(lifecycle::new_lifecycle(plugin_id))?;
    }
    Ok(store.lifecycles.require_mut(plugin_id)?)
}

/// Body of a lifecycle transition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// State to move to.
    pub target_state: LifecycleState,
    /// What caused the transition; `manual` when absent.
    #[serde(default)]
    pub trigger: Option<String>,
    /// Bypass the adjacency table.
    #[serde(default)]
    pub force: bool,
}

/// Result of an accepted lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionResponse {
    /// Always `true`; rejected transitions are errors.
    pub success: bool,
    /// Target plugin.
    pub plugin_id: String,
    /// State before.
    pub from_state: LifecycleState,
    /// State after.
    pub to_state: LifecycleState,
    /// Whether adjacency was bypassed.
    pub forced: bool,
    /// States reachable from the new state.
    pub allowed_transitions: Vec<LifecycleState>,
}

/// Apply a transition to a plugin's lifecycle record.
pub fn transition_plugin(
    store: &mut FixtureStore,
    plugin_id: &str,
    request: &TransitionRequest,
) -> ApiResult<TransitionResponse> {
    let record = lifecycle_mut(store, plugin_id)?;
    let trigger = request.trigger.as_deref().unwrap_or("manual");
    let step = lifecycle::transition(record, request.target_state, trigger, request.force)
        .map_err(|err| {
            warn!(plugin_id, error = %err, "Lifecycle transition rejected");
            err
        })?;
    info!(
        plugin_id,
        from = %step.from_state,
        to = %step.to_state,
        forced = step.forced,
        "Lifecycle transition"
    );
    Ok(TransitionResponse {
        success: true,
        plugin_id: plugin_id.to_string(),
        from_state: step.from_state,
        to_state: step.to_state,
        forced: step.forced,
        allowed_transitions: record.allowed_transitions.clone(),
    })
}

/// Hot-reload settings of a plugin, created with defaults on first access.
pub fn hot_reload_mut<'a>(
    store: &'a mut FixtureStore,
    plugin_id: &str,
) -> ApiResult<&'a mut HotReloadConfig> {
    store.plugins.require(plugin_id)?;
    if !store.hot_reload.contains(plugin_id) {
        store.hot_reload.add(factories::hot_reload_config(plugin_id))?;
    }
    Ok(store.hot_reload.require_mut(plugin_id)?)
}

/// Reload a plugin's code in place.
pub fn hot_reload(store: &mut FixtureStore, plugin_id: &str) -> ApiResult<HotReloadResponse> {
    let version = store.plugins.require(plugin_id)?.version.clone();
    let duration = store.rng.random_range(20..400);
    let config = hot_reload_mut(store, plugin_id)?;

    if !config.enabled {
        warn!(plugin_id, "Hot reload requested while disabled");
        return Ok(HotReloadResponse {
            success: false,
            plugin_id: plugin_id.to_string(),
            old_version: version.clone(),
            new_version: version,
            reload_duration_ms: 0,
            state_preserved: false,
            message: "Hot reload is disabled for this plugin".to_string(),
        });
    }

    config.last_reload_at = Some(Utc::now());
    config.reload_count += 1;
    info!(plugin_id, reload_count = config.reload_count, "Plugin hot reloaded");

    Ok(HotReloadResponse {
        success: true,
        plugin_id: plugin_id.to_string(),
        old_version: version.clone(),
        new_version: version,
        reload_duration_ms: duration,
        state_preserved: true,
        message: "Plugin reloaded".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureConfig;

    fn store() -> FixtureStore {
        FixtureStore::seeded(&FixtureConfig::default())
    }

    fn available_plugin(store: &FixtureStore) -> String {
        store
            .plugins
            .iter()
            .find(|p| !p.is_installed)
            .map(|p| p.id.clone())
            .unwrap()
    }

    #[test]
    fn test_install_then_reinstall() {
        let mut store = store();
        let id = available_plugin(&store);
        let first = install(&mut store, &id, Some("9.9.9".to_string()));
        assert!(first.success);
        assert_eq!(first.installed_version.as_deref(), Some("9.9.9"));
        let p = store.plugins.get(&id).unwrap();
        assert!(p.is_installed);
        assert_eq!(p.status, PluginStatus::Enabled);

        let second = install(&mut store, &id, None);
        assert!(!second.success);
    }

    #[test]
    fn test_install_unknown_plugin_is_soft_failure() {
        let mut store = store();
        let resp = install(&mut store, "missing", None);
        assert!(!resp.success);
        assert_eq!(resp.message, "Plugin not found: missing");
    }

    #[test]
    fn test_enable_requires_install() {
        let mut store = store();
        let id = available_plugin(&store);
        let err = set_enabled(&mut store, &id, true).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));

        install(&mut store, &id, None);
        let p = set_enabled(&mut store, &id, false).unwrap();
        assert_eq!(p.status, PluginStatus::Disabled);
    }

    #[test]
    fn test_uninstall_resets_install_fields() {
        let mut store = store();
        let id = available_plugin(&store);
        install(&mut store, &id, None);
        assert!(uninstall(&mut store, &id).success);
        let p = store.plugins.get(&id).unwrap();
        assert!(!p.is_installed);
        assert!(p.installed_at.is_none());
        assert!(!uninstall(&mut store, &id).success);
    }

    #[test]
    fn test_update_moves_to_latest() {
        let mut store = store();
        let id = available_plugin(&store);
        install(&mut store, &id, Some("0.0.1".to_string()));
        store.plugins.get_mut(&id).unwrap().latest_version = Some("0.0.2".to_string());
        let resp = update(&mut store, &id);
        assert!(resp.success);
        assert_eq!(resp.previous_version.as_deref(), Some("0.0.1"));
        assert_eq!(resp.installed_version.as_deref(), Some("0.0.2"));
        assert!(!update(&mut store, &id).success);
    }

    #[test]
    fn test_hot_reload_respects_enabled_flag() {
        let mut store = store();
        let id = available_plugin(&store);
        assert!(hot_reload(&mut store, &id).unwrap().success);
        assert_eq!(store.hot_reload.get(&id).unwrap().reload_count, 1);

        hot_reload_mut(&mut store, &id).unwrap().enabled = false;
        assert!(!hot_reload(&mut store, &id).unwrap().success);
        assert_eq!(store.hot_reload.get(&id).unwrap().reload_count, 1);
    }

    #[test]
    fn test_transition_plugin_reports_new_state() {
        let mut store = store();
        let id = store.plugins.all()[0].id.clone();
        let request = TransitionRequest {
            target_state: LifecycleState::Loading,
            trigger: None,
            force: false,
        };
        let resp = transition_plugin(&mut store, &id, &request).unwrap();
        assert!(resp.success);
        assert_eq!(resp.from_state, LifecycleState::Unloaded);
        assert_eq!(
            resp.allowed_transitions,
            lifecycle::allowed_transitions(LifecycleState::Loading).to_vec()
        );

        let illegal = TransitionRequest {
            target_state: LifecycleState::Running,
            trigger: Some("test".to_string()),
            force: false,
        };
        assert!(matches!(
            transition_plugin(&mut store, &id, &illegal),
            Err(ApiError::InvalidTransition { .. })
        ));
        assert_eq!(store.lifecycles.require(&id).unwrap().state_history.len(), 1);
    }

    #[test]
    fn test_lifecycle_is_created_lazily() {
        let mut store = store();
        let id = available_plugin(&store);
        assert!(!store.lifecycles.contains(&id));
        let lc = lifecycle_mut(&mut store, &id).unwrap();
        assert_eq!(lc.current_state, crate::models::LifecycleState::Unloaded);
        assert!(lifecycle_mut(&mut store, "missing").is_err());
    }
}
