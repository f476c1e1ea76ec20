//! Plugin lifecycle state machine.

use chrono::Utc;

use crate::error::{ApiError, ApiResult};
use crate::models::{LifecycleState, PluginLifecycle, StateTransition};

use LifecycleState::*;

/// States reachable from `state` without forcing.
pub fn allowed_transitions(state: LifecycleState) -> &'static [LifecycleState] {
    match state {
        Unloaded => &[Loading, Disabled],
        Loading => &[Loaded, Error],
        Loaded => &[Initializing, Unloaded, Error],
        Initializing => &[Initialized, Error],
        Initialized => &[Starting, Unloaded, Error],
        Starting => &[Running, Error],
        Running => &[Stopping, Error],
        Stopping => &[Stopped, Error],
        Stopped => &[Starting, Unloaded, Disabled],
        Error => &[Unloaded],
        Disabled => &[Unloaded],
    }
}

/// Whether `from -> to` is a legal unforced transition.
pub fn can_transition(from: LifecycleState, to: LifecycleState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// A fresh record in `unloaded`.
pub fn new_lifecycle(plugin_id: &str) -> PluginLifecycle {
    PluginLifecycle {
        plugin_id: plugin_id.to_string(),
        current_state: Unloaded,
        allowed_transitions: allowed_transitions(Unloaded).to_vec(),
        state_history: Vec::new(),
        updated_at: Utc::now(),
    }
}

/// Move `lifecycle` to `target`.
///
/// Unforced transitions must follow the adjacency table; a rejected
/// transition leaves the record untouched. Every accepted transition is
/// appended to `state_history`.
pub fn transition(
    lifecycle: &mut PluginLifecycle,
    target: LifecycleState,
    trigger: &str,
    force: bool,
) -> ApiResult<StateTransition> {
    let from = lifecycle.current_state;
    if !force && !can_transition(from, target) {
        return Err(ApiError::InvalidTransition {
            message: format!("Invalid transition from '{}' to '{}'", from, target),
            current_state: from.to_string(),
            allowed_transitions: allowed_transitions(from)
                .iter()
                .map(|s| s.to_string())
                .collect(),
        });
    }

    let record = StateTransition {
        from_state: from,
        to_state: target,
        trigger: trigger.to_string(),
        forced: force,
        timestamp: Utc::now(),
    };
    lifecycle.current_state = target;
    lifecycle.allowed_transitions = allowed_transitions(target).to_vec();
    lifecycle.state_history.push(record.clone());
    lifecycle.updated_at = record.timestamp;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LifecycleState; 11] = [
        Unloaded,
        Loading,
        Loaded,
        Initializing,
        Initialized,
        Starting,
        Running,
        Stopping,
        Stopped,
        Error,
        Disabled,
    ];

    #[test]
    fn test_happy_path_to_running() {
        let mut lc = new_lifecycle("p");
        for target in [Loading, Loaded, Initializing, Initialized, Starting, Running] {
            transition(&mut lc, target, "manual", false).unwrap();
        }
        assert_eq!(lc.current_state, Running);
        assert_eq!(lc.state_history.len(), 6);
        assert_eq!(lc.allowed_transitions, vec![Stopping, Error]);
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let mut lc = new_lifecycle("p");
        let err = transition(&mut lc, Running, "manual", false).unwrap_err();
        match err {
            ApiError::InvalidTransition {
                current_state,
                allowed_transitions,
                ..
            } => {
                assert_eq!(current_state, "unloaded");
                assert_eq!(allowed_transitions, vec!["loading", "disabled"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(lc.current_state, Unloaded);
        assert!(lc.state_history.is_empty());
    }

    #[test]
    fn test_forced_transition_is_recorded() {
        let mut lc = new_lifecycle("p");
        let t = transition(&mut lc, Running, "recovery", true).unwrap();
        assert!(t.forced);
        assert_eq!(lc.current_state, Running);
        assert_eq!(lc.state_history.len(), 1);
        assert_eq!(lc.state_history[0].trigger, "recovery");
    }

    #[test]
    fn test_every_state_can_leave() {
        for state in ALL {
            assert!(!allowed_transitions(state).is_empty(), "{} is a sink", state);
            assert!(!can_transition(state, state), "{} loops", state);
        }
    }

    #[test]
    fn test_error_only_recovers_by_unloading() {
        assert_eq!(allowed_transitions(Error), &[Unloaded]);
    }
}
