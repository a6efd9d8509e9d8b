//! # Index Lifecycle Transitions
//!
//! Pure functions from `(cluster snapshot, inputs)` to a new snapshot. None of
//! them perform I/O or keep state between calls, so an external single-writer
//! pipeline may re-apply any of them against a refreshed snapshot.
//!
//! ## Transition Map
//!
//! ```text
//!   step N ──move_cluster_state_to_step──▶ step N+1
//!     │  ▲
//!     │  └── move_cluster_state_to_previously_failed_step (manual or automatic retry)
//!     ▼  │
//!   <phase>/<action>/ERROR   ◀── move_cluster_state_to_error_step
//! ```
//!
//! Whenever the computed execution state equals the persisted one, the input
//! `Arc` is returned so callers can skip publishing with [`Arc::ptr_eq`].

use crate::cluster_state::{ClusterState, IndexMetadata};
use crate::config::{PolicyUpdateConfig, RemovalConfig};
use crate::constants::settings::LIFECYCLE_OWNED;
use crate::constants::steps::NEW_PHASE;
use crate::error::{invalid_state, LifecycleError, Result};
use crate::execution_state::LifecycleExecutionState;
use crate::logging::log_transition_operation;
use crate::phase_cache::PhaseExecutionInfo;
use crate::policy::{LifecyclePolicy, LifecyclePolicyMetadata, Step, StepKey};
use crate::registry::PolicyStepsRegistry;
use crate::step_info::FailureCause;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn index_metadata<'a>(state: &'a ClusterState, index: &str) -> Result<&'a Arc<IndexMetadata>> {
    state
        .metadata()
        .index(index)
        .ok_or_else(|| LifecycleError::IndexNotFound {
            index: index.to_string(),
        })
}

fn policy_name(index_meta: &IndexMetadata) -> Result<&str> {
    index_meta
        .policy_name()
        .ok_or_else(|| LifecycleError::NotManaged {
            index: index_meta.name().to_string(),
        })
}

fn display_key(key: Option<&StepKey>) -> String {
    key.map_or_else(|| "null".to_string(), StepKey::to_string)
}

/// Publish `updated` as the execution state of `index_meta`, or hand back
/// `state` itself when nothing changed
fn write_execution_state(
    state: &Arc<ClusterState>,
    index_meta: &IndexMetadata,
    current: &LifecycleExecutionState,
    updated: LifecycleExecutionState,
) -> Arc<ClusterState> {
    if *current == updated {
        return Arc::clone(state);
    }
    state.with_index(index_meta.to_builder().lifecycle_state(&updated).build())
}

/// Policy metadata used to snapshot a phase: the snapshot's own copy first,
/// then the registry's
fn policy_metadata_for<'a>(
    state: &'a ClusterState,
    registry: &'a PolicyStepsRegistry,
    policy: &str,
) -> Option<&'a LifecyclePolicyMetadata> {
    state
        .metadata()
        .lifecycle()
        .policy(policy)
        .or_else(|| registry.policy_metadata(policy))
}

/// Execution state after entering `target` at `now`.
///
/// Entry timestamps only move when their component changes, except inside the
/// `new` phase where `phase_time` follows every move. The phase cache is
/// recaptured on phase entry; outside a real phase it records a `null`
/// definition. Failure bookkeeping, retry count included, is cleared.
fn execution_state_for_step(
    current: &LifecycleExecutionState,
    target: &StepKey,
    now: i64,
    policy_meta: Option<&LifecyclePolicyMetadata>,
) -> Result<LifecycleExecutionState> {
    let phase_changed = current.phase() != Some(target.phase.as_str());
    let action_changed = current.action() != Some(target.action.as_str());

    let mut builder = current
        .to_builder()
        .step_key(target)
        .step_time(now)
        .clear_failed_step()
        .clear_step_info()
        .clear_failed_step_retry_count();
    if phase_changed || target.phase == NEW_PHASE {
        builder = builder.phase_time(now);
    }
    if action_changed {
        builder = builder.action_time(now);
    }

    if phase_changed {
        builder = match policy_meta {
            Some(meta) => builder
                .phase_definition(PhaseExecutionInfo::from_policy(meta, &target.phase).to_json()?),
            None => builder.clear_phase_definition(),
        };
    }
    Ok(builder.build())
}

/// Check that `index_meta` may move from `current_key` to `target_key`.
///
/// Fails when the index has no policy, when it is not actually on
/// `current_key`, or when `target_key` does not resolve (cached phase first,
/// then the registry).
pub fn validate_transition(
    index_meta: &IndexMetadata,
    current_key: &StepKey,
    target_key: &StepKey,
    registry: &PolicyStepsRegistry,
) -> Result<()> {
    policy_name(index_meta)?;

    let persisted = index_meta.lifecycle_execution_state()?.current_step_key();
    if persisted.as_ref() != Some(current_key) {
        return Err(LifecycleError::StepMismatch {
            index: index_meta.name().to_string(),
            expected: current_key.clone(),
            actual: display_key(persisted.as_ref()),
        });
    }

    registry.get_step_for_index(index_meta, target_key)?;
    Ok(())
}

/// Move `index` to `target`.
///
/// With `require_validation` the target must resolve for the index before
/// anything is computed.
pub fn move_cluster_state_to_step(
    index: &str,
    state: &Arc<ClusterState>,
    target: &StepKey,
    now: i64,
    registry: &PolicyStepsRegistry,
    require_validation: bool,
) -> Result<Arc<ClusterState>> {
    let index_meta = index_metadata(state, index)?;
    let policy = policy_name(index_meta)?;
    let current = index_meta.lifecycle_execution_state()?;
    let current_key = current.current_step_key();

    if require_validation {
        match &current_key {
            Some(key) => validate_transition(index_meta, key, target, registry)?,
            None => {
                registry.get_step_for_index(index_meta, target)?;
            }
        }
    }

    let updated = execution_state_for_step(
        &current,
        target,
        now,
        policy_metadata_for(state, registry, policy),
    )?;

    debug!(
        index = %index,
        policy = %policy,
        from = %display_key(current_key.as_ref()),
        to = %target,
        "Moving index to step"
    );
    Ok(write_execution_state(state, index_meta, &current, updated))
}

/// Resolve the current step of `index` and move to its declared successor.
///
/// The terminal marker has no successor; the state is returned unchanged.
pub fn move_cluster_state_to_next_step(
    index: &str,
    state: &Arc<ClusterState>,
    now: i64,
    registry: &PolicyStepsRegistry,
) -> Result<Arc<ClusterState>> {
    let index_meta = index_metadata(state, index)?;
    policy_name(index_meta)?;
    let current_key = index_meta
        .lifecycle_execution_state()?
        .current_step_key()
        .ok_or_else(|| invalid_state("step", format!("index [{index}] has no current step")))?;

    let step = registry.get_step_for_index(index_meta, &current_key)?;
    match step.next_key() {
        Some(next) if *next != current_key => {
            move_cluster_state_to_step(index, state, next, now, registry, true)
        }
        _ => Ok(Arc::clone(state)),
    }
}

/// Record a failure of the current step and move into its `ERROR` step.
///
/// `step_lookup` resolves the failed step; it only decides whether the
/// failure is logged as retryable.
pub fn move_cluster_state_to_error_step<F>(
    index: &str,
    state: &Arc<ClusterState>,
    cause: &FailureCause,
    now: i64,
    step_lookup: F,
) -> Result<Arc<ClusterState>>
where
    F: Fn(&IndexMetadata, &StepKey) -> Result<Step>,
{
    let index_meta = index_metadata(state, index)?;
    let policy = policy_name(index_meta)?;
    let current = index_meta.lifecycle_execution_state()?;
    let current_key = current
        .current_step_key()
        .ok_or_else(|| invalid_state("step", format!("index [{index}] has no current step")))?;

    let error_key = StepKey::error_step(current_key.phase.as_str(), current_key.action.as_str());
    // A failure while already in ERROR keeps the originally failed step
    let failed_step = if current_key.is_error_step() {
        current
            .failed_step()
            .unwrap_or(current_key.name.as_str())
            .to_string()
    } else {
        current_key.name.clone()
    };

    let retryable = match step_lookup(index_meta, &current_key) {
        Ok(step) => step.is_retryable(),
        Err(e) => {
            debug!(index = %index, error = %e, "Failed step could not be resolved");
            false
        }
    };

    let updated = current
        .to_builder()
        .step_key(&error_key)
        .step_time(now)
        .failed_step(failed_step.as_str())
        .step_info(cause.to_step_info_json()?)
        .build();

    warn!(
        index = %index,
        policy = %policy,
        failed_step = %current_key,
        retryable = retryable,
        error_type = %cause.error_type(),
        reason = %cause.reason(),
        "Index moved to error step"
    );
    log_transition_operation(
        "move_to_error_step",
        index,
        Some(policy),
        Some(&current_key.to_string()),
        Some(&error_key.to_string()),
        "failed",
    );
    Ok(write_execution_state(state, index_meta, &current, updated))
}

/// Move an index sitting in `ERROR` back to the step that failed.
///
/// Automatic retries count themselves in `failed_step_retry_count`; manual
/// retries leave the counter alone.
pub fn move_cluster_state_to_previously_failed_step(
    state: &Arc<ClusterState>,
    index: &str,
    now: i64,
    registry: &PolicyStepsRegistry,
    is_automatic_retry: bool,
) -> Result<Arc<ClusterState>> {
    let index_meta = index_metadata(state, index)?;
    let policy = policy_name(index_meta)?;
    let current = index_meta.lifecycle_execution_state()?;

    let error_key = current
        .current_step_key()
        .filter(StepKey::is_error_step)
        .ok_or_else(|| LifecycleError::NotInErrorStep {
            index: index.to_string(),
        })?;
    let failed_step = current
        .failed_step()
        .ok_or_else(|| invalid_state("failed_step", "missing while in the error step"))?;
    let failed_key = StepKey::new(error_key.phase.as_str(), error_key.action.as_str(), failed_step);

    registry.get_step_for_index(index_meta, &failed_key)?;

    let mut updated = execution_state_for_step(
        &current,
        &failed_key,
        now,
        policy_metadata_for(state, registry, policy),
    )?;
    let retry_count = if is_automatic_retry {
        Some(
            current
                .failed_step_retry_count()
                .map_or(1, |count| count.saturating_add(1)),
        )
    } else {
        current.failed_step_retry_count()
    };
    if let Some(count) = retry_count {
        updated = updated.to_builder().failed_step_retry_count(count).build();
    }

    info!(
        index = %index,
        policy = %policy,
        step = %failed_key,
        automatic = is_automatic_retry,
        retry_count = ?updated.failed_step_retry_count(),
        "Retrying previously failed step"
    );
    log_transition_operation(
        "retry_failed_step",
        index,
        Some(policy),
        Some(&error_key.to_string()),
        Some(&failed_key.to_string()),
        if is_automatic_retry { "automatic" } else { "manual" },
    );
    Ok(write_execution_state(state, index_meta, &current, updated))
}

/// Replace the `step_info` of `index` with the serialized `step_info`.
///
/// An identical document leaves the snapshot untouched.
pub fn add_step_info_to_cluster_state<T: Serialize + ?Sized>(
    index: &str,
    state: &Arc<ClusterState>,
    step_info: &T,
) -> Result<Arc<ClusterState>> {
    let index_meta = index_metadata(state, index)?;
    let current = index_meta.lifecycle_execution_state()?;
    let serialized = serde_json::to_string(step_info)?;
    if current.step_info() == Some(serialized.as_str()) {
        return Ok(Arc::clone(state));
    }

    debug!(index = %index, "Updating step info");
    let updated = current.to_builder().step_info(serialized).build();
    Ok(write_execution_state(state, index_meta, &current, updated))
}

/// Detach the lifecycle policy from every listed index with default settings
pub fn remove_policy_for_indexes<S: AsRef<str>>(
    indices: &[S],
    state: &Arc<ClusterState>,
    failed_names: &mut Vec<String>,
) -> Arc<ClusterState> {
    remove_policy_for_indexes_with(indices, state, failed_names, &RemovalConfig::default())
}

/// Detach the lifecycle policy from every listed index.
///
/// Absent indices are appended to `failed_names`, as are indices inside an
/// unsafe action when `config.refuse_unsafe_actions` is set. All removals land
/// in a single new snapshot.
pub fn remove_policy_for_indexes_with<S: AsRef<str>>(
    indices: &[S],
    state: &Arc<ClusterState>,
    failed_names: &mut Vec<String>,
    config: &RemovalConfig,
) -> Arc<ClusterState> {
    let metadata = state.metadata();
    let mut builder = metadata.to_builder();
    let mut removed = 0usize;

    for name in indices.iter().map(AsRef::as_ref) {
        let Some(index_meta) = metadata.index(name) else {
            failed_names.push(name.to_string());
            continue;
        };

        if config.refuse_unsafe_actions && in_unsafe_action(state, index_meta) {
            warn!(index = %name, "Refusing to remove policy from index inside an unsafe action");
            failed_names.push(name.to_string());
            continue;
        }

        let stripped = LIFECYCLE_OWNED
            .iter()
            .fold(index_meta.to_builder(), |b, key| b.remove_setting(key))
            .clear_lifecycle_state()
            .build();
        if stripped != **index_meta {
            log_transition_operation(
                "remove_policy",
                name,
                index_meta.policy_name(),
                None,
                None,
                "removed",
            );
            builder = builder.put(stripped);
            removed += 1;
        }
    }

    if removed == 0 {
        return Arc::clone(state);
    }
    info!(removed = removed, failed = failed_names.len(), "Removed lifecycle policy from indices");
    state.with_metadata(builder.build())
}

fn in_unsafe_action(state: &ClusterState, index_meta: &IndexMetadata) -> bool {
    let Some(policy) = index_meta
        .policy_name()
        .and_then(|name| state.metadata().lifecycle().policy(name))
    else {
        return false;
    };
    index_meta
        .lifecycle_execution_state()
        .ok()
        .and_then(|exec| exec.current_step_key())
        .is_some_and(|key| !policy.policy().is_action_safe(&key))
}

/// Skip an index forward after its policy changed underneath it.
///
/// The index moves to the first step of the action following its current one
/// in the updated phase, or to the phase's `complete` step, and caches the
/// updated phase. It never resumes in the middle of an action. An index whose
/// step is not part of `previous_policy` is returned unchanged.
pub fn move_state_to_next_action_and_update_cached_phase(
    index_meta: &IndexMetadata,
    current: &LifecycleExecutionState,
    now: i64,
    previous_policy: &LifecyclePolicy,
    updated_policy_meta: &LifecyclePolicyMetadata,
    config: &PolicyUpdateConfig,
) -> Result<LifecycleExecutionState> {
    let Some(current_key) = current.current_step_key() else {
        warn!(
            index = %index_meta.name(),
            policy = %updated_policy_meta.name(),
            "Index has no current step, leaving its cached phase as is"
        );
        return Ok(current.clone());
    };
    let resting_key = match current.failed_step() {
        Some(failed) if current_key.is_error_step() => {
            StepKey::new(current_key.phase.as_str(), current_key.action.as_str(), failed)
        }
        _ => current_key.clone(),
    };

    let known_to_previous = previous_policy
        .to_steps()
        .iter()
        .any(|step| *step.key() == resting_key);
    if !known_to_previous {
        warn!(
            index = %index_meta.name(),
            policy = %previous_policy.name(),
            step = %resting_key,
            "Current step is not part of the previous policy, leaving index unchanged"
        );
        return Ok(current.clone());
    }

    if !config.skip_forward_unsafe_actions && !previous_policy.is_action_safe(&resting_key) {
        return Err(LifecycleError::UnsafeAction {
            index: index_meta.name().to_string(),
            policy: previous_policy.name().to_string(),
            action: resting_key.action.clone(),
        });
    }

    let phase_name = resting_key.phase.as_str();
    let next_key = updated_policy_meta
        .policy()
        .phase(phase_name)
        .and_then(|phase| {
            let next_action = phase.next_action_after(&resting_key.action)?;
            next_action
                .to_steps(phase_name, &StepKey::phase_complete(phase_name))
                .first()
                .map(|step| step.key().clone())
        })
        .unwrap_or_else(|| StepKey::phase_complete(phase_name));

    let phase_definition =
        PhaseExecutionInfo::from_policy(updated_policy_meta, phase_name).to_json()?;
    let updated = current
        .to_builder()
        .step_key(&next_key)
        .action_time(now)
        .step_time(now)
        .clear_failed_step()
        .clear_step_info()
        .clear_failed_step_retry_count()
        .phase_definition(phase_definition)
        .build();

    info!(
        index = %index_meta.name(),
        policy = %updated_policy_meta.name(),
        version = updated_policy_meta.version(),
        from = %current_key,
        to = %next_key,
        "Skipped index to next action of updated policy"
    );
    Ok(updated)
}
