//! # Phase Cache Management
//!
//! Every index caches the definition of the phase it is executing inside its
//! execution state (`phase_definition`). Edits to the policy do not disturb an
//! index mid-phase; the cache is only reconsidered when the index rests at a
//! safe point:
//!
//! - the `ERROR` step, waiting for a retry
//! - its phase's `complete` step, waiting for the next phase's minimum age
//!
//! At such a point a stale cache is either refreshed in place (the step the
//! index rests on still exists) or the index is skipped forward to the next
//! action of the updated phase.

use crate::cluster_state::{ClusterState, IndexMetadata};
use crate::config::PolicyUpdateConfig;
use crate::constants::steps::NEW_PHASE;
use crate::error::{invalid_state, LifecycleError, Result};
use crate::execution_state::LifecycleExecutionState;
use crate::policy::{LifecyclePolicy, LifecyclePolicyMetadata, Phase, StepKey};
use crate::transition::move_state_to_next_action_and_update_cached_phase;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cached phase document stored in `phase_definition`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecutionInfo {
    policy: String,
    phase_definition: Option<Phase>,
    version: i64,
    modified_date_in_millis: i64,
}

impl PhaseExecutionInfo {
    pub fn new(
        policy: impl Into<String>,
        phase_definition: Option<Phase>,
        version: i64,
        modified_date_in_millis: i64,
    ) -> Self {
        Self {
            policy: policy.into(),
            phase_definition,
            version,
            modified_date_in_millis,
        }
    }

    /// Snapshot `phase` as currently defined by `policy_meta`. A phase the
    /// policy no longer has is recorded as `null`.
    pub fn from_policy(policy_meta: &LifecyclePolicyMetadata, phase: &str) -> Self {
        Self::new(
            policy_meta.name(),
            policy_meta.policy().phase(phase).cloned(),
            policy_meta.version(),
            policy_meta.modified_date(),
        )
    }

    /// Parse a cached document. The phase name is not part of the document
    /// and is supplied by the execution state holding it.
    pub fn parse(json: &str, phase_name: &str) -> Result<Self> {
        let mut info: Self = serde_json::from_str(json)?;
        info.phase_definition = info
            .phase_definition
            .map(|phase| phase.with_name(phase_name));
        Ok(info)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn phase_definition(&self) -> Option<&Phase> {
        self.phase_definition.as_ref()
    }

    pub fn into_phase(self) -> Option<Phase> {
        self.phase_definition
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn modified_date_in_millis(&self) -> i64 {
        self.modified_date_in_millis
    }
}

/// Whether the index rests at a point where its cached phase may be
/// reconsidered. The `new` phase has no definition to refresh.
pub fn eligible_to_check_for_refresh(index_meta: &IndexMetadata) -> bool {
    let Ok(state) = index_meta.lifecycle_execution_state() else {
        return false;
    };
    if state.phase_definition().is_none() || state.phase() == Some(NEW_PHASE) {
        return false;
    }
    state
        .current_step_key()
        .is_some_and(|key| key.is_error_step() || key.is_phase_complete())
}

/// Whether the index is eligible and its cache predates `policy_meta`.
/// A cache that cannot be read counts as stale.
pub fn needs_refresh(index_meta: &IndexMetadata, policy_meta: &LifecyclePolicyMetadata) -> bool {
    if index_meta.policy_name() != Some(policy_meta.name())
        || !eligible_to_check_for_refresh(index_meta)
    {
        return false;
    }
    let Ok(state) = index_meta.lifecycle_execution_state() else {
        return false;
    };
    match (state.phase(), state.phase_definition()) {
        (Some(phase), Some(definition)) => PhaseExecutionInfo::parse(definition, phase)
            .map_or(true, |info| info.version() < policy_meta.version()),
        _ => false,
    }
}

/// Rewrite only the `phase_definition` of `index` from the updated policy
pub fn refresh_phase_definition(
    state: &Arc<ClusterState>,
    index: &str,
    updated_policy_meta: &LifecyclePolicyMetadata,
) -> Result<Arc<ClusterState>> {
    let index_meta =
        state
            .metadata()
            .index(index)
            .ok_or_else(|| LifecycleError::IndexNotFound {
                index: index.to_string(),
            })?;
    let refreshed = refreshed_execution_state(index_meta, updated_policy_meta)?;
    if refreshed == index_meta.lifecycle_execution_state()? {
        return Ok(Arc::clone(state));
    }

    info!(
        index = %index,
        policy = %updated_policy_meta.name(),
        version = updated_policy_meta.version(),
        "Refreshed cached phase definition"
    );
    Ok(state.with_index(
        index_meta
            .to_builder()
            .lifecycle_state(&refreshed)
            .build(),
    ))
}

fn refreshed_execution_state(
    index_meta: &IndexMetadata,
    updated_policy_meta: &LifecyclePolicyMetadata,
) -> Result<LifecycleExecutionState> {
    let current = index_meta.lifecycle_execution_state()?;
    let phase = current
        .phase()
        .ok_or_else(|| invalid_state("phase", "index has no current phase"))?;
    let info = PhaseExecutionInfo::from_policy(updated_policy_meta, phase);
    Ok(current
        .to_builder()
        .phase_definition(info.to_json()?)
        .build())
}

/// Step the index is resting on: the failed step while in `ERROR`
fn resting_step_key(state: &LifecycleExecutionState) -> Option<StepKey> {
    let key = state.current_step_key()?;
    if key.is_error_step() {
        return state
            .failed_step()
            .map(|failed| StepKey::new(key.phase.as_str(), key.action.as_str(), failed));
    }
    Some(key)
}

fn resolves_in_updated_phase(policy: &LifecyclePolicy, key: &StepKey) -> bool {
    policy.phase(&key.phase).is_some_and(|phase| {
        phase
            .to_steps(&StepKey::terminal())
            .iter()
            .any(|step| step.key() == key)
    })
}

/// Bring every index managed by the updated policy up to date.
///
/// Indices that cannot be brought up to date are logged and left untouched.
/// Returns `state` itself when no index changed.
pub fn update_indices_for_policy(
    state: &Arc<ClusterState>,
    previous_policy: &LifecyclePolicy,
    updated_policy_meta: &LifecyclePolicyMetadata,
    now: i64,
    config: &PolicyUpdateConfig,
) -> Arc<ClusterState> {
    let metadata = state.metadata();
    let mut builder = metadata.to_builder();
    let mut changed = 0usize;

    for index_meta in metadata.indices_with_policy(updated_policy_meta.name()) {
        if !needs_refresh(index_meta, updated_policy_meta) {
            continue;
        }
        match updated_execution_state(index_meta, previous_policy, updated_policy_meta, now, config) {
            Ok(Some(updated)) => {
                builder = builder.put(index_meta.to_builder().lifecycle_state(&updated).build());
                changed += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(
                index = %index_meta.name(),
                policy = %updated_policy_meta.name(),
                error = %e,
                "Unable to update cached phase for index, skipping"
            ),
        }
    }

    if changed == 0 {
        debug!(
            policy = %updated_policy_meta.name(),
            "No indices required a phase cache update"
        );
        return Arc::clone(state);
    }
    info!(
        policy = %updated_policy_meta.name(),
        version = updated_policy_meta.version(),
        updated_indices = changed,
        "Updated cached phases for policy"
    );
    state.with_metadata(builder.build())
}

fn updated_execution_state(
    index_meta: &IndexMetadata,
    previous_policy: &LifecyclePolicy,
    updated_policy_meta: &LifecyclePolicyMetadata,
    now: i64,
    config: &PolicyUpdateConfig,
) -> Result<Option<LifecycleExecutionState>> {
    let current = index_meta.lifecycle_execution_state()?;
    let Some(resting) = resting_step_key(&current) else {
        return Ok(None);
    };

    let updated = if resolves_in_updated_phase(updated_policy_meta.policy(), &resting) {
        refreshed_execution_state(index_meta, updated_policy_meta)?
    } else {
        move_state_to_next_action_and_update_cached_phase(
            index_meta,
            &current,
            now,
            previous_policy,
            updated_policy_meta,
            config,
        )?
    };
    Ok((updated != current).then_some(updated))
}
