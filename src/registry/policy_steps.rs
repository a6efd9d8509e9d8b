//! # Policy Steps Registry
//!
//! Compiled, immutable view of every stored policy as a navigable step graph.
//!
//! ```text
//! LifecyclePolicyMetadata ──compile──▶ [new/init/init, hot/…, hot/complete/complete, …, completed]
//!                                          │
//!                     get_step / get_first_step_key / first_step_for_phase
//! ```
//!
//! A registry is never mutated after construction. Policy edits produce a new
//! registry which is published through
//! [`PolicyStepsRegistryHandle`](super::PolicyStepsRegistryHandle).

use crate::cluster_state::{IndexLifecycleMetadata, IndexMetadata};
use crate::constants::phase_index;
use crate::constants::steps::NEW_PHASE;
use crate::error::{LifecycleError, Result};
use crate::execution_state::LifecycleExecutionState;
use crate::phase_cache::PhaseExecutionInfo;
use crate::policy::{LifecyclePolicyMetadata, Phase, Step, StepKey};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One policy compiled into steps
#[derive(Debug, Clone)]
struct CompiledPolicy {
    metadata: LifecyclePolicyMetadata,
    order: Vec<StepKey>,
    steps: HashMap<StepKey, Step>,
}

impl CompiledPolicy {
    fn compile(metadata: LifecyclePolicyMetadata) -> Self {
        let compiled = metadata.policy().to_steps();
        let order = compiled.iter().map(|step| step.key().clone()).collect();
        let steps = compiled
            .into_iter()
            .map(|step| (step.key().clone(), step))
            .collect();
        Self {
            metadata,
            order,
            steps,
        }
    }

    fn first_step_for_phase(&self, phase: &str) -> Option<&StepKey> {
        self.order.iter().find(|key| key.phase == phase)
    }

    /// First step executed once `phase` completes
    fn successor_of_phase(&self, phase: &str) -> StepKey {
        let Some(rank) = phase_index(phase) else {
            return StepKey::terminal();
        };
        self.metadata
            .policy()
            .ordered_phases()
            .into_iter()
            .filter(|candidate| phase_index(candidate.name()).is_some_and(|r| r > rank))
            .find_map(|candidate| self.first_step_for_phase(candidate.name()).cloned())
            .unwrap_or_else(StepKey::terminal)
    }
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_policies: usize,
    pub total_steps: usize,
    pub policy_names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyStepsRegistry {
    policies: BTreeMap<String, CompiledPolicy>,
}

impl PolicyStepsRegistry {
    /// Compile every policy. Later entries with the same name win.
    pub fn new(policies: impl IntoIterator<Item = LifecyclePolicyMetadata>) -> Self {
        let policies: BTreeMap<String, CompiledPolicy> = policies
            .into_iter()
            .map(|metadata| (metadata.name().to_string(), CompiledPolicy::compile(metadata)))
            .collect();

        debug!(
            policy_count = policies.len(),
            step_count = policies.values().map(|p| p.order.len()).sum::<usize>(),
            "Compiled lifecycle policy registry"
        );
        Self { policies }
    }

    /// Compile the policies stored in cluster metadata
    pub fn from_lifecycle_metadata(lifecycle: &IndexLifecycleMetadata) -> Self {
        Self::new(lifecycle.policies().values().cloned())
    }

    /// Step at `key` within `policy`. Error keys resolve to a synthesized
    /// error step whose successor is itself.
    pub fn get_step(&self, policy: &str, key: &StepKey) -> Option<Step> {
        if key.is_error_step() {
            return Some(Step::error(key.clone()));
        }
        self.policies.get(policy)?.steps.get(key).cloned()
    }

    pub fn get_first_step_key(&self, policy: &str) -> Option<StepKey> {
        self.policies.get(policy)?.order.first().cloned()
    }

    pub fn first_step_for_phase(&self, policy: &str, phase: &str) -> Option<StepKey> {
        self.policies.get(policy)?.first_step_for_phase(phase).cloned()
    }

    /// The `complete` step of `phase`, if the policy defines the phase
    pub fn phase_complete_step(&self, policy: &str, phase: &str) -> Option<Step> {
        self.get_step(policy, &StepKey::phase_complete(phase))
    }

    pub fn policy_metadata(&self, policy: &str) -> Option<&LifecyclePolicyMetadata> {
        self.policies.get(policy).map(|compiled| &compiled.metadata)
    }

    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn step_count(&self, policy: &str) -> usize {
        self.policies
            .get(policy)
            .map_or(0, |compiled| compiled.order.len())
    }

    /// Steps of `policy` in execution order
    pub fn ordered_steps(&self, policy: &str) -> Vec<&Step> {
        self.policies
            .get(policy)
            .map(|compiled| {
                compiled
                    .order
                    .iter()
                    .filter_map(|key| compiled.steps.get(key))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_policies: self.policies.len(),
            total_steps: self.policies.values().map(|p| p.order.len()).sum(),
            policy_names: self.policies.keys().cloned().collect(),
        }
    }

    /// Resolve `key` for an index.
    ///
    /// An index that cached the definition of the phase it is executing keeps
    /// running that cached definition; anything else resolves against the
    /// current compiled policy.
    pub fn get_step_for_index(&self, index: &IndexMetadata, key: &StepKey) -> Result<Step> {
        let policy = index
            .policy_name()
            .ok_or_else(|| LifecycleError::NotManaged {
                index: index.name().to_string(),
            })?;
        let not_found = || LifecycleError::StepNotFound {
            key: key.clone(),
            index: index.name().to_string(),
            policy: policy.to_string(),
        };

        if key.is_error_step() {
            return Ok(Step::error(key.clone()));
        }

        let state = index.lifecycle_execution_state()?;
        if let Some(phase) = cached_phase(index.name(), &state, key) {
            let next = self
                .policies
                .get(policy)
                .map_or_else(StepKey::terminal, |compiled| {
                    compiled.successor_of_phase(phase.name())
                });
            return phase
                .to_steps(&next)
                .into_iter()
                .find(|step| step.key() == key)
                .ok_or_else(not_found);
        }

        self.get_step(policy, key).ok_or_else(not_found)
    }
}

/// Phase definition cached in the execution state, when it covers `key`
fn cached_phase(index: &str, state: &LifecycleExecutionState, key: &StepKey) -> Option<Phase> {
    if key.phase == NEW_PHASE || key.is_terminal() || state.phase() != Some(key.phase.as_str()) {
        return None;
    }
    let definition = state.phase_definition()?;
    match PhaseExecutionInfo::parse(definition, &key.phase) {
        Ok(info) => info.into_phase(),
        Err(e) => {
            warn!(
                index = %index,
                phase = %key.phase,
                error = %e,
                "Ignoring unreadable cached phase definition"
            );
            None
        }
    }
}
