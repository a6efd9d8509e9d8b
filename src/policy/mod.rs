//! # Lifecycle Policy Model
//!
//! Declarative description of a lifecycle policy: named phases, each gated by
//! a minimum age and holding a set of actions. Actions are stored by name but
//! always compile in the canonical per-phase order from
//! [`crate::constants::ordered_actions_for_phase`], so document order never
//! influences execution.
//!
//! ```text
//! new/init/init → hot: [set_priority → rollover → …] → hot/complete/complete
//!               → warm: […] → … → delete/complete/complete → completed
//! ```

pub mod actions;
pub mod step;
pub mod time_value;

pub use actions::{
    AllocateAction, DeleteAction, ForceMergeAction, FreezeAction, LifecycleAction,
    ReadOnlyAction, RolloverAction, SetPriorityAction, ShrinkAction, WaitForSnapshotAction,
};
pub use step::{Step, StepKey, StepKind};
pub use time_value::TimeValue;

use crate::constants::{ordered_actions_for_phase, phase_index, VALID_PHASES};
use crate::error::{invalid_policy, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// A named life-stage holding actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(skip)]
    name: String,
    #[serde(default)]
    min_age: TimeValue,
    #[serde(default, with = "actions::action_map")]
    actions: BTreeMap<String, LifecycleAction>,
}

impl Phase {
    pub fn new(name: impl Into<String>, min_age: TimeValue, actions: Vec<LifecycleAction>) -> Self {
        Self {
            name: name.into(),
            min_age,
            actions: actions
                .into_iter()
                .map(|action| (action.name().to_string(), action))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_age(&self) -> TimeValue {
        self.min_age
    }

    pub fn actions(&self) -> &BTreeMap<String, LifecycleAction> {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&LifecycleAction> {
        self.actions.get(name)
    }

    /// Actions in execution order. Names outside the canonical list (only
    /// possible for unvalidated phases) run last, by name.
    pub fn ordered_actions(&self) -> Vec<&LifecycleAction> {
        let canonical = ordered_actions_for_phase(&self.name);
        let mut ordered: Vec<&LifecycleAction> = canonical
            .iter()
            .filter_map(|name| self.actions.get(*name))
            .collect();
        ordered.extend(
            self.actions
                .iter()
                .filter(|(name, _)| !canonical.contains(&name.as_str()))
                .map(|(_, action)| action),
        );
        ordered
    }

    /// Name of the first action executed after `action`, if any
    pub fn next_action_after(&self, action: &str) -> Option<&LifecycleAction> {
        let ordered = self.ordered_actions();
        let canonical = ordered_actions_for_phase(&self.name);
        match canonical.iter().position(|name| *name == action) {
            Some(rank) => ordered.into_iter().find(|candidate| {
                canonical
                    .iter()
                    .position(|name| *name == candidate.name())
                    .map_or(true, |candidate_rank| candidate_rank > rank)
            }),
            None => ordered
                .iter()
                .position(|candidate| candidate.name() == action)
                .and_then(|pos| ordered.get(pos + 1).copied()),
        }
    }

    /// Compile every action followed by this phase's complete step, which
    /// points at `next_key`
    pub fn to_steps(&self, next_key: &StepKey) -> Vec<Step> {
        let complete = Step::phase_complete(&self.name, next_key.clone());
        let mut following = complete.key().clone();
        let mut compiled: Vec<Vec<Step>> = Vec::new();

        for action in self.ordered_actions().into_iter().rev() {
            let steps = action.to_steps(&self.name, &following);
            if let Some(first) = steps.first() {
                following = first.key().clone();
            }
            compiled.push(steps);
        }

        let mut steps: Vec<Step> = compiled.into_iter().rev().flatten().collect();
        steps.push(complete);
        steps
    }

    pub(crate) fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

#[derive(Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    phases: BTreeMap<String, Phase>,
}

/// Named mapping of phases
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecyclePolicy {
    #[serde(skip)]
    name: String,
    phases: BTreeMap<String, Phase>,
}

impl LifecyclePolicy {
    pub fn new(name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            name: name.into(),
            phases: phases
                .into_iter()
                .map(|phase| (phase.name.clone(), phase))
                .collect(),
        }
    }

    /// Parse a `{"phases": {...}}` document
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let document: PolicyDocument = serde_json::from_str(json)?;
        let phases = document
            .phases
            .into_iter()
            .map(|(phase_name, phase)| phase.with_name(&phase_name))
            .collect();
        Ok(Self::new(name, phases))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phases(&self) -> &BTreeMap<String, Phase> {
        &self.phases
    }

    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.get(name)
    }

    /// Phases in execution order
    pub fn ordered_phases(&self) -> Vec<&Phase> {
        let mut phases: Vec<&Phase> = self.phases.values().collect();
        phases.sort_by_key(|phase| (phase_index(&phase.name).unwrap_or(usize::MAX), phase.name.clone()));
        phases
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid_policy(&self.name, "policy name must not be empty"));
        }
        for (key, phase) in &self.phases {
            if *key != phase.name {
                return Err(invalid_policy(
                    &self.name,
                    format!("phase [{}] is stored under key [{key}]", phase.name),
                ));
            }
            if !VALID_PHASES.contains(&key.as_str()) {
                return Err(invalid_policy(
                    &self.name,
                    format!("unsupported phase [{key}], expected one of {VALID_PHASES:?}"),
                ));
            }
            let allowed = ordered_actions_for_phase(key);
            if let Some(name) = phase
                .actions
                .keys()
                .find(|name| !allowed.contains(&name.as_str()))
            {
                return Err(invalid_policy(
                    &self.name,
                    format!("invalid action [{name}] defined in phase [{key}]"),
                ));
            }
        }
        Ok(())
    }

    /// Compile the whole policy: init step, phases in order, terminal marker
    pub fn to_steps(&self) -> Vec<Step> {
        let terminal = Step::terminal();
        let mut following = terminal.key().clone();
        let mut compiled: Vec<Vec<Step>> = Vec::new();

        for phase in self.ordered_phases().into_iter().rev() {
            let steps = phase.to_steps(&following);
            if let Some(first) = steps.first() {
                following = first.key().clone();
            }
            compiled.push(steps);
        }

        let init = Step::new(
            StepKey::init(),
            Some(following),
            StepKind::ClusterStateAction { params: json!({}) },
        );
        let mut steps = vec![init];
        steps.extend(compiled.into_iter().rev().flatten());
        steps.push(terminal);
        steps
    }

    /// Whether an index sitting on `key` may be moved past its action.
    /// Keys outside any configured action are always safe.
    pub fn is_action_safe(&self, key: &StepKey) -> bool {
        self.phases
            .get(&key.phase)
            .and_then(|phase| phase.action(&key.action))
            .map_or(true, LifecycleAction::is_safe_action)
    }
}

/// A policy as stored, with its version and modification time
#[derive(Debug, Clone, PartialEq)]
pub struct LifecyclePolicyMetadata {
    policy: LifecyclePolicy,
    headers: BTreeMap<String, String>,
    version: i64,
    modified_date: i64,
}

impl LifecyclePolicyMetadata {
    pub fn new(
        policy: LifecyclePolicy,
        headers: BTreeMap<String, String>,
        version: i64,
        modified_date: i64,
    ) -> Self {
        Self {
            policy,
            headers,
            version,
            modified_date,
        }
    }

    pub fn name(&self) -> &str {
        self.policy.name()
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Modification time in epoch millis
    pub fn modified_date(&self) -> i64 {
        self.modified_date
    }

    pub fn modified_date_string(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.modified_date)
            .map(|date| date.to_rfc3339())
            .unwrap_or_else(|| self.modified_date.to_string())
    }
}
