//! # Lifecycle Execution State
//!
//! Per-index progress record of the lifecycle state machine. It is persisted
//! as an opaque `String → String` map inside the index metadata, which is the
//! only place progress lives: a restarted process resumes from this map alone.
//!
//! Invariants enforced when reading a persisted map:
//! - `phase`, `action` and `step` are either all present or all absent
//! - numeric fields hold decimal integers

use crate::constants::state_keys::{
    ACTION, ACTION_TIME, FAILED_STEP, FAILED_STEP_RETRY_COUNT, PHASE, PHASE_DEFINITION,
    PHASE_TIME, STEP, STEP_INFO, STEP_TIME,
};
use crate::error::{invalid_state, Result};
use crate::policy::StepKey;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleExecutionState {
    phase: Option<String>,
    action: Option<String>,
    step: Option<String>,
    phase_time: Option<i64>,
    action_time: Option<i64>,
    step_time: Option<i64>,
    failed_step: Option<String>,
    step_info: Option<String>,
    failed_step_retry_count: Option<u32>,
    phase_definition: Option<String>,
}

impl LifecycleExecutionState {
    pub fn builder() -> LifecycleExecutionStateBuilder {
        LifecycleExecutionStateBuilder::default()
    }

    /// Builder seeded with every field of this state
    pub fn to_builder(&self) -> LifecycleExecutionStateBuilder {
        LifecycleExecutionStateBuilder {
            state: self.clone(),
        }
    }

    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn phase_time(&self) -> Option<i64> {
        self.phase_time
    }

    pub fn action_time(&self) -> Option<i64> {
        self.action_time
    }

    pub fn step_time(&self) -> Option<i64> {
        self.step_time
    }

    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    pub fn step_info(&self) -> Option<&str> {
        self.step_info.as_deref()
    }

    pub fn failed_step_retry_count(&self) -> Option<u32> {
        self.failed_step_retry_count
    }

    pub fn phase_definition(&self) -> Option<&str> {
        self.phase_definition.as_deref()
    }

    /// The step the index currently sits on, if it is managed
    pub fn current_step_key(&self) -> Option<StepKey> {
        match (&self.phase, &self.action, &self.step) {
            (Some(phase), Some(action), Some(step)) => {
                Some(StepKey::new(phase.as_str(), action.as_str(), step.as_str()))
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Persisted map form; absent fields are absent keys
    pub fn as_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };
        put(PHASE, self.phase.clone());
        put(ACTION, self.action.clone());
        put(STEP, self.step.clone());
        put(PHASE_TIME, self.phase_time.map(|t| t.to_string()));
        put(ACTION_TIME, self.action_time.map(|t| t.to_string()));
        put(STEP_TIME, self.step_time.map(|t| t.to_string()));
        put(FAILED_STEP, self.failed_step.clone());
        put(STEP_INFO, self.step_info.clone());
        put(
            FAILED_STEP_RETRY_COUNT,
            self.failed_step_retry_count.map(|c| c.to_string()),
        );
        put(PHASE_DEFINITION, self.phase_definition.clone());
        map
    }

    /// Read a persisted map. Unknown keys are ignored.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let state = Self {
            phase: map.get(PHASE).cloned(),
            action: map.get(ACTION).cloned(),
            step: map.get(STEP).cloned(),
            phase_time: parse_field(map, PHASE_TIME)?,
            action_time: parse_field(map, ACTION_TIME)?,
            step_time: parse_field(map, STEP_TIME)?,
            failed_step: map.get(FAILED_STEP).cloned(),
            step_info: map.get(STEP_INFO).cloned(),
            failed_step_retry_count: parse_field(map, FAILED_STEP_RETRY_COUNT)?,
            phase_definition: map.get(PHASE_DEFINITION).cloned(),
        };

        let present = [&state.phase, &state.action, &state.step]
            .iter()
            .filter(|field| field.is_some())
            .count();
        if present != 0 && present != 3 {
            return Err(invalid_state(
                STEP,
                "phase, action and step must be set together",
            ));
        }
        Ok(state)
    }
}

fn parse_field<T: std::str::FromStr>(map: &BTreeMap<String, String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    map.get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| invalid_state(key, format!("cannot parse [{raw}]: {e}")))
        })
        .transpose()
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleExecutionStateBuilder {
    state: LifecycleExecutionState,
}

impl LifecycleExecutionStateBuilder {
    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.state.phase = Some(phase.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.state.action = Some(action.into());
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.state.step = Some(step.into());
        self
    }

    /// Set phase, action and step from a key
    pub fn step_key(self, key: &StepKey) -> Self {
        self.phase(key.phase.as_str())
            .action(key.action.as_str())
            .step(key.name.as_str())
    }

    pub fn phase_time(mut self, millis: i64) -> Self {
        self.state.phase_time = Some(millis);
        self
    }

    pub fn action_time(mut self, millis: i64) -> Self {
        self.state.action_time = Some(millis);
        self
    }

    pub fn step_time(mut self, millis: i64) -> Self {
        self.state.step_time = Some(millis);
        self
    }

    pub fn failed_step(mut self, step: impl Into<String>) -> Self {
        self.state.failed_step = Some(step.into());
        self
    }

    pub fn clear_failed_step(mut self) -> Self {
        self.state.failed_step = None;
        self
    }

    pub fn step_info(mut self, step_info: impl Into<String>) -> Self {
        self.state.step_info = Some(step_info.into());
        self
    }

    pub fn clear_step_info(mut self) -> Self {
        self.state.step_info = None;
        self
    }

    pub fn failed_step_retry_count(mut self, count: u32) -> Self {
        self.state.failed_step_retry_count = Some(count);
        self
    }

    pub fn clear_failed_step_retry_count(mut self) -> Self {
        self.state.failed_step_retry_count = None;
        self
    }

    pub fn phase_definition(mut self, definition: impl Into<String>) -> Self {
        self.state.phase_definition = Some(definition.into());
        self
    }

    pub fn clear_phase_definition(mut self) -> Self {
        self.state.phase_definition = None;
        self
    }

    pub fn build(self) -> LifecycleExecutionState {
        self.state
    }
}
