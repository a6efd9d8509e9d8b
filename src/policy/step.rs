use crate::constants::steps::{
    ERROR_STEP_NAME, INIT_ACTION, INIT_STEP, NEW_PHASE, PHASE_COMPLETE, TERMINAL,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Address of a single step: `(phase, action, name)`.
///
/// Displays as its JSON object form, which is also how it appears in error
/// messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey {
    pub phase: String,
    pub action: String,
    pub name: String,
}

impl StepKey {
    pub fn new(
        phase: impl Into<String>,
        action: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            phase: phase.into(),
            action: action.into(),
            name: name.into(),
        }
    }

    /// Error step for the given phase and action
    pub fn error_step(phase: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(phase, action, ERROR_STEP_NAME)
    }

    /// Step closing the given phase
    pub fn phase_complete(phase: impl Into<String>) -> Self {
        Self::new(phase, PHASE_COMPLETE, PHASE_COMPLETE)
    }

    /// First step of every compiled policy
    pub fn init() -> Self {
        Self::new(NEW_PHASE, INIT_ACTION, INIT_STEP)
    }

    /// Marker reached after the final phase completes
    pub fn terminal() -> Self {
        Self::new(TERMINAL, TERMINAL, TERMINAL)
    }

    pub fn is_error_step(&self) -> bool {
        self.name == ERROR_STEP_NAME
    }

    pub fn is_phase_complete(&self) -> bool {
        self.action == PHASE_COMPLETE && self.name == PHASE_COMPLETE
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::terminal()
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// What a step does, as a closed set.
///
/// Work-performing variants carry a `params` document that the external step
/// implementation interprets; this crate never executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Pure mutation of cluster metadata
    ClusterStateAction { params: Value },
    /// Polls an external condition until it holds
    AsyncWait { params: Value, retryable: bool },
    /// Performs work with an external side effect
    AsyncAction { params: Value, retryable: bool },
    /// Entered when a step fails; never advances on its own
    Error,
    /// Closes a phase once its actions are exhausted
    PhaseComplete,
    /// Completion marker after the final phase
    Terminal,
}

impl StepKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ClusterStateAction { .. } => "cluster_state_action",
            Self::AsyncWait { .. } => "async_wait",
            Self::AsyncAction { .. } => "async_action",
            Self::Error => "error",
            Self::PhaseComplete => "phase_complete",
            Self::Terminal => "terminal",
        }
    }
}

/// A compiled step with its successor
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    key: StepKey,
    next_key: Option<StepKey>,
    kind: StepKind,
}

impl Step {
    pub fn new(key: StepKey, next_key: Option<StepKey>, kind: StepKind) -> Self {
        Self {
            key,
            next_key,
            kind,
        }
    }

    /// Error step; its successor is itself
    pub fn error(key: StepKey) -> Self {
        let next_key = Some(key.clone());
        Self::new(key, next_key, StepKind::Error)
    }

    pub fn phase_complete(phase: &str, next_key: StepKey) -> Self {
        Self::new(
            StepKey::phase_complete(phase),
            Some(next_key),
            StepKind::PhaseComplete,
        )
    }

    pub fn terminal() -> Self {
        Self::new(StepKey::terminal(), None, StepKind::Terminal)
    }

    pub fn key(&self) -> &StepKey {
        &self.key
    }

    pub fn next_key(&self) -> Option<&StepKey> {
        self.next_key.as_ref()
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Whether a failure of this step may be retried automatically
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            StepKind::AsyncWait { retryable, .. } | StepKind::AsyncAction { retryable, .. } => {
                *retryable
            }
            _ => false,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(
            self.kind,
            StepKind::AsyncWait { .. } | StepKind::AsyncAction { .. }
        )
    }
}
