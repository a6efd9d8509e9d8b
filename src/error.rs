//! Error types for the lifecycle core.
//!
//! Every fallible operation returns [`LifecycleError`]. Precondition failures
//! are reported before any state is computed, so a returned error always means
//! the input snapshot was left untouched.

use crate::policy::StepKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("index [{index}] is not associated with an Index Lifecycle Policy")]
    NotManaged { index: String },

    #[error("index [{index}] does not exist")]
    IndexNotFound { index: String },

    #[error("index [{index}] is not on current step [{expected}], currently: [{actual}]")]
    StepMismatch {
        index: String,
        expected: StepKey,
        actual: String,
    },

    #[error("step [{key}] for index [{index}] with policy [{policy}] does not exist")]
    StepNotFound {
        key: StepKey,
        index: String,
        policy: String,
    },

    #[error(
        "cannot retry an action for an index [{index}] that has not encountered an error when running a Lifecycle Policy"
    )]
    NotInErrorStep { index: String },

    #[error("lifecycle policy [{policy}] does not exist")]
    PolicyNotFound { policy: String },

    #[error("invalid lifecycle policy [{policy}]: {reason}")]
    InvalidPolicy { policy: String, reason: String },

    #[error("invalid lifecycle execution state for field [{field}]: {reason}")]
    InvalidExecutionState { field: String, reason: String },

    #[error("index [{index}] is executing unsafe action [{action}] of policy [{policy}]")]
    UnsafeAction {
        index: String,
        policy: String,
        action: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LifecycleError {
    /// `true` for the "step does not exist" condition, which callers treat as
    /// the expected outcome of a policy edit rather than corrupted state.
    pub fn is_step_not_found(&self) -> bool {
        matches!(self, Self::StepNotFound { .. })
    }

    /// Stable classifier written into `step_info.type` when this error is the
    /// cause of a step failure.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotManaged { .. } => "not_managed_exception",
            Self::IndexNotFound { .. } => "index_not_found_exception",
            Self::StepMismatch { .. } => "step_mismatch_exception",
            Self::StepNotFound { .. } => "step_not_found_exception",
            Self::NotInErrorStep { .. } => "not_in_error_step_exception",
            Self::PolicyNotFound { .. } => "policy_not_found_exception",
            Self::InvalidPolicy { .. } => "invalid_policy_exception",
            Self::InvalidExecutionState { .. } => "invalid_execution_state_exception",
            Self::UnsafeAction { .. } => "unsafe_action_exception",
            Self::Serialization(_) => "serialization_exception",
            Self::Configuration(_) => "configuration_exception",
        }
    }
}

impl From<config::ConfigError> for LifecycleError {
    fn from(err: config::ConfigError) -> Self {
        LifecycleError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Helper for invalid execution-state fields
pub fn invalid_state(field: impl Into<String>, reason: impl Into<String>) -> LifecycleError {
    LifecycleError::InvalidExecutionState {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Helper for policy validation failures
pub fn invalid_policy(policy: impl Into<String>, reason: impl Into<String>) -> LifecycleError {
    LifecycleError::InvalidPolicy {
        policy: policy.into(),
        reason: reason.into(),
    }
}
