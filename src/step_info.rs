//! # Step Failure Diagnostics
//!
//! A step failure is recorded in the execution state's `step_info` field as
//! `{"type": .., "reason": .., "stack_trace": ..}`. Causes raised by this crate
//! are curated: their message is meaningful on its own and the stack trace is
//! omitted. Anything else is uncurated and keeps its full error chain.

use crate::config::StepInfoConfig;
use crate::error::{LifecycleError, Result};
use serde::{Deserialize, Serialize};

/// Classifier used for failures that carry no more specific type
pub const GENERIC_ERROR_TYPE: &str = "exception";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    #[serde(rename = "type")]
    error_type: String,
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
}

impl FailureCause {
    pub fn curated(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            reason: reason.into(),
            stack_trace: None,
        }
    }

    pub fn uncurated(
        error_type: impl Into<String>,
        reason: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            reason: reason.into(),
            stack_trace: Some(stack_trace.into()),
        }
    }

    /// Classify an arbitrary step failure with default limits
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::from_error_with(err, &StepInfoConfig::default())
    }

    /// Classify an arbitrary step failure. A [`LifecycleError`] anywhere at
    /// the top of the chain is curated; everything else keeps its debug chain,
    /// truncated to `config.max_stack_trace_chars`.
    pub fn from_error_with(err: &anyhow::Error, config: &StepInfoConfig) -> Self {
        if let Some(lifecycle_err) = err.downcast_ref::<LifecycleError>() {
            return Self::from(lifecycle_err);
        }
        let trace = format!("{err:?}");
        Self::uncurated(
            GENERIC_ERROR_TYPE,
            err.to_string(),
            truncate_chars(&trace, config.max_stack_trace_chars),
        )
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn is_curated(&self) -> bool {
        self.stack_trace.is_none()
    }

    /// Serialized `step_info` document
    pub fn to_step_info_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&LifecycleError> for FailureCause {
    fn from(err: &LifecycleError) -> Self {
        Self::curated(err.error_type(), err.to_string())
    }
}

impl From<LifecycleError> for FailureCause {
    fn from(err: LifecycleError) -> Self {
        Self::from(&err)
    }
}

impl From<anyhow::Error> for FailureCause {
    fn from(err: anyhow::Error) -> Self {
        Self::from_error(&err)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_curated_cause_omits_stack_trace() {
        let cause = FailureCause::curated("exception", "failed");
        assert_eq!(
            cause.to_step_info_json().unwrap(),
            r#"{"type":"exception","reason":"failed"}"#
        );
        assert!(cause.is_curated());
    }

    #[test]
    fn test_lifecycle_error_is_curated() {
        let err = anyhow::Error::new(LifecycleError::IndexNotFound {
            index: "gone".to_string(),
        });
        let cause = FailureCause::from_error(&err);
        assert!(cause.is_curated());
        assert_eq!(cause.error_type(), "index_not_found_exception");
        assert_eq!(cause.reason(), "index [gone] does not exist");
    }

    #[test]
    fn test_uncurated_cause_keeps_chain() {
        let err = Err::<(), _>(anyhow!("no space left on device"))
            .context("disk full")
            .unwrap_err();
        let cause = FailureCause::from(err);

        assert_eq!(cause.error_type(), "exception");
        assert_eq!(cause.reason(), "disk full");
        let trace = cause.stack_trace().unwrap();
        assert!(trace.contains("no space left on device"));
        assert!(cause
            .to_step_info_json()
            .unwrap()
            .contains("\"stack_trace\":"));
    }

    #[test]
    fn test_stack_trace_truncation() {
        let err = anyhow!("é".repeat(50));
        let cause = FailureCause::from_error_with(
            &err,
            &StepInfoConfig {
                max_stack_trace_chars: 10,
            },
        );
        assert_eq!(cause.stack_trace().unwrap().chars().count(), 10);
        assert_eq!(cause.reason().chars().count(), 50);
    }
}
