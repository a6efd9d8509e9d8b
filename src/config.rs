//! # Lifecycle Configuration
//!
//! Runtime knobs for the transition functions. Loaded in layers:
//! 1. an optional TOML/YAML/JSON file
//! 2. environment variables prefixed `LIFECYCLE__`, nested with `__`
//!    (e.g. `LIFECYCLE__REMOVAL__REFUSE_UNSAFE_ACTIONS=true`)
//!
//! Every field has a default, so an empty source set yields
//! [`LifecycleConfig::default`].

use crate::error::{LifecycleError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "LIFECYCLE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub removal: RemovalConfig,
    pub policy_update: PolicyUpdateConfig,
    pub step_info: StepInfoConfig,
}

/// Behaviour of policy removal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Leave indices inside an unsafe action untouched and report them as failed
    pub refuse_unsafe_actions: bool,
}

/// Behaviour when a running policy is edited underneath an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyUpdateConfig {
    /// Move indices past an unsafe action that disappeared from the policy
    pub skip_forward_unsafe_actions: bool,
}

impl Default for PolicyUpdateConfig {
    fn default() -> Self {
        Self {
            skip_forward_unsafe_actions: true,
        }
    }
}

/// Rendering of failure diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepInfoConfig {
    /// Uncurated stack traces are truncated to this many characters
    pub max_stack_trace_chars: usize,
}

impl Default for StepInfoConfig {
    fn default() -> Self {
        Self {
            max_stack_trace_chars: 8192,
        }
    }
}

impl LifecycleConfig {
    /// Load from an optional file plus `LIFECYCLE__` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder,
        };
        let builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: LifecycleConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            source = ?path.map(Path::display).map(|p| p.to_string()),
            refuse_unsafe_actions = config.removal.refuse_unsafe_actions,
            skip_forward_unsafe_actions = config.policy_update.skip_forward_unsafe_actions,
            max_stack_trace_chars = config.step_info.max_stack_trace_chars,
            "Lifecycle configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_info.max_stack_trace_chars == 0 {
            return Err(LifecycleError::Configuration(
                "step_info.max_stack_trace_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
