#![allow(clippy::doc_markdown)] // Allow technical terms like JSON, ERROR in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Lifecycle Core
//!
//! Deterministic index lifecycle state machine.
//!
//! ## Overview
//!
//! Each managed index is driven through an operator-defined policy of
//! phases → actions → steps (for example hot → warm → cold → delete). This
//! crate computes the transitions as pure functions over an immutable,
//! versioned cluster metadata snapshot; committing the result and running the
//! steps themselves belong to the embedding system.
//!
//! ## Key Features
//!
//! - **Pure transitions**: same inputs, same snapshot; unchanged state returns the input `Arc`
//! - **Restart safe**: all progress lives in the persisted execution-state map
//! - **Edit tolerant**: indices keep executing the phase definition they entered with
//! - **Auditable retries**: automatic retries are counted, manual retries are not
//!
//! ## Module Organization
//!
//! - [`policy`] - Policies, phases, actions, steps and step keys
//! - [`registry`] - Compiled step graphs and the atomically swapped handle
//! - [`execution_state`] - Per-index persisted progress record
//! - [`transition`] - Transition functions
//! - [`phase_cache`] - Cached phase refresh after policy edits
//! - [`cluster_state`] - Immutable cluster metadata snapshot
//! - [`step_info`] - Failure diagnostics
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust
//! use lifecycle_core::cluster_state::{ClusterState, IndexMetadata, Metadata};
//! use lifecycle_core::policy::{LifecyclePolicy, LifecyclePolicyMetadata, StepKey};
//! use lifecycle_core::registry::PolicyStepsRegistry;
//! use lifecycle_core::transition::move_cluster_state_to_step;
//! use std::collections::BTreeMap;
//!
//! # fn example() -> lifecycle_core::Result<()> {
//! let policy = LifecyclePolicy::from_json(
//!     "logs",
//!     r#"{"phases":{"hot":{"actions":{"rollover":{"max_age":"1d"}}}}}"#,
//! )?;
//! let registry = PolicyStepsRegistry::new(vec![LifecyclePolicyMetadata::new(
//!     policy,
//!     BTreeMap::new(),
//!     1,
//!     0,
//! )]);
//!
//! let state = ClusterState::new(
//!     Metadata::builder()
//!         .put(IndexMetadata::builder("logs-000001").policy("logs").build())
//!         .build(),
//! );
//! let first = registry.get_first_step_key("logs").unwrap_or_else(StepKey::init);
//! let next = move_cluster_state_to_step("logs-000001", &state, &first, 0, &registry, true)?;
//! assert_eq!(next.version(), state.version() + 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod cluster_state;
pub mod config;
pub mod constants;
pub mod error;
pub mod execution_state;
pub mod logging;
pub mod phase_cache;
pub mod policy;
pub mod registry;
pub mod step_info;
pub mod transition;

pub use cluster_state::{ClusterState, IndexMetadata, Metadata};
pub use config::{LifecycleConfig, PolicyUpdateConfig, RemovalConfig, StepInfoConfig};
pub use error::{LifecycleError, Result};
pub use execution_state::LifecycleExecutionState;
pub use phase_cache::PhaseExecutionInfo;
pub use policy::{LifecyclePolicy, LifecyclePolicyMetadata, Phase, Step, StepKey, StepKind};
pub use registry::{PolicyStepsRegistry, PolicyStepsRegistryHandle};
pub use step_info::FailureCause;
