//! # Policy Step Registry
//!
//! Compiled step graphs for every stored lifecycle policy, published as an
//! atomically swapped snapshot.
//!
//! ```text
//! PolicyStepsRegistryHandle ──load()──▶ Arc<PolicyStepsRegistry>
//!          ▲                                  │
//!   update / apply_cluster_state        get_step, get_step_for_index, …
//! ```

pub mod handle;
pub mod policy_steps;

pub use handle::PolicyStepsRegistryHandle;
pub use policy_steps::{PolicyStepsRegistry, RegistryStats};
