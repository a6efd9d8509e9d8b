//! # Lifecycle Constants
//!
//! Well-known step names, metadata keys and setting names shared by the
//! registry, the transition functions and the phase cache. These strings are
//! persisted inside cluster metadata and must never change between releases.

/// Custom metadata key under which an index's execution state map is stored
pub const ILM_CUSTOM_METADATA_KEY: &str = "ilm";

/// Index settings owned by the lifecycle subsystem
pub mod settings {
    /// Name of the policy managing the index
    pub const LIFECYCLE_NAME: &str = "index.lifecycle.name";
    /// Set once rollover has made the index read-only for new writes
    pub const LIFECYCLE_INDEXING_COMPLETE: &str = "index.lifecycle.indexing_complete";
    /// Alias rolled over by the `rollover` action
    pub const LIFECYCLE_ROLLOVER_ALIAS: &str = "index.lifecycle.rollover_alias";

    /// Every setting stripped when a policy is removed from an index
    pub const LIFECYCLE_OWNED: [&str; 3] = [
        LIFECYCLE_NAME,
        LIFECYCLE_INDEXING_COMPLETE,
        LIFECYCLE_ROLLOVER_ALIAS,
    ];
}

/// Keys of the persisted execution-state map
pub mod state_keys {
    pub const PHASE: &str = "phase";
    pub const ACTION: &str = "action";
    pub const STEP: &str = "step";
    pub const PHASE_TIME: &str = "phase_time";
    pub const ACTION_TIME: &str = "action_time";
    pub const STEP_TIME: &str = "step_time";
    pub const FAILED_STEP: &str = "failed_step";
    pub const STEP_INFO: &str = "step_info";
    pub const FAILED_STEP_RETRY_COUNT: &str = "failed_step_retry_count";
    pub const PHASE_DEFINITION: &str = "phase_definition";
}

/// Reserved step, action and phase names
pub mod steps {
    /// Step entered when a step fails
    pub const ERROR_STEP_NAME: &str = "ERROR";

    /// Action and step name of the step closing every phase
    pub const PHASE_COMPLETE: &str = "complete";

    /// Pseudo-phase holding the initialization step of every policy
    pub const NEW_PHASE: &str = "new";
    pub const INIT_ACTION: &str = "init";
    pub const INIT_STEP: &str = "init";

    /// Phase, action and step name of the marker after the final phase
    pub const TERMINAL: &str = "completed";
}

/// Phases in the order they execute
pub const VALID_PHASES: [&str; 4] = ["hot", "warm", "cold", "delete"];

/// Canonical action order for each phase; document order is irrelevant
pub fn ordered_actions_for_phase(phase: &str) -> &'static [&'static str] {
    match phase {
        "hot" => &["set_priority", "rollover", "readonly", "shrink", "forcemerge"],
        "warm" => &["set_priority", "readonly", "allocate", "shrink", "forcemerge"],
        "cold" => &["set_priority", "readonly", "allocate", "freeze"],
        "delete" => &["wait_for_snapshot", "delete"],
        _ => &[],
    }
}

/// Position of a phase in [`VALID_PHASES`]
pub fn phase_index(phase: &str) -> Option<usize> {
    VALID_PHASES.iter().position(|p| *p == phase)
}
