//! Test data builders for lifecycle snapshots.

#![allow(dead_code)] // Each integration test binary uses a different subset

use lifecycle_core::cluster_state::{
    ClusterState, IndexLifecycleMetadata, IndexMetadata, Metadata, OperationMode,
};
use lifecycle_core::execution_state::{LifecycleExecutionState, LifecycleExecutionStateBuilder};
use lifecycle_core::policy::{
    LifecycleAction, LifecyclePolicy, LifecyclePolicyMetadata, Phase, RolloverAction,
    SetPriorityAction, StepKey, TimeValue,
};
use lifecycle_core::registry::PolicyStepsRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const POLICY: &str = "my_policy";
pub const INDEX: &str = "my_index";

pub fn rollover(max_docs: u64) -> LifecycleAction {
    LifecycleAction::Rollover(RolloverAction {
        max_docs: Some(max_docs),
        ..Default::default()
    })
}

pub fn set_priority(priority: u32) -> LifecycleAction {
    LifecycleAction::SetPriority(SetPriorityAction {
        priority: Some(priority),
    })
}

/// `{hot: {rollover}, delete: {}}`
pub fn rollover_policy(name: &str) -> LifecyclePolicy {
    LifecyclePolicy::new(
        name,
        vec![
            Phase::new("hot", TimeValue::ZERO, vec![rollover(1)]),
            Phase::new("delete", TimeValue::from_days(30), vec![]),
        ],
    )
}

/// Single hot phase holding the given actions
pub fn hot_policy(name: &str, actions: Vec<LifecycleAction>) -> LifecyclePolicy {
    LifecyclePolicy::new(name, vec![Phase::new("hot", TimeValue::ZERO, actions)])
}

pub fn policy_metadata(policy: LifecyclePolicy, version: i64) -> LifecyclePolicyMetadata {
    LifecyclePolicyMetadata::new(policy, BTreeMap::new(), version, version)
}

/// Execution state sitting on `key` with distinct entry timestamps
pub fn state_at(key: &StepKey) -> LifecycleExecutionStateBuilder {
    LifecycleExecutionState::builder()
        .step_key(key)
        .phase_time(10)
        .action_time(20)
        .step_time(30)
}

/// Builder for a cluster snapshot with policies and managed indices
#[derive(Default)]
pub struct TestClusterBuilder {
    policies: Vec<LifecyclePolicyMetadata>,
    indices: Vec<IndexMetadata>,
}

impl TestClusterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: LifecyclePolicyMetadata) -> Self {
        self.policies.push(policy);
        self
    }

    /// Index managed by `policy` with the given execution state
    pub fn with_managed_index(
        mut self,
        name: &str,
        policy: &str,
        state: LifecycleExecutionState,
    ) -> Self {
        self.indices.push(
            IndexMetadata::builder(name)
                .policy(policy)
                .lifecycle_state(&state)
                .build(),
        );
        self
    }

    pub fn with_index(mut self, index: IndexMetadata) -> Self {
        self.indices.push(index);
        self
    }

    pub fn registry(&self) -> PolicyStepsRegistry {
        PolicyStepsRegistry::new(self.policies.clone())
    }

    pub fn build(self) -> Arc<ClusterState> {
        let metadata = self
            .indices
            .into_iter()
            .fold(Metadata::builder(), |builder, index| builder.put(index))
            .lifecycle(IndexLifecycleMetadata::new(
                self.policies,
                OperationMode::Running,
            ))
            .build();
        ClusterState::new(metadata)
    }
}

pub fn index_of<'a>(state: &'a ClusterState, index: &str) -> &'a IndexMetadata {
    state
        .metadata()
        .index(index)
        .map(|meta| meta.as_ref())
        .expect("index should exist in the test snapshot")
}

pub fn execution_state(state: &ClusterState, index: &str) -> LifecycleExecutionState {
    index_of(state, index)
        .lifecycle_execution_state()
        .expect("execution state should parse")
}
