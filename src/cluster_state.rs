//! # Cluster Metadata Snapshot
//!
//! Immutable, versioned view of cluster metadata consumed and produced by the
//! transition functions. Every node is shared behind an `Arc`, so producing a
//! new snapshot only copies the path from the root to the changed index.
//!
//! Callers detect "nothing changed" with [`Arc::ptr_eq`]: transitions hand back
//! the input `Arc` itself when the computed state is value-identical.

use crate::constants::settings::LIFECYCLE_NAME;
use crate::constants::ILM_CUSTOM_METADATA_KEY;
use crate::error::Result;
use crate::execution_state::LifecycleExecutionState;
use crate::policy::LifecyclePolicyMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Cluster-wide lifecycle operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    #[default]
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Stored policies plus the operation mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexLifecycleMetadata {
    policies: BTreeMap<String, LifecyclePolicyMetadata>,
    operation_mode: OperationMode,
}

impl IndexLifecycleMetadata {
    pub fn new(policies: Vec<LifecyclePolicyMetadata>, operation_mode: OperationMode) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|meta| (meta.name().to_string(), meta))
                .collect(),
            operation_mode,
        }
    }

    pub fn policies(&self) -> &BTreeMap<String, LifecyclePolicyMetadata> {
        &self.policies
    }

    pub fn policy(&self, name: &str) -> Option<&LifecyclePolicyMetadata> {
        self.policies.get(name)
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.operation_mode
    }
}

/// Metadata of one managed resource
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    name: String,
    uuid: Uuid,
    settings: BTreeMap<String, String>,
    lifecycle_state: BTreeMap<String, String>,
}

impl IndexMetadata {
    /// Builder for a new index with a freshly generated uuid
    pub fn builder(name: impl Into<String>) -> IndexMetadataBuilder {
        IndexMetadataBuilder {
            name: name.into(),
            uuid: Uuid::new_v4(),
            settings: BTreeMap::new(),
            lifecycle_state: BTreeMap::new(),
        }
    }

    pub fn to_builder(&self) -> IndexMetadataBuilder {
        IndexMetadataBuilder {
            name: self.name.clone(),
            uuid: self.uuid,
            settings: self.settings.clone(),
            lifecycle_state: self.lifecycle_state.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Configured lifecycle policy; an empty setting counts as unset
    pub fn policy_name(&self) -> Option<&str> {
        self.setting(LIFECYCLE_NAME).filter(|name| !name.is_empty())
    }

    /// Raw execution-state map stored under the `ilm` custom key
    pub fn custom_data(&self, key: &str) -> Option<&BTreeMap<String, String>> {
        (key == ILM_CUSTOM_METADATA_KEY && !self.lifecycle_state.is_empty())
            .then_some(&self.lifecycle_state)
    }

    pub fn lifecycle_execution_state(&self) -> Result<LifecycleExecutionState> {
        LifecycleExecutionState::from_map(&self.lifecycle_state)
    }
}

#[derive(Debug, Clone)]
pub struct IndexMetadataBuilder {
    name: String,
    uuid: Uuid,
    settings: BTreeMap<String, String>,
    lifecycle_state: BTreeMap<String, String>,
}

impl IndexMetadataBuilder {
    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn remove_setting(mut self, key: &str) -> Self {
        self.settings.remove(key);
        self
    }

    /// Shorthand for the `index.lifecycle.name` setting
    pub fn policy(self, policy: impl Into<String>) -> Self {
        self.setting(LIFECYCLE_NAME, policy)
    }

    pub fn lifecycle_state(mut self, state: &LifecycleExecutionState) -> Self {
        self.lifecycle_state = state.as_map();
        self
    }

    pub fn clear_lifecycle_state(mut self) -> Self {
        self.lifecycle_state.clear();
        self
    }

    pub fn build(self) -> IndexMetadata {
        IndexMetadata {
            name: self.name,
            uuid: self.uuid,
            settings: self.settings,
            lifecycle_state: self.lifecycle_state,
        }
    }
}

/// Index table plus lifecycle metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    indices: BTreeMap<String, Arc<IndexMetadata>>,
    lifecycle: Arc<IndexLifecycleMetadata>,
}

impl Metadata {
    pub fn builder() -> MetadataBuilder {
        MetadataBuilder::default()
    }

    pub fn to_builder(&self) -> MetadataBuilder {
        MetadataBuilder {
            indices: self.indices.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    pub fn index(&self, name: &str) -> Option<&Arc<IndexMetadata>> {
        self.indices.get(name)
    }

    pub fn indices(&self) -> &BTreeMap<String, Arc<IndexMetadata>> {
        &self.indices
    }

    pub fn lifecycle(&self) -> &IndexLifecycleMetadata {
        &self.lifecycle
    }

    /// Indices whose `index.lifecycle.name` names `policy`
    pub fn indices_with_policy<'a>(
        &'a self,
        policy: &'a str,
    ) -> impl Iterator<Item = &'a Arc<IndexMetadata>> + 'a {
        self.indices
            .values()
            .filter(move |index| index.policy_name() == Some(policy))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    indices: BTreeMap<String, Arc<IndexMetadata>>,
    lifecycle: Arc<IndexLifecycleMetadata>,
}

impl MetadataBuilder {
    /// Insert or replace an index
    pub fn put(mut self, index: IndexMetadata) -> Self {
        self.indices.insert(index.name.clone(), Arc::new(index));
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.indices.remove(name);
        self
    }

    pub fn lifecycle(mut self, lifecycle: IndexLifecycleMetadata) -> Self {
        self.lifecycle = Arc::new(lifecycle);
        self
    }

    pub fn build(self) -> Metadata {
        Metadata {
            indices: self.indices,
            lifecycle: self.lifecycle,
        }
    }
}

/// Versioned root of the snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterState {
    version: u64,
    metadata: Arc<Metadata>,
}

impl ClusterState {
    pub fn new(metadata: Metadata) -> Arc<Self> {
        Arc::new(Self {
            version: 1,
            metadata: Arc::new(metadata),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Successor snapshot carrying `metadata`
    pub fn with_metadata(&self, metadata: Metadata) -> Arc<Self> {
        Arc::new(Self {
            version: self.version + 1,
            metadata: Arc::new(metadata),
        })
    }

    /// Successor snapshot with a single index replaced
    pub fn with_index(&self, index: IndexMetadata) -> Arc<Self> {
        self.with_metadata(self.metadata.to_builder().put(index).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_name_ignores_empty_setting() {
        let index = IndexMetadata::builder("logs-1").policy("").build();
        assert_eq!(index.policy_name(), None);

        let index = index.to_builder().policy("logs").build();
        assert_eq!(index.policy_name(), Some("logs"));
    }

    #[test]
    fn test_with_index_shares_untouched_indices() {
        let metadata = Metadata::builder()
            .put(IndexMetadata::builder("a").build())
            .put(IndexMetadata::builder("b").build())
            .build();
        let state = ClusterState::new(metadata);

        let updated_a = state
            .metadata()
            .index("a")
            .unwrap()
            .to_builder()
            .setting("index.priority", "50")
            .build();
        let next = state.with_index(updated_a);

        assert_eq!(next.version(), state.version() + 1);
        assert!(Arc::ptr_eq(
            state.metadata().index("b").unwrap(),
            next.metadata().index("b").unwrap()
        ));
        assert_eq!(
            next.metadata().index("a").unwrap().setting("index.priority"),
            Some("50")
        );
    }

    #[test]
    fn test_lifecycle_state_round_trip() {
        let exec = LifecycleExecutionState::builder()
            .phase("hot")
            .action("rollover")
            .step("rollover")
            .step_time(5)
            .build();
        let index = IndexMetadata::builder("a").lifecycle_state(&exec).build();

        assert_eq!(index.lifecycle_execution_state().unwrap(), exec);
        assert!(index.custom_data(ILM_CUSTOM_METADATA_KEY).is_some());
        assert!(index.custom_data("other").is_none());

        let cleared = index.to_builder().clear_lifecycle_state().build();
        assert!(cleared.lifecycle_execution_state().unwrap().is_empty());
    }

    #[test]
    fn test_operation_mode_display() {
        assert_eq!(OperationMode::default().to_string(), "RUNNING");
        assert_eq!(
            serde_json::to_string(&OperationMode::Stopping).unwrap(),
            "\"STOPPING\""
        );
    }
}
