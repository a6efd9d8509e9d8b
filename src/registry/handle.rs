//! Process-wide publication point for the compiled registry.
//!
//! Readers take a snapshot with [`PolicyStepsRegistryHandle::load`] and keep
//! using it for the whole transition, so a concurrent rebuild is observed
//! either entirely or not at all. Writers are serialized so two rebuilds never
//! race on deciding which policies changed.

use super::PolicyStepsRegistry;
use crate::cluster_state::ClusterState;
use crate::config::PolicyUpdateConfig;
use crate::logging::log_registry_operation;
use crate::phase_cache::update_indices_for_policy;
use crate::policy::LifecyclePolicyMetadata;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PolicyStepsRegistryHandle {
    inner: Arc<ArcSwap<PolicyStepsRegistry>>,
    write_lock: Arc<Mutex<()>>,
}

impl Default for PolicyStepsRegistryHandle {
    fn default() -> Self {
        Self::new(PolicyStepsRegistry::default())
    }
}

impl PolicyStepsRegistryHandle {
    pub fn new(registry: PolicyStepsRegistry) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(registry)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current registry snapshot
    pub fn load(&self) -> Arc<PolicyStepsRegistry> {
        self.inner.load_full()
    }

    /// Compile `policies` and publish the result
    pub fn update(
        &self,
        policies: impl IntoIterator<Item = LifecyclePolicyMetadata>,
    ) -> Arc<PolicyStepsRegistry> {
        let _guard = self.write_lock.lock();
        let registry = Arc::new(PolicyStepsRegistry::new(policies));
        self.inner.store(Arc::clone(&registry));
        registry
    }

    /// Rebuild from the policies carried by `state` and refresh the phase
    /// cache of indices whose policy version advanced.
    ///
    /// Returns `state` itself when no policy changed or no index needed a
    /// refresh.
    pub fn apply_cluster_state(
        &self,
        state: &Arc<ClusterState>,
        now: i64,
        config: &PolicyUpdateConfig,
    ) -> Arc<ClusterState> {
        let _guard = self.write_lock.lock();
        let previous = self.inner.load_full();
        let lifecycle = state.metadata().lifecycle();

        let unchanged = lifecycle.policies().len() == previous.policy_names().count()
            && lifecycle
                .policies()
                .iter()
                .all(|(name, meta)| previous.policy_metadata(name) == Some(meta));
        if unchanged {
            debug!(
                cluster_state_version = state.version(),
                "Lifecycle policies unchanged, keeping registry"
            );
            return Arc::clone(state);
        }

        self.inner
            .store(Arc::new(PolicyStepsRegistry::from_lifecycle_metadata(lifecycle)));
        info!(
            cluster_state_version = state.version(),
            policy_count = lifecycle.policies().len(),
            "Published rebuilt lifecycle policy registry"
        );

        let mut current = Arc::clone(state);
        for (name, updated) in lifecycle.policies() {
            let Some(previous_meta) = previous.policy_metadata(name) else {
                continue;
            };
            if updated.version() > previous_meta.version() {
                log_registry_operation(
                    "refresh_cached_phases",
                    Some(name.as_str()),
                    Some(updated.version()),
                    "started",
                    Some(&format!("previous_version={}", previous_meta.version())),
                );
                current =
                    update_indices_for_policy(&current, previous_meta.policy(), updated, now, config);
            }
        }
        current
    }
}
