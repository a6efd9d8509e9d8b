use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lifecycle_core::cluster_state::{
    ClusterState, IndexLifecycleMetadata, IndexMetadata, Metadata, OperationMode,
};
use lifecycle_core::config::PolicyUpdateConfig;
use lifecycle_core::execution_state::LifecycleExecutionState;
use lifecycle_core::phase_cache::{update_indices_for_policy, PhaseExecutionInfo};
use lifecycle_core::policy::{LifecyclePolicy, LifecyclePolicyMetadata, StepKey};
use lifecycle_core::registry::PolicyStepsRegistry;
use lifecycle_core::transition::move_cluster_state_to_next_step;
use std::collections::BTreeMap;
use std::sync::Arc;

const POLICY_JSON: &str = r#"{"phases":{
    "hot":{"actions":{"rollover":{"max_docs":1000},"set_priority":{"priority":100}}},
    "warm":{"min_age":"1d","actions":{"forcemerge":{"max_num_segments":1},"set_priority":{"priority":50}}},
    "delete":{"min_age":"30d","actions":{"delete":{}}}
}}"#;

fn policy_metadata(version: i64, max_docs: u64) -> LifecyclePolicyMetadata {
    let json = POLICY_JSON.replace("1000", &max_docs.to_string());
    let policy = LifecyclePolicy::from_json("bench", &json).unwrap();
    LifecyclePolicyMetadata::new(policy, BTreeMap::new(), version, version)
}

fn cluster_with_indices(meta: &LifecyclePolicyMetadata, count: usize) -> Arc<ClusterState> {
    let cached = PhaseExecutionInfo::from_policy(meta, "hot").to_json().unwrap();
    let mut builder = Metadata::builder().lifecycle(IndexLifecycleMetadata::new(
        vec![meta.clone()],
        OperationMode::Running,
    ));
    for i in 0..count {
        let exec = LifecycleExecutionState::builder()
            .step_key(&StepKey::phase_complete("hot"))
            .phase_time(0)
            .action_time(0)
            .step_time(0)
            .phase_definition(cached.as_str())
            .build();
        builder = builder.put(
            IndexMetadata::builder(format!("logs-{i:06}"))
                .policy("bench")
                .lifecycle_state(&exec)
                .build(),
        );
    }
    ClusterState::new(builder.build())
}

fn benchmark_registry_compile(c: &mut Criterion) {
    let meta = policy_metadata(1, 1000);
    c.bench_function("registry_compile", |b| {
        b.iter(|| PolicyStepsRegistry::new(vec![black_box(meta.clone())]))
    });
}

fn benchmark_walk_policy(c: &mut Criterion) {
    let meta = policy_metadata(1, 1000);
    let registry = PolicyStepsRegistry::new(vec![meta.clone()]);
    let state = ClusterState::new(
        Metadata::builder()
            .put(
                IndexMetadata::builder("logs-000001")
                    .policy("bench")
                    .lifecycle_state(
                        &LifecycleExecutionState::builder()
                            .step_key(&StepKey::init())
                            .build(),
                    )
                    .build(),
            )
            .lifecycle(IndexLifecycleMetadata::new(vec![meta], OperationMode::Running))
            .build(),
    );

    c.bench_function("walk_policy_to_terminal", |b| {
        b.iter(|| {
            let mut current = Arc::clone(&state);
            loop {
                let next =
                    move_cluster_state_to_next_step("logs-000001", &current, 1, &registry).unwrap();
                if Arc::ptr_eq(&next, &current) {
                    break;
                }
                current = next;
            }
            black_box(current)
        })
    });
}

fn benchmark_policy_update(c: &mut Criterion) {
    let previous = policy_metadata(1, 1000);
    let updated = policy_metadata(2, 5000);
    let state = cluster_with_indices(&previous, 1_000);
    let config = PolicyUpdateConfig::default();

    c.bench_function("update_indices_for_policy_1000", |b| {
        b.iter(|| {
            update_indices_for_policy(
                black_box(&state),
                previous.policy(),
                &updated,
                1,
                &config,
            )
        })
    });
}

criterion_group!(
    benches,
    benchmark_registry_compile,
    benchmark_walk_policy,
    benchmark_policy_update
);
criterion_main!(benches);
