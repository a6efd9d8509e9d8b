mod common;

use common::*;
use lifecycle_core::config::PolicyUpdateConfig;
use lifecycle_core::error::LifecycleError;
use lifecycle_core::phase_cache::*;
use lifecycle_core::policy::{
    FreezeAction, LifecycleAction, LifecyclePolicy, Phase, StepKey, TimeValue,
};
use lifecycle_core::transition::move_state_to_next_action_and_update_cached_phase;
use std::sync::Arc;

const CACHED_HOT_PHASE: &str = r#"{
    "policy" : "my-policy",
    "phase_definition" : {
      "min_age" : "20m",
      "actions" : {
        "rollover" : { "max_age" : "5s" },
        "set_priority" : { "priority" : 150 }
      }
    },
    "version" : 1,
    "modified_date_in_millis" : 1578521007076
  }"#;

fn current_policy() -> LifecyclePolicy {
    hot_policy("my-policy", vec![rollover(1), set_priority(100)])
}

#[test]
fn test_refresh_phase_json() {
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::new("hot", "rollover", "check-rollover-ready"))
                .phase_definition(CACHED_HOT_PHASE)
                .build(),
        )
        .build();
    let before = execution_state(&state, INDEX);

    let updated = policy_metadata(current_policy(), 2);
    let next = refresh_phase_definition(&state, INDEX, &updated).unwrap();
    let after = execution_state(&next, INDEX);

    assert_eq!(
        after.phase_definition(),
        Some(
            r#"{"policy":"my-policy","phase_definition":{"min_age":"0ms","actions":{"rollover":{"max_docs":1},"set_priority":{"priority":100}}},"version":2,"modified_date_in_millis":2}"#
        )
    );
    // Nothing but the cached phase changed
    assert_eq!(
        after.to_builder().clear_phase_definition().build(),
        before.to_builder().clear_phase_definition().build()
    );
}

#[test]
fn test_refresh_with_identical_definition_is_noop() {
    let updated = policy_metadata(current_policy(), 2);
    let cached = PhaseExecutionInfo::from_policy(&updated, "hot")
        .to_json()
        .unwrap();
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::phase_complete("hot"))
                .phase_definition(cached)
                .build(),
        )
        .build();

    let next = refresh_phase_definition(&state, INDEX, &updated).unwrap();
    assert!(Arc::ptr_eq(&next, &state));
}

#[test]
fn test_eligible_for_refresh() {
    let at = |key: StepKey, definition: Option<&str>| {
        let mut builder = state_at(&key);
        if let Some(definition) = definition {
            builder = builder.phase_definition(definition);
        }
        let state = TestClusterBuilder::new()
            .with_managed_index(INDEX, "my-policy", builder.build())
            .build();
        eligible_to_check_for_refresh(index_of(&state, INDEX))
    };

    assert!(!at(StepKey::new("hot", "rollover", "check-rollover-ready"), Some("{}")));
    assert!(at(StepKey::error_step("hot", "rollover"), Some("{}")));
    assert!(at(StepKey::phase_complete("hot"), Some("{}")));
    assert!(!at(StepKey::error_step("hot", "rollover"), None));
    assert!(!at(StepKey::phase_complete("hot"), None));
    // Nothing to refresh before the first real phase
    assert!(!at(StepKey::error_step("new", "init"), Some("{}")));
}

#[test]
fn test_move_state_to_next_action_when_current_action_removed() {
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::new("hot", "rollover", "check-rollover-ready"))
                .phase_definition(CACHED_HOT_PHASE)
                .build(),
        )
        .build();
    let meta = index_of(&state, INDEX);
    let current = meta.lifecycle_execution_state().unwrap();
    let updated = policy_metadata(hot_policy("my-policy", vec![set_priority(100)]), 2);

    let next = move_state_to_next_action_and_update_cached_phase(
        meta,
        &current,
        1_000,
        &current_policy(),
        &updated,
        &PolicyUpdateConfig::default(),
    )
    .unwrap();

    assert_eq!(next.current_step_key(), Some(StepKey::phase_complete("hot")));
    assert!(!next.phase_definition().unwrap().contains("rollover"));
    assert_eq!(next.action_time(), Some(1_000));
    assert_eq!(next.step_time(), Some(1_000));
    assert_eq!(next.phase_time(), Some(10));
}

#[test]
fn test_move_state_to_next_action_when_current_action_kept() {
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::new("hot", "rollover", "check-rollover-ready"))
                .phase_definition(CACHED_HOT_PHASE)
                .build(),
        )
        .build();
    let meta = index_of(&state, INDEX);
    let current = meta.lifecycle_execution_state().unwrap();
    let updated = policy_metadata(hot_policy("my-policy", vec![rollover(1)]), 2);

    let next = move_state_to_next_action_and_update_cached_phase(
        meta,
        &current,
        1_000,
        &current_policy(),
        &updated,
        &PolicyUpdateConfig::default(),
    )
    .unwrap();

    // Still moved on, never resumed mid-action
    assert_eq!(next.current_step_key(), Some(StepKey::phase_complete("hot")));
    let definition = next.phase_definition().unwrap();
    assert!(definition.contains("rollover"));
    assert!(!definition.contains("set_priority"));
}

#[test]
fn test_move_state_to_next_action_lands_on_following_action() {
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::new("hot", "set_priority", "set_priority")).build(),
        )
        .build();
    let meta = index_of(&state, INDEX);
    let current = meta.lifecycle_execution_state().unwrap();
    let updated = policy_metadata(current_policy(), 2);

    let next = move_state_to_next_action_and_update_cached_phase(
        meta,
        &current,
        5,
        &current_policy(),
        &updated,
        &PolicyUpdateConfig::default(),
    )
    .unwrap();
    assert_eq!(
        next.current_step_key(),
        Some(StepKey::new("hot", "rollover", "check-rollover-ready"))
    );
}

#[test]
fn test_move_state_for_step_unknown_to_previous_policy_is_unchanged() {
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::new("hot", "shrink", "shrink")).build(),
        )
        .build();
    let meta = index_of(&state, INDEX);
    let current = meta.lifecycle_execution_state().unwrap();

    let next = move_state_to_next_action_and_update_cached_phase(
        meta,
        &current,
        5,
        &current_policy(),
        &policy_metadata(current_policy(), 2),
        &PolicyUpdateConfig::default(),
    )
    .unwrap();
    assert_eq!(next, current);
}

#[test]
fn test_unsafe_action_is_not_skipped_when_configured() {
    let frozen = LifecyclePolicy::new(
        "my-policy",
        vec![Phase::new(
            "cold",
            TimeValue::ZERO,
            vec![LifecycleAction::Freeze(FreezeAction {})],
        )],
    );
    let state = TestClusterBuilder::new()
        .with_managed_index(
            INDEX,
            "my-policy",
            state_at(&StepKey::new("cold", "freeze", "freeze")).build(),
        )
        .build();
    let meta = index_of(&state, INDEX);
    let current = meta.lifecycle_execution_state().unwrap();
    let updated = policy_metadata(LifecyclePolicy::new("my-policy", vec![]), 2);

    let err = move_state_to_next_action_and_update_cached_phase(
        meta,
        &current,
        5,
        &frozen,
        &updated,
        &PolicyUpdateConfig {
            skip_forward_unsafe_actions: false,
        },
    )
    .unwrap_err();
    assert!(matches!(err, LifecycleError::UnsafeAction { ref action, .. } if action == "freeze"));

    // Default configuration skips forward
    let next = move_state_to_next_action_and_update_cached_phase(
        meta,
        &current,
        5,
        &frozen,
        &updated,
        &PolicyUpdateConfig::default(),
    )
    .unwrap();
    assert_eq!(next.current_step_key(), Some(StepKey::phase_complete("cold")));
    assert!(next.phase_definition().unwrap().contains("\"phase_definition\":null"));
}

#[test]
fn test_update_indices_for_policy() {
    let previous = policy_metadata(current_policy(), 1);
    let old_cache = PhaseExecutionInfo::from_policy(&previous, "hot")
        .to_json()
        .unwrap();
    let updated = policy_metadata(hot_policy("my-policy", vec![set_priority(50)]), 2);

    let state = TestClusterBuilder::new()
        .with_policy(updated.clone())
        // Resting on a step that survives the edit: refreshed in place
        .with_managed_index(
            "completed",
            "my-policy",
            state_at(&StepKey::phase_complete("hot"))
                .phase_definition(old_cache.as_str())
                .build(),
        )
        // Failed inside an action the edit removed: skipped forward
        .with_managed_index(
            "failed",
            "my-policy",
            state_at(&StepKey::error_step("hot", "rollover"))
                .failed_step("rollover")
                .step_info(r#"{"type":"exception","reason":"failed"}"#)
                .phase_definition(old_cache.as_str())
                .build(),
        )
        // Mid-step: left alone
        .with_managed_index(
            "running",
            "my-policy",
            state_at(&StepKey::new("hot", "rollover", "check-rollover-ready"))
                .phase_definition(old_cache.as_str())
                .build(),
        )
        .build();

    let next = update_indices_for_policy(
        &state,
        previous.policy(),
        &updated,
        99,
        &PolicyUpdateConfig::default(),
    );
    assert!(!Arc::ptr_eq(&next, &state));

    let completed = execution_state(&next, "completed");
    assert_eq!(completed.current_step_key(), Some(StepKey::phase_complete("hot")));
    assert_eq!(completed.step_time(), Some(30));
    assert!(completed.phase_definition().unwrap().contains("\"version\":2"));

    let failed = execution_state(&next, "failed");
    assert_eq!(failed.current_step_key(), Some(StepKey::phase_complete("hot")));
    assert_eq!(failed.failed_step(), None);
    assert_eq!(failed.step_info(), None);
    assert_eq!(failed.step_time(), Some(99));

    assert_eq!(
        execution_state(&next, "running"),
        execution_state(&state, "running")
    );

    // Second application finds nothing stale
    let again = update_indices_for_policy(
        &next,
        previous.policy(),
        &updated,
        100,
        &PolicyUpdateConfig::default(),
    );
    assert!(Arc::ptr_eq(&again, &next));
}
