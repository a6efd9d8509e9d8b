#![allow(dead_code)]

use lifecycle_core::policy::StepKey;
use proptest::prelude::*;

/// Strategy for step name components
pub fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_-]{0,15}"
}

/// Strategy for arbitrary (non-error) step keys
pub fn step_key_strategy() -> impl Strategy<Value = StepKey> {
    (name_strategy(), name_strategy(), name_strategy())
        .prop_map(|(phase, action, name)| StepKey::new(phase, action, name))
}

/// Strategy for epoch-millis timestamps
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    0i64..4_102_444_800_000
}
