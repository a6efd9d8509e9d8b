//! Concrete lifecycle actions and their compilation into steps.
//!
//! Inside a phase document each action appears as `"<name>": {<config>}`; the
//! enum therefore serializes as its bare configuration and is rebuilt from a
//! `(name, config)` pair.

use super::step::{Step, StepKey, StepKind};
use super::time_value::TimeValue;
use crate::constants::settings::LIFECYCLE_INDEXING_COMPLETE;
use crate::error::{invalid_policy, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloverAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_docs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPriorityAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocateAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub include: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exclude: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadOnlyAction {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShrinkAction {
    pub number_of_shards: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForceMergeAction {
    pub max_num_segments: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreezeAction {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForSnapshotAction {
    pub policy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteAction {}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleAction {
    Rollover(RolloverAction),
    SetPriority(SetPriorityAction),
    Allocate(AllocateAction),
    ReadOnly(ReadOnlyAction),
    Shrink(ShrinkAction),
    ForceMerge(ForceMergeAction),
    Freeze(FreezeAction),
    WaitForSnapshot(WaitForSnapshotAction),
    Delete(DeleteAction),
}

impl LifecycleAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rollover(_) => "rollover",
            Self::SetPriority(_) => "set_priority",
            Self::Allocate(_) => "allocate",
            Self::ReadOnly(_) => "readonly",
            Self::Shrink(_) => "shrink",
            Self::ForceMerge(_) => "forcemerge",
            Self::Freeze(_) => "freeze",
            Self::WaitForSnapshot(_) => "wait_for_snapshot",
            Self::Delete(_) => "delete",
        }
    }

    /// Whether an index may be moved past this action when it disappears from
    /// a running policy. Actions that leave intermediate artifacts behind
    /// (a half-built shrunken copy, a partially frozen index) are unsafe.
    pub fn is_safe_action(&self) -> bool {
        !matches!(self, Self::Shrink(_) | Self::Freeze(_))
    }

    /// Rebuild an action from its name and configuration document
    pub fn from_config(name: &str, config: Value) -> Result<Self> {
        let action = match name {
            "rollover" => Self::Rollover(serde_json::from_value(config)?),
            "set_priority" => Self::SetPriority(serde_json::from_value(config)?),
            "allocate" => Self::Allocate(serde_json::from_value(config)?),
            "readonly" => Self::ReadOnly(serde_json::from_value(config)?),
            "shrink" => Self::Shrink(serde_json::from_value(config)?),
            "forcemerge" => Self::ForceMerge(serde_json::from_value(config)?),
            "freeze" => Self::Freeze(serde_json::from_value(config)?),
            "wait_for_snapshot" => Self::WaitForSnapshot(serde_json::from_value(config)?),
            "delete" => Self::Delete(serde_json::from_value(config)?),
            other => {
                return Err(invalid_policy(
                    "",
                    format!("unknown lifecycle action [{other}]"),
                ))
            }
        };
        Ok(action)
    }

    /// Compile into steps under `phase`, the last step pointing at `next_key`
    pub fn to_steps(&self, phase: &str, next_key: &StepKey) -> Vec<Step> {
        let steps: Vec<(&'static str, StepKind)> = match self {
            Self::Rollover(config) => vec![
                ("check-rollover-ready", wait(json!(config), true)),
                ("rollover", action(json!({}), true)),
                ("wait-for-active-shards", wait(json!({}), true)),
                ("update-rollover-lifecycle-date", cluster(json!({}))),
                (
                    "set-indexing-complete",
                    cluster(json!({ LIFECYCLE_INDEXING_COMPLETE: "true" })),
                ),
            ],
            Self::SetPriority(config) => vec![(
                "set_priority",
                cluster(json!({ "index.priority": config.priority })),
            )],
            Self::Allocate(config) => vec![
                ("allocate", action(json!(config), true)),
                ("check-allocation", wait(json!(config), true)),
            ],
            Self::ReadOnly(_) => vec![(
                "readonly",
                action(json!({ "index.blocks.write": true }), true),
            )],
            Self::Shrink(config) => vec![
                ("set-single-node-allocation", action(json!({}), true)),
                ("check-shrink-allocation", wait(json!({}), true)),
                ("shrink", action(json!(config), false)),
                ("shrunk-shards-allocated", wait(json!(config), true)),
                ("swap-aliases", action(json!({}), false)),
            ],
            Self::ForceMerge(config) => vec![
                ("forcemerge", action(json!(config), true)),
                ("segment-count", wait(json!(config), true)),
            ],
            Self::Freeze(_) => vec![("freeze", action(json!({}), false))],
            Self::WaitForSnapshot(config) => {
                vec![("wait-for-snapshot", wait(json!(config), true))]
            }
            Self::Delete(_) => vec![("delete", action(json!({}), true))],
        };
        chain_steps(phase, self.name(), steps, next_key)
    }
}

impl Serialize for LifecycleAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Rollover(config) => config.serialize(serializer),
            Self::SetPriority(config) => config.serialize(serializer),
            Self::Allocate(config) => config.serialize(serializer),
            Self::ReadOnly(config) => config.serialize(serializer),
            Self::Shrink(config) => config.serialize(serializer),
            Self::ForceMerge(config) => config.serialize(serializer),
            Self::Freeze(config) => config.serialize(serializer),
            Self::WaitForSnapshot(config) => config.serialize(serializer),
            Self::Delete(config) => config.serialize(serializer),
        }
    }
}

fn cluster(params: Value) -> StepKind {
    StepKind::ClusterStateAction { params }
}

fn wait(params: Value, retryable: bool) -> StepKind {
    StepKind::AsyncWait { params, retryable }
}

fn action(params: Value, retryable: bool) -> StepKind {
    StepKind::AsyncAction { params, retryable }
}

fn chain_steps(
    phase: &str,
    action: &str,
    steps: Vec<(&'static str, StepKind)>,
    next_key: &StepKey,
) -> Vec<Step> {
    let keys: Vec<StepKey> = steps
        .iter()
        .map(|(name, _)| StepKey::new(phase, action, *name))
        .collect();

    steps
        .into_iter()
        .enumerate()
        .map(|(i, (_, kind))| {
            let next = keys.get(i + 1).unwrap_or(next_key).clone();
            Step::new(keys[i].clone(), Some(next), kind)
        })
        .collect()
}

/// Serde adapter for a phase's `name → action` map
pub(crate) mod action_map {
    use super::LifecycleAction;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        actions: &BTreeMap<String, LifecycleAction>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        actions.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, LifecycleAction>, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(name, config)| {
                LifecycleAction::from_config(&name, config)
                    .map(|action| (name, action))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}
