//! Status types shared by every kf resource

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type that marks a resource as usable by dependents
pub const READY_CONDITION: &str = "Ready";

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    #[serde(default)]
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Create a condition with the given type and status
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: None,
        }
    }

    /// Shorthand for a `Ready=True` condition
    pub fn ready() -> Self {
        Self::new(READY_CONDITION, ConditionStatus::True)
    }
}

/// Resources whose readiness is reported through a `Ready` condition.
///
/// This is the readiness signal the test harness polls for after creating a
/// resource: the controller owning the kind flips `Ready` to `True` once the
/// object is consistent enough for dependents to act on it.
pub trait ReadyCondition {
    /// Current conditions, empty when the resource has no status yet
    fn conditions(&self) -> &[Condition];

    /// Returns the `Ready` condition if the controller has reported one
    fn ready_condition(&self) -> Option<&Condition> {
        self.conditions()
            .iter()
            .find(|c| c.type_ == READY_CONDITION)
    }

    /// Returns true when `Ready` is `True`
    fn is_ready(&self) -> bool {
        self.ready_condition()
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}
