//! Status-condition helpers built on
//! `k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition`, mirroring
//! the usual `SetStatusCondition`/`IsStatusConditionTrue` pair: upsert by
//! type, only bump `last_transition_time` when `status` itself changes.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// The three values a condition's `status` field may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds a `Condition`, stamping `last_transition_time` to now.
///
/// Callers pass this into [`set_condition`], which only actually bumps the
/// transition time when the condition's meaning changed.
pub fn new_condition(
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) -> Condition {
    Condition {
        type_: condition_type.to_string(),
        status: status.as_str().to_string(),
        reason: reason.to_string(),
        message: message.into(),
        observed_generation: None,
        last_transition_time: Time(Utc::now()),
    }
}

/// Finds the condition of the given type, if present.
pub fn get<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == condition_type)
}

/// Returns `true` iff the condition of the given type is present and `True`.
pub fn is_true(conditions: &[Condition], condition_type: &str) -> bool {
    get(conditions, condition_type).is_some_and(|c| c.status == "True")
}

/// Inserts or updates `new` in `conditions` by `type_`, matching
/// `meta.SetStatusCondition`: the transition time only changes when
/// `status` itself changes; a same-status update only refreshes
/// `reason`/`message` in place, leaving `last_transition_time` untouched.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status == new.status {
            existing.reason = new.reason;
            existing.message = new.message;
            existing.observed_generation = new.observed_generation;
        } else {
            *existing = new;
        }
    } else {
        conditions.push(new);
    }
}

/// Compares two condition lists ignoring `last_transition_time` — the
/// notion of "semantically different" that gates whether a status UPDATE
/// is worth issuing.
pub fn semantically_equal(a: &[Condition], b: &[Condition]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|ca| {
        b.iter().any(|cb| {
            ca.type_ == cb.type_
                && ca.status == cb.status
                && ca.reason == cb.reason
                && ca.message == cb.message
                && ca.observed_generation == cb.observed_generation
        })
    })
}
