//! The condition type/reason taxonomy used across the reconcilers.
//!
//! Modeled as closed enums rather than bare strings so that a reconciler
//! matching on a `PodJobCompleted` reason cannot silently observe a reason
//! that belongs to a different condition type — a reason string minted for
//! one condition type can't be mistaken for another's at compile time.

/// Condition `type` values recognized on a `VirtualDC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    PodCreated,
    PodAvailable,
    ServiceCreated,
    PodJobCompleted,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::PodCreated => "PodCreated",
            ConditionType::PodAvailable => "PodAvailable",
            ConditionType::ServiceCreated => "ServiceCreated",
            ConditionType::PodJobCompleted => "PodJobCompleted",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons for `PodJobCompleted`, as translated by the `JobWatchProcess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCompletedReason {
    Ok,
    Failed,
    Pending,
    Running,
}

impl JobCompletedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            JobCompletedReason::Ok => "OK",
            JobCompletedReason::Failed => "Failed",
            JobCompletedReason::Pending => "Pending",
            JobCompletedReason::Running => "Running",
        }
    }
}

impl std::fmt::Display for JobCompletedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons for `PodCreated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodCreatedReason {
    Ok,
    Conflict,
    TemplateError,
    Failed,
}

impl PodCreatedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PodCreatedReason::Ok => "OK",
            PodCreatedReason::Conflict => "Conflict",
            PodCreatedReason::TemplateError => "TemplateError",
            PodCreatedReason::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PodCreatedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons for `PodAvailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodAvailableReason {
    Ok,
    NotAvailable,
    NotExists,
    NotScheduled,
}

impl PodAvailableReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PodAvailableReason::Ok => "OK",
            PodAvailableReason::NotAvailable => "NotAvailable",
            PodAvailableReason::NotExists => "NotExists",
            PodAvailableReason::NotScheduled => "NotScheduled",
        }
    }
}

impl std::fmt::Display for PodAvailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons for `ServiceCreated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCreatedReason {
    Ok,
    Conflict,
    Failed,
}

impl ServiceCreatedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCreatedReason::Ok => "OK",
            ServiceCreatedReason::Conflict => "Conflict",
            ServiceCreatedReason::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ServiceCreatedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
