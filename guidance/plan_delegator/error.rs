//! Error taxonomy of the delegation engine.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while delegating maneuvers to planners.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DelegatorError {
    /// No plan has arrived yet, or the latest plan is empty.
    #[error("no valid maneuver plan")]
    InvalidPlan,
    /// A maneuver carries a tag outside the known set.
    #[error("unknown maneuver variant (type id {type_id})")]
    UnknownVariant {
        /// Raw type code.
        type_id: u8,
    },
    /// A recognized maneuver has an inverted window or extent.
    #[error("invalid maneuver: {reason}")]
    InvalidManeuver {
        /// Validation message.
        reason: String,
    },
    /// The maneuver window has already closed.
    #[error("maneuver expired")]
    ManeuverExpired,
    /// A connection to the planner could not be made.
    #[error("planner {planner} unavailable: {reason}")]
    PlannerUnavailable {
        /// Planner name.
        planner: String,
        /// Connector message.
        reason: String,
    },
    /// The planner call failed or returned a malformed segment.
    #[error("planner {planner} call failed: {reason}")]
    PlannerCallFailed {
        /// Planner name.
        planner: String,
        /// Failure description.
        reason: String,
    },
    /// The planner did not answer within the per-call timeout.
    #[error("planner {planner} timed out after {}ms", timeout.as_millis())]
    PlannerTimeout {
        /// Planner name.
        planner: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// Fewer than two points were assembled.
    #[error("degenerate trajectory with {points} point(s)")]
    DegenerateTrajectory {
        /// Points assembled.
        points: usize,
    },
    /// The trajectory could not be handed to the publisher.
    #[error("publish failed: {0}")]
    Publish(String),
}

impl DelegatorError {
    /// Short stable label used in reports and telemetry.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPlan => "invalid_plan",
            Self::UnknownVariant { .. } => "unknown_variant",
            Self::InvalidManeuver { .. } => "invalid_maneuver",
            Self::ManeuverExpired => "maneuver_expired",
            Self::PlannerUnavailable { .. } => "planner_unavailable",
            Self::PlannerCallFailed { .. } => "planner_call_failed",
            Self::PlannerTimeout { .. } => "planner_timeout",
            Self::DegenerateTrajectory { .. } => "degenerate_trajectory",
            Self::Publish(_) => "publish",
        }
    }

    /// Planner involved, for planner-side failures.
    #[must_use]
    pub fn planner(&self) -> Option<&str> {
        match self {
            Self::PlannerUnavailable { planner, .. }
            | Self::PlannerCallFailed { planner, .. }
            | Self::PlannerTimeout { planner, .. } => Some(planner),
            _ => None,
        }
    }

    /// True for failures that end dispatch of the current cycle.
    #[must_use]
    pub const fn stops_dispatch(&self) -> bool {
        matches!(
            self,
            Self::PlannerUnavailable { .. }
                | Self::PlannerCallFailed { .. }
                | Self::PlannerTimeout { .. }
        )
    }
}
