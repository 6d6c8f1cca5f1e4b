use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::DelegatorError;

/// Where the delegation loop is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelegatorState {
    /// Waiting for the next trigger.
    #[default]
    Idle,
    /// Reading the cached plan.
    AwaitingPlan,
    /// Calling planners.
    Dispatching,
    /// Checking the assembled trajectory.
    Finalizing,
    /// Trajectory handed to the publisher.
    Published,
}

impl fmt::Display for DelegatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingPlan => "awaiting_plan",
            Self::Dispatching => "dispatching",
            Self::Finalizing => "finalizing",
            Self::Published => "published",
        })
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A trajectory was published.
    Published,
    /// No valid plan was cached; nothing was attempted.
    NoPlan,
    /// Output was dropped (degenerate trajectory or publisher failure).
    Discarded(DelegatorError),
    /// Another cycle was still running.
    Overlapping,
}

impl CycleOutcome {
    /// Short stable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::NoPlan => "no_plan",
            Self::Discarded(_) => "discarded",
            Self::Overlapping => "overlapping",
        }
    }
}

/// Maneuver left out of the trajectory and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedManeuver {
    /// Position in the plan.
    pub index: usize,
    /// Maneuver label.
    pub maneuver: String,
    /// Reason it was skipped.
    pub reason: DelegatorError,
}

/// Segment contributed by one planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedManeuver {
    /// Position in the plan.
    pub index: usize,
    /// Planner that answered.
    pub planner: String,
    /// Points appended.
    pub appended: usize,
    /// Echoed boundary points dropped.
    pub dropped: usize,
}

/// Summary of one delegation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Cycle identifier.
    pub cycle_id: Uuid,
    /// Time the cycle was anchored at.
    pub started_at: DateTime<Utc>,
    /// How the cycle ended.
    pub outcome: CycleOutcome,
    /// Maneuvers that produced a segment.
    pub planned: Vec<PlannedManeuver>,
    /// Maneuvers that were skipped.
    pub skipped: Vec<SkippedManeuver>,
    /// Failure that ended the cycle early: no valid plan, or a planner failure
    /// that stopped dispatch.
    pub failure: Option<DelegatorError>,
    /// Whether the plan's maneuver windows were in time order.
    pub plan_ordered: bool,
    /// End of the plan's last recognized maneuver.
    pub plan_horizon_end: Option<DateTime<Utc>>,
    /// Whether dispatch stopped because the horizon was covered.
    pub horizon_reached: bool,
    /// Points in the assembled trajectory.
    pub points: usize,
    /// Time covered by the assembled trajectory.
    pub span: chrono::Duration,
    /// Wall time spent in the cycle.
    pub elapsed: Duration,
}

impl CycleReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            outcome: CycleOutcome::NoPlan,
            planned: Vec::new(),
            skipped: Vec::new(),
            failure: None,
            plan_ordered: true,
            plan_horizon_end: None,
            horizon_reached: false,
            points: 0,
            span: chrono::Duration::zero(),
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn overlapping(started_at: DateTime<Utc>) -> Self {
        Self {
            outcome: CycleOutcome::Overlapping,
            ..Self::new(started_at)
        }
    }

    /// True when a trajectory was published.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Published)
    }

    /// JSON form used for telemetry.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let discarded = match &self.outcome {
            CycleOutcome::Discarded(err) => Some(err.to_string()),
            _ => None,
        };
        json!({
            "cycle_id": self.cycle_id.to_string(),
            "started_at": self.started_at.to_rfc3339(),
            "outcome": self.outcome.label(),
            "discarded": discarded,
            "planned": self.planned.iter().map(|p| json!({
                "index": p.index,
                "planner": p.planner,
                "appended": p.appended,
                "dropped": p.dropped,
            })).collect::<Vec<_>>(),
            "skipped": self.skipped.iter().map(|s| json!({
                "index": s.index,
                "maneuver": s.maneuver,
                "reason": s.reason.kind(),
                "detail": s.reason.to_string(),
            })).collect::<Vec<_>>(),
            "failure": self.failure.as_ref().map(ToString::to_string),
            "plan_ordered": self.plan_ordered,
            "plan_horizon_end": self.plan_horizon_end.map(|end| end.to_rfc3339()),
            "horizon_reached": self.horizon_reached,
            "points": self.points,
            "span_ms": self.span.num_milliseconds(),
            "elapsed_ms": u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
