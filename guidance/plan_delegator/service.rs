//! Request/response contract of a trajectory-planner service.

use serde::{Deserialize, Serialize};

use crate::{
    geometry::{PoseStamped, TwistStamped, VehicleState},
    maneuver::Maneuver,
    trajectory::{TrajectoryPlan, TrajectoryPoint},
};

/// Asks one planner to extend a trajectory over one maneuver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanTrajectoryRequest {
    /// Maneuver to plan.
    pub maneuver: Maneuver,
    /// Trajectory accumulated so far in this cycle; empty for the first call.
    pub initial_trajectory_plan: TrajectoryPlan,
    /// Pose snapshot taken at cycle start.
    pub pose: PoseStamped,
    /// Twist snapshot taken at cycle start.
    pub twist: TwistStamped,
    /// Vehicle state derived from pose and twist.
    pub vehicle_state: VehicleState,
}

impl PlanTrajectoryRequest {
    /// Builds a request, deriving the vehicle state.
    #[must_use]
    pub fn new(
        maneuver: Maneuver,
        initial_trajectory_plan: TrajectoryPlan,
        pose: PoseStamped,
        twist: TwistStamped,
    ) -> Self {
        let vehicle_state = VehicleState::from_pose_twist(&pose, &twist);
        Self {
            maneuver,
            initial_trajectory_plan,
            pose,
            twist,
            vehicle_state,
        }
    }
}

/// Planner answer carrying the new segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanTrajectoryResponse {
    /// Segment planned for the requested maneuver.
    pub trajectory_plan: TrajectoryPlan,
}

impl PlanTrajectoryResponse {
    /// Wraps a segment.
    #[must_use]
    pub const fn new(trajectory_plan: TrajectoryPlan) -> Self {
        Self { trajectory_plan }
    }

    /// Segment points.
    #[must_use]
    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.trajectory_plan.trajectory_points
    }

    /// Moves the points out of the response.
    #[must_use]
    pub fn into_points(self) -> Vec<TrajectoryPoint> {
        self.trajectory_plan.trajectory_points
    }

    /// Why the segment cannot be appended, if it cannot.
    #[must_use]
    pub fn malformed_reason(&self) -> Option<&'static str> {
        if self.trajectory_plan.is_empty() {
            Some("empty trajectory segment")
        } else if !self.trajectory_plan.is_time_ordered() {
            Some("trajectory segment is not time ordered")
        } else {
            None
        }
    }
}
