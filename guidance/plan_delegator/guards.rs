//! Validity guards composed by the delegation loop at each decision point.

use chrono::{DateTime, Duration, Utc};

use crate::{
    maneuver::{ManeuverCommon, ManeuverPlan},
    trajectory::TrajectoryPlan,
};

/// Points needed before a trajectory can be traversed.
pub const MIN_TRAJECTORY_POINTS: usize = 2;

/// True when the maneuver window closed before `now`. The end instant itself is still live.
#[must_use]
pub fn is_maneuver_expired(maneuver: &ManeuverCommon, now: DateTime<Utc>) -> bool {
    maneuver.end_time < now
}

/// True when a plan is present and holds at least one maneuver.
#[must_use]
pub fn is_maneuver_plan_valid(plan: Option<&ManeuverPlan>) -> bool {
    plan.is_some_and(|plan| !plan.is_empty())
}

/// True when the trajectory holds at least [`MIN_TRAJECTORY_POINTS`] points.
#[must_use]
pub fn is_trajectory_valid(trajectory: &TrajectoryPlan) -> bool {
    trajectory.len() >= MIN_TRAJECTORY_POINTS
}

/// True when the trajectory spans at least `max_duration`.
#[must_use]
pub fn is_trajectory_long_enough(trajectory: &TrajectoryPlan, max_duration: Duration) -> bool {
    is_trajectory_valid(trajectory) && trajectory.span() >= max_duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectoryPoint;
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn window(end_secs: i64) -> ManeuverCommon {
        ManeuverCommon::new(
            "inlanecruising",
            origin(),
            origin() + Duration::seconds(end_secs),
            0.0,
            10.0,
        )
    }

    fn trajectory(seconds: &[i64]) -> TrajectoryPlan {
        TrajectoryPlan::from_points(
            origin(),
            seconds
                .iter()
                .map(|s| TrajectoryPoint::new(origin() + Duration::seconds(*s), 0.0, 0.0))
                .collect(),
        )
    }

    #[test]
    fn expiry_boundary_is_not_expired() {
        let maneuver = window(5);
        let end = origin() + Duration::seconds(5);
        assert!(!is_maneuver_expired(&maneuver, end - Duration::milliseconds(1)));
        assert!(!is_maneuver_expired(&maneuver, end));
        assert!(is_maneuver_expired(&maneuver, end + Duration::milliseconds(1)));
    }

    #[test]
    fn plan_validity_requires_a_maneuver() {
        assert!(!is_maneuver_plan_valid(None));
        assert!(!is_maneuver_plan_valid(Some(&ManeuverPlan::new(Vec::new()))));
    }

    #[test]
    fn trajectory_needs_two_points() {
        assert!(!is_trajectory_valid(&trajectory(&[])));
        assert!(!is_trajectory_valid(&trajectory(&[0])));
        assert!(is_trajectory_valid(&trajectory(&[0, 1])));
        assert!(is_trajectory_valid(&trajectory(&[0, 1, 2])));
    }

    #[test]
    fn long_enough_compares_span_inclusively() {
        let horizon = Duration::seconds(8);
        assert!(!is_trajectory_long_enough(&trajectory(&[0, 5]), horizon));
        assert!(is_trajectory_long_enough(&trajectory(&[0, 8]), horizon));
        assert!(is_trajectory_long_enough(&trajectory(&[0, 5, 12]), horizon));
        assert!(!is_trajectory_long_enough(&trajectory(&[3]), Duration::zero()));
    }
}
