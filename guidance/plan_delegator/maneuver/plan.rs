use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Maneuver;

/// Ordered maneuvers; insertion order is execution order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManeuverPlan {
    /// Plan identifier assigned upstream.
    pub plan_id: String,
    /// When the upstream planner finished producing this plan.
    pub planning_completion_time: DateTime<Utc>,
    /// Maneuvers in execution order.
    #[serde(default)]
    pub maneuvers: Vec<Maneuver>,
}

impl ManeuverPlan {
    /// Creates a plan stamped now with a fresh id.
    #[must_use]
    pub fn new(maneuvers: Vec<Maneuver>) -> Self {
        Self {
            plan_id: Uuid::new_v4().to_string(),
            planning_completion_time: Utc::now(),
            maneuvers,
        }
    }

    /// Appends a maneuver.
    #[must_use]
    pub fn with_maneuver(mut self, maneuver: Maneuver) -> Self {
        self.maneuvers.push(maneuver);
        self
    }

    /// Number of maneuvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maneuvers.len()
    }

    /// Whether the plan holds no maneuver.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maneuvers.is_empty()
    }

    /// Iterates maneuvers in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, Maneuver> {
        self.maneuvers.iter()
    }

    /// True when each maneuver starts no earlier than the previous one ends.
    /// Unrecognized maneuvers carry no window and are ignored.
    #[must_use]
    pub fn is_temporally_ordered(&self) -> bool {
        let mut previous_end: Option<DateTime<Utc>> = None;
        for common in self.maneuvers.iter().filter_map(|m| m.common().ok()) {
            if previous_end.is_some_and(|end| common.start_time < end) {
                return false;
            }
            previous_end = Some(common.end_time);
        }
        true
    }

    /// End of the last recognized maneuver.
    #[must_use]
    pub fn horizon_end(&self) -> Option<DateTime<Utc>> {
        self.maneuvers
            .iter()
            .rev()
            .find_map(|m| m.end_time().ok())
    }
}

impl<'a> IntoIterator for &'a ManeuverPlan {
    type Item = &'a Maneuver;
    type IntoIter = std::slice::Iter<'a, Maneuver>;

    fn into_iter(self) -> Self::IntoIter {
        self.maneuvers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maneuver::{LaneFollowingManeuver, ManeuverCommon};
    use chrono::{Duration, TimeZone};

    fn follow(start_secs: i64, end_secs: i64) -> Maneuver {
        let origin = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Maneuver::LaneFollowing(LaneFollowingManeuver {
            common: ManeuverCommon::new(
                "inlanecruising",
                origin + Duration::seconds(start_secs),
                origin + Duration::seconds(end_secs),
                0.0,
                50.0,
            ),
            start_speed: 10.0,
            end_speed: 10.0,
            lane_id: "1".into(),
        })
    }

    #[test]
    fn detects_overlapping_windows() {
        let ordered = ManeuverPlan::new(vec![follow(0, 5), follow(5, 12), follow(14, 20)]);
        assert!(ordered.is_temporally_ordered());

        let overlapping = ManeuverPlan::new(vec![follow(0, 5), follow(4, 12)]);
        assert!(!overlapping.is_temporally_ordered());
    }

    #[test]
    fn horizon_skips_unrecognized_tail() {
        let plan = ManeuverPlan::new(vec![follow(0, 5)]).with_maneuver(Maneuver::Unrecognized {
            type_id: 12,
            payload: serde_json::Value::Null,
        });
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.horizon_end(), plan.maneuvers[0].end_time().ok());
    }
}
