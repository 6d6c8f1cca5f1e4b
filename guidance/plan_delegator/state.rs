//! Latest-value cache written by update handlers and read by the loop.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    geometry::{PoseStamped, TwistStamped},
    maneuver::ManeuverPlan,
};

/// Values captured at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    /// Latest maneuver plan, if one has arrived.
    pub plan: Option<Arc<ManeuverPlan>>,
    /// Latest pose, if one has arrived.
    pub pose: Option<PoseStamped>,
    /// Latest twist, if one has arrived.
    pub twist: Option<TwistStamped>,
}

impl StateSnapshot {
    /// Pose, or the zero pose when none has arrived.
    #[must_use]
    pub fn pose_or_default(&self) -> PoseStamped {
        self.pose.clone().unwrap_or_default()
    }

    /// Twist, or the zero twist when none has arrived.
    #[must_use]
    pub fn twist_or_default(&self) -> TwistStamped {
        self.twist.clone().unwrap_or_default()
    }
}

/// Per-field locked store; each update replaces its field wholesale.
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    plan: Arc<RwLock<Option<Arc<ManeuverPlan>>>>,
    pose: Arc<RwLock<Option<PoseStamped>>>,
    twist: Arc<RwLock<Option<TwistStamped>>>,
}

impl StateCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the maneuver plan.
    pub fn update_plan(&self, plan: ManeuverPlan) {
        *self.plan.write() = Some(Arc::new(plan));
    }

    /// Replaces the pose.
    pub fn update_pose(&self, pose: PoseStamped) {
        *self.pose.write() = Some(pose);
    }

    /// Replaces the twist.
    pub fn update_twist(&self, twist: TwistStamped) {
        *self.twist.write() = Some(twist);
    }

    /// Copies out the three fields. Fields are read one at a time.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            plan: self.plan.read().clone(),
            pose: self.pose.read().clone(),
            twist: self.twist.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Pose, Twist, Vector3};
    use chrono::Utc;

    #[test]
    fn last_write_wins() {
        let cache = StateCache::new();
        assert!(cache.snapshot().plan.is_none());

        cache.update_plan(ManeuverPlan::new(Vec::new()));
        let second = ManeuverPlan::new(Vec::new());
        let second_id = second.plan_id.clone();
        cache.update_plan(second);

        let twist = Twist {
            linear: Vector3 {
                x: 4.2,
                ..Vector3::default()
            },
            ..Twist::default()
        };
        cache.update_twist(TwistStamped::new(Utc::now(), twist));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.plan.unwrap().plan_id, second_id);
        assert!((snapshot.twist.unwrap().twist.linear.x - 4.2).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_pose_defaults_to_origin() {
        let cache = StateCache::new();
        cache.update_pose(PoseStamped::new(Utc::now(), Pose::default()));
        let snapshot = StateCache::new().snapshot();
        assert_eq!(snapshot.pose_or_default().pose, Pose::default());
        assert_eq!(snapshot.twist_or_default().twist, Twist::default());
        assert!(cache.snapshot().pose.is_some());
    }
}
