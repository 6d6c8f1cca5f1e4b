//! Trajectory points, trajectory plans and segment stitching.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One planned sample of the vehicle path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    /// Time the vehicle should reach this sample.
    pub target_time: DateTime<Utc>,
    /// Map-frame x (m).
    pub x: f64,
    /// Map-frame y (m).
    pub y: f64,
    /// Heading (rad).
    #[serde(default)]
    pub yaw: f64,
    /// Target speed (m/s).
    #[serde(default)]
    pub speed: f64,
    /// Planner that produced the sample.
    #[serde(default)]
    pub planner_name: String,
}

impl TrajectoryPoint {
    /// Creates a point with zero yaw and speed.
    #[must_use]
    pub fn new(target_time: DateTime<Utc>, x: f64, y: f64) -> Self {
        Self {
            target_time,
            x,
            y,
            yaw: 0.0,
            speed: 0.0,
            planner_name: String::new(),
        }
    }

    /// Sets the target speed.
    #[must_use]
    pub const fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Tags the producing planner.
    #[must_use]
    pub fn with_planner(mut self, planner_name: impl Into<String>) -> Self {
        self.planner_name = planner_name.into();
        self
    }
}

/// Result of appending one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StitchSummary {
    /// Points added.
    pub appended: usize,
    /// Leading points dropped because they did not advance past the current end.
    pub dropped: usize,
}

/// Ordered trajectory samples plus a start time reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPlan {
    /// Identifier assigned when the plan was started.
    pub trajectory_id: String,
    /// Time reference the plan was anchored at.
    pub initial_time: DateTime<Utc>,
    /// Samples in time order.
    #[serde(default)]
    pub trajectory_points: Vec<TrajectoryPoint>,
}

impl TrajectoryPlan {
    /// Creates an empty plan anchored at `initial_time`.
    #[must_use]
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self::from_points(initial_time, Vec::new())
    }

    /// Creates a plan from existing samples.
    #[must_use]
    pub fn from_points(initial_time: DateTime<Utc>, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            trajectory_id: Uuid::new_v4().to_string(),
            initial_time,
            trajectory_points: points,
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trajectory_points.len()
    }

    /// Whether the plan holds no sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trajectory_points.is_empty()
    }

    /// First sample.
    #[must_use]
    pub fn first(&self) -> Option<&TrajectoryPoint> {
        self.trajectory_points.first()
    }

    /// Last sample.
    #[must_use]
    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.trajectory_points.last()
    }

    /// Time between the first and last sample; zero below two samples.
    #[must_use]
    pub fn span(&self) -> Duration {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.target_time - first.target_time,
            _ => Duration::zero(),
        }
    }

    /// True when sample times strictly increase.
    #[must_use]
    pub fn is_time_ordered(&self) -> bool {
        self.trajectory_points
            .windows(2)
            .all(|pair| pair[0].target_time < pair[1].target_time)
    }

    /// Appends a planner segment.
    ///
    /// Leading segment points at or before the current last sample are the
    /// planner echoing the shared boundary and are dropped, so time order holds.
    pub fn append_segment(
        &mut self,
        segment: impl IntoIterator<Item = TrajectoryPoint>,
    ) -> StitchSummary {
        let mut summary = StitchSummary::default();
        for point in segment {
            let advances = !self
                .last()
                .is_some_and(|last| point.target_time <= last.target_time);
            if advances {
                self.trajectory_points.push(point);
                summary.appended += 1;
            } else {
                summary.dropped += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn segment(range: std::ops::RangeInclusive<i64>) -> Vec<TrajectoryPoint> {
        range
            .map(|s| TrajectoryPoint::new(at(s), s as f64 * 10.0, 0.0).with_speed(10.0))
            .collect()
    }

    #[test]
    fn span_is_zero_for_short_plans() {
        let mut plan = TrajectoryPlan::new(at(0));
        assert_eq!(plan.span(), Duration::zero());
        plan.append_segment(segment(3..=3));
        assert_eq!(plan.span(), Duration::zero());
        plan.append_segment(segment(4..=7));
        assert_eq!(plan.span(), Duration::seconds(4));
    }

    #[test]
    fn stitching_drops_echoed_boundary() {
        let mut plan = TrajectoryPlan::new(at(0));
        let first = plan.append_segment(segment(0..=5));
        assert_eq!(first, StitchSummary { appended: 6, dropped: 0 });

        // Second planner starts at the previous end point.
        let second = plan.append_segment(segment(5..=12));
        assert_eq!(second, StitchSummary { appended: 7, dropped: 1 });
        assert_eq!(plan.len(), 13);
        assert!(plan.is_time_ordered());
        assert_eq!(plan.span(), Duration::seconds(12));
    }

    #[test]
    fn detects_unordered_points() {
        let plan = TrajectoryPlan::from_points(
            at(0),
            vec![
                TrajectoryPoint::new(at(2), 0.0, 0.0),
                TrajectoryPoint::new(at(1), 1.0, 0.0),
            ],
        );
        assert!(!plan.is_time_ordered());
    }
}
