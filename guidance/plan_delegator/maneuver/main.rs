//! Maneuver model: five typed driving maneuvers sharing a common field set.

/// Ordered maneuver sequences.
pub mod plan;
/// Serde form of a maneuver (numeric tag plus payload).
pub mod wire;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use plan::ManeuverPlan;

/// Errors raised by the maneuver model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ManeuverError {
    /// The maneuver tag matches none of the known variants.
    #[error("unknown maneuver variant (type id {type_id})")]
    UnknownVariant {
        /// Raw type code received.
        type_id: u8,
    },
    /// `end_time` does not follow `start_time`.
    #[error("maneuver window is empty: start {start} is not before end {end}")]
    InvalidWindow {
        /// Declared start.
        start: DateTime<Utc>,
        /// Declared end.
        end: DateTime<Utc>,
    },
    /// `end_dist` is behind `start_dist`.
    #[error("maneuver extent is negative: start {start_dist} m, end {end_dist} m")]
    InvalidExtent {
        /// Declared start distance.
        start_dist: f64,
        /// Declared end distance.
        end_dist: f64,
    },
}

/// The five maneuver kinds and their numeric type codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ManeuverType {
    /// Follow the current lane.
    LaneFollowing,
    /// Move to an adjacent lane.
    LaneChange,
    /// Cross an intersection without turning.
    IntersectionTransitStraight,
    /// Turn left through an intersection.
    IntersectionTransitLeftTurn,
    /// Turn right through an intersection.
    IntersectionTransitRightTurn,
}

impl ManeuverType {
    /// Every known kind, in type-code order.
    pub const ALL: [Self; 5] = [
        Self::LaneFollowing,
        Self::LaneChange,
        Self::IntersectionTransitStraight,
        Self::IntersectionTransitLeftTurn,
        Self::IntersectionTransitRightTurn,
    ];

    /// Numeric type code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::LaneFollowing => 0,
            Self::LaneChange => 1,
            Self::IntersectionTransitStraight => 2,
            Self::IntersectionTransitLeftTurn => 3,
            Self::IntersectionTransitRightTurn => 4,
        }
    }

    /// Resolves a numeric type code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::LaneFollowing),
            1 => Some(Self::LaneChange),
            2 => Some(Self::IntersectionTransitStraight),
            3 => Some(Self::IntersectionTransitLeftTurn),
            4 => Some(Self::IntersectionTransitRightTurn),
            _ => None,
        }
    }

    /// Snake-case label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LaneFollowing => "lane_following",
            Self::LaneChange => "lane_change",
            Self::IntersectionTransitStraight => "intersection_transit_straight",
            Self::IntersectionTransitLeftTurn => "intersection_transit_left_turn",
            Self::IntersectionTransitRightTurn => "intersection_transit_right_turn",
        }
    }
}

impl fmt::Display for ManeuverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields carried by every maneuver variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManeuverCommon {
    /// Planner that owns this maneuver.
    pub planner_name: String,
    /// Window start.
    pub start_time: DateTime<Utc>,
    /// Window end.
    pub end_time: DateTime<Utc>,
    /// Along-route start distance (m).
    pub start_dist: f64,
    /// Along-route end distance (m).
    pub end_dist: f64,
}

impl ManeuverCommon {
    /// Creates the common block.
    #[must_use]
    pub fn new(
        planner_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        start_dist: f64,
        end_dist: f64,
    ) -> Self {
        Self {
            planner_name: planner_name.into(),
            start_time,
            end_time,
            start_dist,
            end_dist,
        }
    }

    /// Length of the validity window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Checks `end_time > start_time` and `end_dist >= start_dist`.
    pub fn validate(&self) -> Result<(), ManeuverError> {
        if self.end_time <= self.start_time {
            return Err(ManeuverError::InvalidWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.end_dist < self.start_dist {
            return Err(ManeuverError::InvalidExtent {
                start_dist: self.start_dist,
                end_dist: self.end_dist,
            });
        }
        Ok(())
    }
}

/// Keep to the current lane between two speeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaneFollowingManeuver {
    /// Shared fields.
    #[serde(flatten)]
    pub common: ManeuverCommon,
    /// Speed at `start_dist` (m/s).
    pub start_speed: f64,
    /// Speed at `end_dist` (m/s).
    pub end_speed: f64,
    /// Lane being followed.
    pub lane_id: String,
}

/// Move from one lane to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaneChangeManeuver {
    /// Shared fields.
    #[serde(flatten)]
    pub common: ManeuverCommon,
    /// Speed at `start_dist` (m/s).
    pub start_speed: f64,
    /// Speed at `end_dist` (m/s).
    pub end_speed: f64,
    /// Lane left.
    pub starting_lane_id: String,
    /// Lane entered.
    pub ending_lane_id: String,
}

/// Pass through an intersection; used by the straight, left and right variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntersectionTransitManeuver {
    /// Shared fields.
    #[serde(flatten)]
    pub common: ManeuverCommon,
    /// Speed at `start_dist` (m/s).
    pub start_speed: f64,
    /// Speed at `end_dist` (m/s).
    pub end_speed: f64,
    /// Entry lane.
    pub starting_lane_id: String,
    /// Exit lane.
    pub ending_lane_id: String,
    /// Intersection being crossed.
    pub intersection_id: u32,
}

/// One discrete driving intention.
///
/// Maneuvers arriving from outside may carry a tag this build does not know;
/// those decode to [`Maneuver::Unrecognized`] so the rest of the plan stays usable.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(try_from = "wire::ManeuverWire")]
pub enum Maneuver {
    /// Left turn through an intersection.
    IntersectionTransitLeftTurn(IntersectionTransitManeuver),
    /// Right turn through an intersection.
    IntersectionTransitRightTurn(IntersectionTransitManeuver),
    /// Straight through an intersection.
    IntersectionTransitStraight(IntersectionTransitManeuver),
    /// Lane change.
    LaneChange(LaneChangeManeuver),
    /// Lane following.
    LaneFollowing(LaneFollowingManeuver),
    /// Tag outside the known set; payload kept verbatim.
    Unrecognized {
        /// Raw type code.
        type_id: u8,
        /// Raw payload.
        payload: serde_json::Value,
    },
}

/// Names of the fields shared by every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommonField {
    /// `planner_name`.
    PlannerName,
    /// `start_time`.
    StartTime,
    /// `end_time`.
    EndTime,
    /// `start_dist`.
    StartDist,
    /// `end_dist`.
    EndDist,
}

/// Value projected from a common field.
#[derive(Debug, Clone, PartialEq)]
pub enum CommonValue {
    /// Textual field.
    Text(String),
    /// Timestamp field.
    Time(DateTime<Utc>),
    /// Distance field (m).
    Distance(f64),
}

impl CommonValue {
    /// Text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Timestamp payload, if any.
    #[must_use]
    pub const fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(value) => Some(*value),
            _ => None,
        }
    }

    /// Distance payload, if any.
    #[must_use]
    pub const fn as_distance(&self) -> Option<f64> {
        match self {
            Self::Distance(value) => Some(*value),
            _ => None,
        }
    }
}

impl Maneuver {
    /// Known kind, or `None` for an unrecognized tag.
    #[must_use]
    pub const fn kind(&self) -> Option<ManeuverType> {
        match self {
            Self::IntersectionTransitLeftTurn(_) => Some(ManeuverType::IntersectionTransitLeftTurn),
            Self::IntersectionTransitRightTurn(_) => {
                Some(ManeuverType::IntersectionTransitRightTurn)
            }
            Self::IntersectionTransitStraight(_) => Some(ManeuverType::IntersectionTransitStraight),
            Self::LaneChange(_) => Some(ManeuverType::LaneChange),
            Self::LaneFollowing(_) => Some(ManeuverType::LaneFollowing),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Numeric type code, including unrecognized ones.
    #[must_use]
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Unrecognized { type_id, .. } => *type_id,
            _ => self.kind().map_or(u8::MAX, ManeuverType::code),
        }
    }

    /// Shared fields of whichever variant this is.
    pub fn common(&self) -> Result<&ManeuverCommon, ManeuverError> {
        match self {
            Self::IntersectionTransitLeftTurn(m)
            | Self::IntersectionTransitRightTurn(m)
            | Self::IntersectionTransitStraight(m) => Ok(&m.common),
            Self::LaneChange(m) => Ok(&m.common),
            Self::LaneFollowing(m) => Ok(&m.common),
            Self::Unrecognized { type_id, .. } => {
                Err(ManeuverError::UnknownVariant { type_id: *type_id })
            }
        }
    }

    /// Projects one shared field without the caller knowing the variant.
    pub fn field(&self, field: CommonField) -> Result<CommonValue, ManeuverError> {
        let common = self.common()?;
        Ok(match field {
            CommonField::PlannerName => CommonValue::Text(common.planner_name.clone()),
            CommonField::StartTime => CommonValue::Time(common.start_time),
            CommonField::EndTime => CommonValue::Time(common.end_time),
            CommonField::StartDist => CommonValue::Distance(common.start_dist),
            CommonField::EndDist => CommonValue::Distance(common.end_dist),
        })
    }

    /// Owning planner.
    pub fn planner_name(&self) -> Result<&str, ManeuverError> {
        self.common().map(|c| c.planner_name.as_str())
    }

    /// Window start.
    pub fn start_time(&self) -> Result<DateTime<Utc>, ManeuverError> {
        self.common().map(|c| c.start_time)
    }

    /// Window end.
    pub fn end_time(&self) -> Result<DateTime<Utc>, ManeuverError> {
        self.common().map(|c| c.end_time)
    }

    /// Checks the variant is known and its window and extent are well formed.
    pub fn validate(&self) -> Result<(), ManeuverError> {
        self.common()?.validate()
    }

    /// Label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        self.kind().map_or_else(
            || format!("unrecognized({})", self.type_id()),
            |kind| kind.label().to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn common(planner: &str) -> ManeuverCommon {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ManeuverCommon::new(planner, start, start + Duration::seconds(5), 10.0, 60.0)
    }

    fn transit(planner: &str) -> IntersectionTransitManeuver {
        IntersectionTransitManeuver {
            common: common(planner),
            start_speed: 5.0,
            end_speed: 7.0,
            starting_lane_id: "101".into(),
            ending_lane_id: "204".into(),
            intersection_id: 9,
        }
    }

    fn all_variants() -> Vec<Maneuver> {
        vec![
            Maneuver::IntersectionTransitLeftTurn(transit("left")),
            Maneuver::IntersectionTransitRightTurn(transit("right")),
            Maneuver::IntersectionTransitStraight(transit("straight")),
            Maneuver::LaneChange(LaneChangeManeuver {
                common: common("change"),
                start_speed: 10.0,
                end_speed: 10.0,
                starting_lane_id: "1".into(),
                ending_lane_id: "2".into(),
            }),
            Maneuver::LaneFollowing(LaneFollowingManeuver {
                common: common("follow"),
                start_speed: 10.0,
                end_speed: 12.0,
                lane_id: "1".into(),
            }),
        ]
    }

    #[test]
    fn common_fields_project_from_every_variant() {
        let expected = ["left", "right", "straight", "change", "follow"];
        for (maneuver, planner) in all_variants().iter().zip(expected) {
            let base = common(planner);
            assert_eq!(
                maneuver.field(CommonField::PlannerName).unwrap(),
                CommonValue::Text(planner.into())
            );
            assert_eq!(
                maneuver.field(CommonField::StartTime).unwrap().as_time(),
                Some(base.start_time)
            );
            assert_eq!(
                maneuver.field(CommonField::EndTime).unwrap().as_time(),
                Some(base.end_time)
            );
            assert_eq!(
                maneuver.field(CommonField::StartDist).unwrap().as_distance(),
                Some(10.0)
            );
            assert_eq!(
                maneuver.field(CommonField::EndDist).unwrap().as_distance(),
                Some(60.0)
            );
        }
    }

    #[test]
    fn type_codes_match_variants() {
        for (maneuver, kind) in all_variants().iter().zip([
            ManeuverType::IntersectionTransitLeftTurn,
            ManeuverType::IntersectionTransitRightTurn,
            ManeuverType::IntersectionTransitStraight,
            ManeuverType::LaneChange,
            ManeuverType::LaneFollowing,
        ]) {
            assert_eq!(maneuver.kind(), Some(kind));
            assert_eq!(ManeuverType::from_code(maneuver.type_id()), Some(kind));
        }
        assert_eq!(ManeuverType::from_code(42), None);
    }

    #[test]
    fn unrecognized_variant_is_a_recoverable_error() {
        let maneuver = Maneuver::Unrecognized {
            type_id: 17,
            payload: serde_json::Value::Null,
        };
        assert_eq!(
            maneuver.field(CommonField::PlannerName),
            Err(ManeuverError::UnknownVariant { type_id: 17 })
        );
        assert_eq!(maneuver.type_id(), 17);
        assert_eq!(maneuver.label(), "unrecognized(17)");
    }

    #[test]
    fn validate_rejects_inverted_window_and_extent() {
        let follow = |common: ManeuverCommon| {
            Maneuver::LaneFollowing(LaneFollowingManeuver {
                common,
                start_speed: 10.0,
                end_speed: 12.0,
                lane_id: "1".into(),
            })
        };
        assert!(follow(common("follow")).validate().is_ok());

        let mut window = common("follow");
        window.end_time = window.start_time;
        assert!(matches!(
            follow(window).validate(),
            Err(ManeuverError::InvalidWindow { .. })
        ));

        let mut extent = common("follow");
        extent.end_dist = extent.start_dist - 1.0;
        assert!(matches!(
            follow(extent).validate(),
            Err(ManeuverError::InvalidExtent { .. })
        ));
    }
}
