use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::{
    IntersectionTransitManeuver, LaneChangeManeuver, LaneFollowingManeuver, Maneuver,
    ManeuverType,
};

/// Serialized maneuver: numeric `type` tag plus the variant payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManeuverWire {
    /// Numeric type code.
    #[serde(rename = "type")]
    pub type_id: u8,
    /// Variant payload.
    #[serde(default)]
    pub payload: Value,
}

impl TryFrom<ManeuverWire> for Maneuver {
    type Error = serde_json::Error;

    fn try_from(wire: ManeuverWire) -> Result<Self, Self::Error> {
        let Some(kind) = ManeuverType::from_code(wire.type_id) else {
            return Ok(Self::Unrecognized {
                type_id: wire.type_id,
                payload: wire.payload,
            });
        };
        let payload = wire.payload;
        Ok(match kind {
            ManeuverType::LaneFollowing => Self::LaneFollowing(serde_json::from_value(payload)?),
            ManeuverType::LaneChange => Self::LaneChange(serde_json::from_value(payload)?),
            ManeuverType::IntersectionTransitStraight => {
                Self::IntersectionTransitStraight(serde_json::from_value(payload)?)
            }
            ManeuverType::IntersectionTransitLeftTurn => {
                Self::IntersectionTransitLeftTurn(serde_json::from_value(payload)?)
            }
            ManeuverType::IntersectionTransitRightTurn => {
                Self::IntersectionTransitRightTurn(serde_json::from_value(payload)?)
            }
        })
    }
}

/// Borrowed encoding view; variant payloads serialize straight into the output.
#[derive(Serialize)]
struct ManeuverWireRef<'a> {
    #[serde(rename = "type")]
    type_id: u8,
    payload: PayloadRef<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PayloadRef<'a> {
    Transit(&'a IntersectionTransitManeuver),
    LaneChange(&'a LaneChangeManeuver),
    LaneFollowing(&'a LaneFollowingManeuver),
    Raw(&'a Value),
}

impl Serialize for Maneuver {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = match self {
            Self::IntersectionTransitLeftTurn(m)
            | Self::IntersectionTransitRightTurn(m)
            | Self::IntersectionTransitStraight(m) => PayloadRef::Transit(m),
            Self::LaneChange(m) => PayloadRef::LaneChange(m),
            Self::LaneFollowing(m) => PayloadRef::LaneFollowing(m),
            Self::Unrecognized { payload, .. } => PayloadRef::Raw(payload),
        };
        ManeuverWireRef {
            type_id: self.type_id(),
            payload,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_tag_into_variant() {
        let raw = json!({
            "type": 1,
            "payload": {
                "planner_name": "cooperative_lanechange",
                "start_time": "2024-05-01T12:00:00Z",
                "end_time": "2024-05-01T12:00:06Z",
                "start_dist": 0.0,
                "end_dist": 80.0,
                "start_speed": 11.0,
                "end_speed": 11.0,
                "starting_lane_id": "3",
                "ending_lane_id": "4"
            }
        });
        let maneuver: Maneuver = serde_json::from_value(raw).unwrap();
        assert_eq!(maneuver.kind(), Some(ManeuverType::LaneChange));
        assert_eq!(maneuver.planner_name().unwrap(), "cooperative_lanechange");

        let encoded = serde_json::to_value(&maneuver).unwrap();
        assert_eq!(encoded["type"], 1);
        assert_eq!(encoded["payload"]["ending_lane_id"], "4");
    }

    #[test]
    fn keeps_unknown_tag_instead_of_failing() {
        let raw = json!({ "type": 9, "payload": { "planner_name": "future" } });
        let maneuver: Maneuver = serde_json::from_value(raw).unwrap();
        assert_eq!(maneuver.kind(), None);
        assert_eq!(maneuver.type_id(), 9);
        let encoded = serde_json::to_value(&maneuver).unwrap();
        assert_eq!(encoded["payload"]["planner_name"], "future");
    }

    #[test]
    fn payload_encodes_directly_from_the_variant() {
        let raw = json!({
            "type": 4,
            "payload": {
                "planner_name": "stop_and_wait",
                "start_time": "2024-05-01T12:00:00Z",
                "end_time": "2024-05-01T12:00:04Z",
                "start_dist": 10.0,
                "end_dist": 30.0,
                "start_speed": 5.0,
                "end_speed": 0.0,
                "starting_lane_id": "7",
                "ending_lane_id": "8",
                "intersection_id": 12
            }
        });
        let maneuver: Maneuver = serde_json::from_value(raw.clone()).unwrap();
        let Maneuver::IntersectionTransitRightTurn(inner) = &maneuver else {
            panic!("expected a right turn, got {}", maneuver.label());
        };

        let encoded = serde_json::to_value(&maneuver).unwrap();
        assert_eq!(encoded["payload"], serde_json::to_value(inner).unwrap());
        assert_eq!(encoded, raw);
    }

    #[test]
    fn malformed_known_payload_is_rejected() {
        let raw = json!({ "type": 0, "payload": { "planner_name": "inlanecruising" } });
        assert!(serde_json::from_value::<Maneuver>(raw).is_err());
    }
}
