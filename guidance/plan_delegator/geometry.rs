//! Vehicle pose and velocity snapshots consumed by the delegator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cartesian position in the map frame (metres).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// East/forward component.
    pub x: f64,
    /// North/left component.
    pub y: f64,
    /// Up component.
    pub z: f64,
}

/// Orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
    /// Scalar component.
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Identity rotation.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }

    /// Rotation about the vertical axis only.
    #[must_use]
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    /// Heading around the vertical axis in radians, within (-pi, pi].
    #[must_use]
    pub fn yaw(&self) -> f64 {
        let siny_cosp = 2.0 * self.w.mul_add(self.z, self.x * self.y);
        let cosy_cosp = 2.0_f64.mul_add(-self.z.mul_add(self.z, self.y * self.y), 1.0);
        siny_cosp.atan2(cosy_cosp)
    }
}

/// Position plus orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position.
    pub position: Point,
    /// Orientation.
    pub orientation: Quaternion,
}

/// Pose with acquisition time and frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    /// Acquisition time.
    pub stamp: DateTime<Utc>,
    /// Reference frame, usually `map`.
    #[serde(default = "default_frame")]
    pub frame_id: String,
    /// Pose value.
    pub pose: Pose,
}

impl PoseStamped {
    /// Stamps a pose in the `map` frame.
    #[must_use]
    pub fn new(stamp: DateTime<Utc>, pose: Pose) -> Self {
        Self {
            stamp,
            frame_id: default_frame(),
            pose,
        }
    }
}

impl Default for PoseStamped {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default(), Pose::default())
    }
}

/// Three-component vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

/// Linear (m/s) and angular (rad/s) velocity in the vehicle frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    /// Linear velocity.
    pub linear: Vector3,
    /// Angular velocity.
    pub angular: Vector3,
}

/// Twist with acquisition time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistStamped {
    /// Acquisition time.
    pub stamp: DateTime<Utc>,
    /// Twist value.
    pub twist: Twist,
}

impl TwistStamped {
    /// Stamps a twist.
    #[must_use]
    pub const fn new(stamp: DateTime<Utc>, twist: Twist) -> Self {
        Self { stamp, twist }
    }
}

impl Default for TwistStamped {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default(), Twist::default())
    }
}

/// Planar vehicle state handed to planners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Global x position.
    pub x_pos_global: f64,
    /// Global y position.
    pub y_pos_global: f64,
    /// Heading in radians.
    pub orientation: f64,
    /// Forward speed in m/s.
    pub longitudinal_vel: f64,
}

impl VehicleState {
    /// Derives the planar state from the latest pose and twist.
    #[must_use]
    pub fn from_pose_twist(pose: &PoseStamped, twist: &TwistStamped) -> Self {
        Self {
            x_pos_global: pose.pose.position.x,
            y_pos_global: pose.pose.position.y,
            orientation: pose.pose.orientation.yaw(),
            longitudinal_vel: twist.twist.linear.x,
        }
    }
}

fn default_frame() -> String {
    "map".into()
}
