//! Basic Safety Message core data and the codec seam.
//!
//! Records are kept in physical units. Bit-level encoding belongs to a
//! [`BsmCodec`] implementation supplied from outside this crate.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::VehicleSettings,
    geometry::{PoseStamped, TwistStamped},
};

/// Largest message count before wrapping back to 1.
pub const MSG_COUNT_MAX: u8 = 127;
/// Seconds a temporary id may be reused.
pub const ID_ROTATION_SECS: i64 = 300;
/// Latitude reported when no fix is known (deg).
pub const LATITUDE_UNAVAILABLE: f64 = 90.000_000_1;
/// Longitude reported when no fix is known (deg).
pub const LONGITUDE_UNAVAILABLE: f64 = 180.000_000_1;
/// Elevation reported when no fix is known (m).
pub const ELEVATION_UNAVAILABLE: f64 = -409.6;
/// Lowest representable elevation (m).
pub const ELEVATION_MIN: f64 = -409.5;
/// Highest representable elevation (m).
pub const ELEVATION_MAX: f64 = 6143.9;
/// Largest representable speed (m/s).
pub const SPEED_MAX: f64 = 163.8;
/// Speed reported when no valid velocity is known (m/s).
pub const SPEED_UNAVAILABLE: f64 = 163.82;
/// Largest representable heading (deg).
pub const HEADING_MAX: f64 = 359.9875;
/// Heading reported when no valid orientation is known (deg).
pub const HEADING_UNAVAILABLE: f64 = 360.0;
/// Largest representable vehicle length (m).
pub const VEHICLE_LENGTH_MAX: f64 = 40.95;
/// Largest representable vehicle width (m).
pub const VEHICLE_WIDTH_MAX: f64 = 10.23;

/// Codec failures, passed through unchanged by the composer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BsmCodecError {
    /// Record could not be encoded.
    #[error("bsm encode failed: {0}")]
    Encode(String),
    /// Bytes could not be decoded.
    #[error("bsm decode failed: {0}")]
    Decode(String),
}

/// Converts core data to and from its wire form.
pub trait BsmCodec: Send + Sync {
    /// Encodes a record.
    fn encode(&self, record: &BsmCoreData) -> Result<Vec<u8>, BsmCodecError>;
    /// Decodes a record.
    fn decode(&self, bytes: &[u8]) -> Result<BsmCoreData, BsmCodecError>;
}

/// Geodetic position, when a fix is available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticFix {
    /// Latitude (deg).
    pub latitude: f64,
    /// Longitude (deg).
    pub longitude: f64,
    /// Elevation (m).
    pub elevation: f64,
}

/// Brake system status; only "unavailable" is ever reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrakeStatus {
    /// No brake data.
    #[default]
    Unavailable,
    /// Brakes applied.
    Applied,
    /// Brakes released.
    NotApplied,
}

/// Vehicle footprint (m); zero means unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct VehicleSize {
    /// Width.
    pub width: f64,
    /// Length.
    pub length: f64,
}

/// BSM part I.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BsmCoreData {
    /// Rolling counter in `1..=127`.
    pub msg_count: u8,
    /// Temporary id.
    pub id: [u8; 4],
    /// Millisecond within the current minute.
    pub sec_mark: u16,
    /// Latitude (deg).
    pub latitude: f64,
    /// Longitude (deg).
    pub longitude: f64,
    /// Elevation (m).
    pub elevation: f64,
    /// Ground speed (m/s).
    pub speed: f64,
    /// Compass heading (deg, clockwise from north).
    pub heading: f64,
    /// Brake status.
    pub brakes: BrakeStatus,
    /// Vehicle size.
    pub size: VehicleSize,
}

/// Builds successive core-data records, tracking count and id rotation.
#[derive(Debug)]
pub struct BsmComposer {
    vehicle: VehicleSettings,
    sent: u64,
    id: [u8; 4],
    id_changed_at: Option<DateTime<Utc>>,
    rng: SmallRng,
}

impl BsmComposer {
    /// Creates a composer seeded from the OS.
    #[must_use]
    pub fn new(vehicle: VehicleSettings) -> Self {
        Self::with_rng(vehicle, SmallRng::from_entropy())
    }

    /// Creates a composer with a fixed seed.
    #[must_use]
    pub fn seeded(vehicle: VehicleSettings, seed: u64) -> Self {
        Self::with_rng(vehicle, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(vehicle: VehicleSettings, rng: SmallRng) -> Self {
        Self {
            vehicle,
            sent: 0,
            id: [0; 4],
            id_changed_at: None,
            rng,
        }
    }

    /// Current temporary id.
    #[must_use]
    pub const fn current_id(&self) -> [u8; 4] {
        self.id
    }

    /// Composes the next record. A missing or out-of-range input is reported
    /// with its "unavailable" sentinel.
    pub fn compose(
        &mut self,
        now: DateTime<Utc>,
        pose: Option<&PoseStamped>,
        twist: Option<&TwistStamped>,
        fix: Option<GeodeticFix>,
    ) -> BsmCoreData {
        #[allow(clippy::cast_possible_truncation)]
        let msg_count = (self.sent % u64::from(MSG_COUNT_MAX)) as u8 + 1;
        self.sent = self.sent.wrapping_add(1);

        let rotate = !self
            .id_changed_at
            .is_some_and(|changed| now - changed < Duration::seconds(ID_ROTATION_SECS));
        if rotate {
            self.rng.fill_bytes(&mut self.id);
            self.id_changed_at = Some(now);
        }

        let latitude = fix
            .map(|fix| fix.latitude)
            .filter(|lat| (-90.0..=90.0).contains(lat))
            .unwrap_or(LATITUDE_UNAVAILABLE);
        let longitude = fix
            .map(|fix| fix.longitude)
            .filter(|lon| (-180.0..=180.0).contains(lon))
            .unwrap_or(LONGITUDE_UNAVAILABLE);
        let elevation = fix
            .map(|fix| fix.elevation)
            .filter(|elev| (ELEVATION_MIN..=ELEVATION_MAX).contains(elev))
            .unwrap_or(ELEVATION_UNAVAILABLE);
        let speed = twist
            .map(|twist| twist.twist.linear.x)
            .filter(|speed| (0.0..=SPEED_MAX).contains(speed))
            .unwrap_or(SPEED_UNAVAILABLE);
        let heading = pose
            .map(|pose| compass_heading(pose.pose.orientation.yaw()))
            .filter(|heading| (0.0..=HEADING_MAX).contains(heading))
            .unwrap_or(HEADING_UNAVAILABLE);

        BsmCoreData {
            msg_count,
            id: self.id,
            sec_mark: sec_mark(now),
            latitude,
            longitude,
            elevation,
            speed,
            heading,
            brakes: BrakeStatus::Unavailable,
            size: VehicleSize {
                width: in_range_or_zero(self.vehicle.width, VEHICLE_WIDTH_MAX),
                length: in_range_or_zero(self.vehicle.length, VEHICLE_LENGTH_MAX),
            },
        }
    }

    /// Composes the next record and encodes it.
    pub fn compose_and_encode(
        &mut self,
        codec: &dyn BsmCodec,
        now: DateTime<Utc>,
        pose: Option<&PoseStamped>,
        twist: Option<&TwistStamped>,
        fix: Option<GeodeticFix>,
    ) -> Result<Vec<u8>, BsmCodecError> {
        let record = self.compose(now, pose, twist, fix);
        codec.encode(&record)
    }
}

fn sec_mark(now: DateTime<Utc>) -> u16 {
    let millis = now.second() * 1000 + now.timestamp_subsec_millis().min(999);
    u16::try_from(millis).unwrap_or(u16::MAX)
}

/// Map yaw (rad, counter-clockwise from east) to compass degrees in `[0, HEADING_MAX]`.
fn compass_heading(yaw: f64) -> f64 {
    let heading = (90.0 - yaw.to_degrees()).rem_euclid(360.0);
    if heading > HEADING_MAX {
        0.0
    } else {
        heading
    }
}

fn in_range_or_zero(value: f64, max: f64) -> f64 {
    if (0.0..=max).contains(&value) {
        value
    } else {
        0.0
    }
}
