//! `v2x-types` – shared vocabulary of the V2X geometry workspace.
//!
//! - [`V2xError`]: the error taxonomy every crate returns.
//! - [`SensorId`]: numeric identifier of a LiDAR unit, used as the per-point
//!   provenance tag of fused clouds.
//! - Dataset records ([`CalibrationRecord`], [`EgoPoseRecord`],
//!   [`AnnotationRecord`], [`SampleDataRef`]) as handed out by a dataset
//!   provider.
//! - [`classes`]: the immutable detection-class registry.

pub mod classes;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use classes::{Category, ClassRegistry, DetectionClass, Rgb};

/// Identifier of a single sensor unit.
///
/// In V2X-Sim every agent carries one top LiDAR named `LIDAR_TOP_id_<n>`
/// (`n = 0` is the road-side unit); the numeric suffix is the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId(pub u32);

impl SensorId {
    /// Parse the trailing `_<n>` suffix of a channel name.
    ///
    /// ```
    /// use v2x_types::SensorId;
    /// assert_eq!(SensorId::from_channel("LIDAR_TOP_id_3"), Some(SensorId(3)));
    /// assert_eq!(SensorId::from_channel("LIDAR_TOP"), None);
    /// ```
    pub fn from_channel(channel: &str) -> Option<Self> {
        let (_, suffix) = channel.rsplit_once('_')?;
        suffix.parse().ok().map(Self)
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sensor#{}", self.0)
    }
}

/// Extrinsic calibration of a sensor: the pose of the sensor in its vehicle
/// frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub token: String,
    pub translation: [f64; 3],
    /// Unit quaternion, `(w, x, y, z)`.
    pub rotation: [f64; 4],
}

/// Pose of the ego vehicle in the global frame at a capture timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgoPoseRecord {
    pub token: String,
    /// Microseconds since epoch.
    pub timestamp: i64,
    pub translation: [f64; 3],
    /// Unit quaternion, `(w, x, y, z)`.
    pub rotation: [f64; 4],
}

/// A 3-D annotation, expressed in the global frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub token: String,
    /// General category string, e.g. `"vehicle.car"`.
    pub category_name: String,
    /// Box center.
    pub translation: [f64; 3],
    /// Width, length, height.
    pub size: [f64; 3],
    /// Unit quaternion, `(w, x, y, z)`.
    pub rotation: [f64; 4],
    /// LiDAR returns inside the box, one count per agent. A bare number is
    /// read as a single count.
    #[serde(default, deserialize_with = "counts_from_scalar_or_list")]
    pub num_lidar_pts: Vec<u32>,
}

impl AnnotationRecord {
    /// `w * l * h`.
    pub fn volume(&self) -> f64 {
        self.size.iter().product()
    }

    /// Highest per-agent return count, `0` when none is recorded.
    pub fn max_lidar_pts(&self) -> u32 {
        self.num_lidar_pts.iter().copied().max().unwrap_or(0)
    }
}

fn counts_from_scalar_or_list<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Counts {
        One(u32),
        PerAgent(Vec<u32>),
    }

    Ok(match Counts::deserialize(deserializer)? {
        Counts::One(n) => vec![n],
        Counts::PerAgent(v) => v,
    })
}

/// One entry of a sample's `data` table: channel name → sample-data token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleDataRef {
    pub channel: String,
    pub token: String,
}

/// Error taxonomy of the geometry core.
///
/// Every variant reflects bad input or a programming error; nothing here is
/// transient and nothing is retried.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum V2xError {
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape { expected: String, got: String },

    #[error("Invalid rotation: {0}")]
    InvalidRotation(String),

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown sensor: {0}")]
    UnknownSensor(SensorId),

    #[error("Missing {kind} record for token `{token}`")]
    MissingRecord { kind: String, token: String },

    #[error("Point {index} lies outside the point cloud range")]
    OutOfRange { index: usize },
}

impl V2xError {
    pub fn shape(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::InvalidShape {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(kind: impl Into<String>, token: impl Into<String>) -> Self {
        Self::MissingRecord {
            kind: kind.into(),
            token: token.into(),
        }
    }
}
