//! Sensor / vehicle / global frame composition from dataset records.
//!
//! ```text
//!   sensor ──vehicle_from_sensor──▶ vehicle ──global_from_vehicle──▶ global
//! ```
//!
//! The calibration record places a sensor on its vehicle; the ego-pose record
//! captured with the sweep places the vehicle in the world.

use v2x_types::{CalibrationRecord, EgoPoseRecord, V2xError};

use crate::transform::{Quaternion, Transform, make_transform};

/// Maps sensor-frame points into the vehicle frame.
pub fn vehicle_from_sensor(calibration: &CalibrationRecord) -> Result<Transform, V2xError> {
    make_transform(calibration.translation, Quaternion::from_array(calibration.rotation))
}

/// Maps vehicle-frame points into the global frame.
pub fn global_from_vehicle(ego_pose: &EgoPoseRecord) -> Result<Transform, V2xError> {
    make_transform(ego_pose.translation, Quaternion::from_array(ego_pose.rotation))
}

/// `global_from_vehicle ∘ vehicle_from_sensor`.
pub fn global_from_sensor(
    calibration: &CalibrationRecord,
    ego_pose: &EgoPoseRecord,
) -> Result<Transform, V2xError> {
    Ok(global_from_vehicle(ego_pose)?.compose(&vehicle_from_sensor(calibration)?))
}

/// Inverse of [`global_from_sensor`], computed in closed form.
pub fn sensor_from_global(
    calibration: &CalibrationRecord,
    ego_pose: &EgoPoseRecord,
) -> Result<Transform, V2xError> {
    Ok(global_from_sensor(calibration, ego_pose)?.inverse())
}
