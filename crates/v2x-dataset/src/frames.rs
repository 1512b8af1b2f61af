//! [`FrameResolver`] – capture-level frame transforms backed by a provider.

use v2x_perception::frames;
use v2x_perception::transform::Transform;
use v2x_types::V2xError;

use crate::provider::DatasetProvider;

/// Looks up the calibration and ego pose of a capture and turns them into
/// transforms.
///
/// Missing records surface as [`V2xError::MissingRecord`].
pub struct FrameResolver<'a, P: ?Sized> {
    provider: &'a P,
}

impl<'a, P: DatasetProvider + ?Sized> FrameResolver<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    pub fn vehicle_from_sensor(&self, sensor: &str) -> Result<Transform, V2xError> {
        frames::vehicle_from_sensor(&self.provider.calibration(sensor)?)
    }

    pub fn global_from_vehicle(&self, sensor: &str) -> Result<Transform, V2xError> {
        frames::global_from_vehicle(&self.provider.ego_pose(sensor)?)
    }

    /// Pose of the capturing sensor in the global frame, at capture time.
    pub fn global_from_sensor(&self, sensor: &str) -> Result<Transform, V2xError> {
        let calibration = self.provider.calibration(sensor)?;
        let ego_pose = self.provider.ego_pose(sensor)?;
        frames::global_from_sensor(&calibration, &ego_pose)
    }

    pub fn sensor_from_global(&self, sensor: &str) -> Result<Transform, V2xError> {
        Ok(self.global_from_sensor(sensor)?.inverse())
    }
}
