//! Sample-level LiDAR discovery and fusion.
//!
//! In V2X-Sim every agent carries a top LiDAR whose channel ends in the
//! agent id (`LIDAR_TOP_id_0` is the roadside unit, `LIDAR_TOP_id_1..` the
//! vehicles). Each capture has its own ego pose, so clouds are fused through
//! the global frame.

use tracing::info;
use v2x_perception::fusion::{FusedPointCloud, FusionOptions, SensorCloud, merge_point_clouds};
use v2x_types::{SampleDataRef, SensorId, V2xError};

use crate::frames::FrameResolver;
use crate::lidar::decode_lidar_points;
use crate::provider::DatasetProvider;

const LIDAR_CHANNEL: &str = "LIDAR_TOP";
const SEMANTIC_MARKER: &str = "SEM";

/// LiDAR captures of `sample`, excluding semantic LiDAR channels, in
/// provider order.
pub fn available_lidar_channels<P>(provider: &P, sample: &str) -> Result<Vec<SampleDataRef>, V2xError>
where
    P: DatasetProvider + ?Sized,
{
    Ok(provider
        .sample_data(sample)?
        .into_iter()
        .filter(|d| d.channel.contains(LIDAR_CHANNEL) && !d.channel.contains(SEMANTIC_MARKER))
        .collect())
}

/// Load every LiDAR of `sample` and fuse them into the frame of
/// `reference_channel`.
///
/// # Errors
///
/// - [`V2xError::InvalidParameter`] when a channel name carries no agent id.
/// - [`V2xError::UnknownSensor`] when `reference_channel` did not capture
///   this sample.
/// - [`V2xError::MissingRecord`] for unresolvable captures.
pub fn available_point_clouds<P>(
    provider: &P,
    sample: &str,
    reference_channel: &str,
    options: &FusionOptions,
) -> Result<FusedPointCloud, V2xError>
where
    P: DatasetProvider + ?Sized,
{
    let reference = sensor_of(reference_channel)?;
    let resolver = FrameResolver::new(provider);

    let clouds = available_lidar_channels(provider, sample)?
        .iter()
        .map(|d| {
            Ok(SensorCloud::new(
                sensor_of(&d.channel)?,
                decode_lidar_points(&provider.point_cloud_bytes(&d.token)?)?,
                resolver.global_from_sensor(&d.token)?,
            ))
        })
        .collect::<Result<Vec<_>, V2xError>>()?;

    let fused = merge_point_clouds(&clouds, reference, options)?;
    info!(
        sample,
        reference = reference_channel,
        sensors = clouds.len(),
        points = fused.len(),
        "sample fused"
    );
    Ok(fused)
}

fn sensor_of(channel: &str) -> Result<SensorId, V2xError> {
    SensorId::from_channel(channel)
        .ok_or_else(|| V2xError::parameter("channel", format!("`{channel}` does not end in an agent id")))
}
