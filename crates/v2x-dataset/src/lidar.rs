//! Raw LiDAR sweep decoding.
//!
//! Sweeps are stored as packed little-endian `f32` rows of five fields:
//! x, y, z, intensity, ring index. Only the first four are kept.

use tracing::debug;
use v2x_perception::fusion::prune_near_sensor;
use v2x_perception::pointcloud::PointCloud;
use v2x_types::V2xError;

use crate::provider::DatasetProvider;

/// Fields per stored point.
pub const RAW_FIELDS: usize = 5;

/// Columns of a decoded cloud: x, y, z, intensity.
pub const POINT_FEATURES: usize = 4;

const ROW_BYTES: usize = RAW_FIELDS * size_of::<f32>();

/// Decode a packed sweep into an `N × 4` cloud in the sensor frame.
///
/// # Errors
///
/// [`V2xError::InvalidShape`] when the byte length is not a whole number of
/// 20-byte rows.
pub fn decode_lidar_points(bytes: &[u8]) -> Result<PointCloud, V2xError> {
    if bytes.len() % ROW_BYTES != 0 {
        return Err(V2xError::shape(
            format!("a multiple of {ROW_BYTES} bytes"),
            format!("{} bytes", bytes.len()),
        ));
    }
    let mut data = Vec::with_capacity(bytes.len() / ROW_BYTES * POINT_FEATURES);
    for row in bytes.chunks_exact(ROW_BYTES) {
        for field in row.chunks_exact(size_of::<f32>()).take(POINT_FEATURES) {
            data.push(f64::from(f32::from_le_bytes([field[0], field[1], field[2], field[3]])));
        }
    }
    PointCloud::new(data, POINT_FEATURES)
}

/// Decode the sweep of capture `sensor` and drop points within
/// `min_planar_distance` of the sensor on the xy-plane.
pub fn load_point_cloud<P>(provider: &P, sensor: &str, min_planar_distance: f64) -> Result<PointCloud, V2xError>
where
    P: DatasetProvider + ?Sized,
{
    let raw = decode_lidar_points(&provider.point_cloud_bytes(sensor)?)?;
    let kept = prune_near_sensor(&raw, min_planar_distance);
    debug!(sensor, raw = raw.len(), kept = kept.len(), "point cloud loaded");
    Ok(kept)
}

/// Encode rows of x, y, z, intensity, ring the way sweeps are stored.
#[cfg(test)]
pub(crate) fn encode_rows(rows: &[[f32; RAW_FIELDS]]) -> Vec<u8> {
    rows.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
}
