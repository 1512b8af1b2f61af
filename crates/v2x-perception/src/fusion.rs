//! Multi-sensor point-cloud fusion.
//!
//! Brings the clouds of several independently posed LiDARs into the frame of
//! one *reference* sensor and concatenates them, remembering which sensor
//! produced every point.
//!
//! Each input carries `common_from_sensor`, the sensor's pose in a frame all
//! inputs share: the vehicle frame for the LiDARs of a single rig, the global
//! frame when fusing across V2X agents. A cloud is moved by
//!
//! ```text
//! reference_from_sensor = inverse(common_from_reference) ∘ common_from_sensor
//! ```
//!
//! # Example
//!
//! ```rust
//! use v2x_perception::fusion::{merge_point_clouds, FusionOptions, SensorCloud};
//! use v2x_perception::pointcloud::PointCloud;
//! use v2x_perception::transform::{make_transform, Quaternion, Transform};
//! use v2x_types::SensorId;
//!
//! let a = SensorCloud::new(
//!     SensorId(1),
//!     PointCloud::from_xyz(&[[5.0, 0.0, 0.0]]),
//!     Transform::identity(),
//! );
//! let b = SensorCloud::new(
//!     SensorId(2),
//!     PointCloud::from_xyz(&[[5.0, 0.0, 0.0]]),
//!     make_transform([10.0, 0.0, 0.0], Quaternion::identity()).unwrap(),
//! );
//!
//! let fused = merge_point_clouds(&[a, b], SensorId(1), &FusionOptions::unfiltered()).unwrap();
//! assert_eq!(fused.source_index(), &[SensorId(1), SensorId(2)]);
//! assert_eq!(fused.points().xyz(1), [15.0, 0.0, 0.0]);
//! ```

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::debug;
use v2x_types::{SensorId, V2xError};

use crate::pointcloud::PointCloud;
use crate::transform::{Transform, transform_in_place};

/// Planar radius below which returns are treated as hits on the sensor
/// housing or the carrying vehicle.
pub const DEFAULT_MIN_PLANAR_DISTANCE: f64 = 2.0;

// ────────────────────────────────────────────────────────────────────────────
// Input / output types
// ────────────────────────────────────────────────────────────────────────────

/// One sensor's cloud, in its own frame, plus its pose in the common frame.
#[derive(Debug, Clone)]
pub struct SensorCloud {
    pub sensor: SensorId,
    pub points: PointCloud,
    pub common_from_sensor: Transform,
}

impl SensorCloud {
    pub fn new(sensor: SensorId, points: PointCloud, common_from_sensor: Transform) -> Self {
        Self {
            sensor,
            points,
            common_from_sensor,
        }
    }
}

/// Options applied to every sensor before fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOptions {
    /// Drop points whose `(x, y)` distance to their sensor is not above this
    /// radius. `None` keeps everything.
    pub min_planar_distance: Option<f64>,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            min_planar_distance: Some(DEFAULT_MIN_PLANAR_DISTANCE),
        }
    }
}

impl FusionOptions {
    /// No pruning.
    pub fn unfiltered() -> Self {
        Self {
            min_planar_distance: None,
        }
    }
}

/// A fused cloud and the per-point source sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedPointCloud {
    points: PointCloud,
    source_index: Vec<SensorId>,
}

impl FusedPointCloud {
    /// # Errors
    ///
    /// [`V2xError::InvalidShape`] when the two arrays differ in length.
    pub fn new(points: PointCloud, source_index: Vec<SensorId>) -> Result<Self, V2xError> {
        if points.len() != source_index.len() {
            return Err(V2xError::shape(
                format!("{} source entries", points.len()),
                format!("{}", source_index.len()),
            ));
        }
        Ok(Self {
            points,
            source_index,
        })
    }

    pub fn points(&self) -> &PointCloud {
        &self.points
    }

    pub fn source_index(&self) -> &[SensorId] {
        &self.source_index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_parts(self) -> (PointCloud, Vec<SensorId>) {
        (self.points, self.source_index)
    }

    /// Distinct sensors, in order of first appearance.
    pub fn sensors(&self) -> Vec<SensorId> {
        let mut seen = HashSet::new();
        self.source_index
            .iter()
            .copied()
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// True for points produced by `sensor`.
    pub fn mask_for(&self, sensor: SensorId) -> Vec<bool> {
        self.source_index.iter().map(|s| *s == sensor).collect()
    }

    /// The sub-cloud produced by `sensor`.
    pub fn select_source(&self, sensor: SensorId) -> PointCloud {
        let mut src = self.source_index.iter();
        self.points
            .filter(|_| src.next().is_some_and(|s| *s == sensor))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operations
// ────────────────────────────────────────────────────────────────────────────

/// Drop points within `min_planar_distance` of the sensor on the xy-plane.
///
/// Must run on the cloud in its own sensor frame.
pub fn prune_near_sensor(points: &PointCloud, min_planar_distance: f64) -> PointCloud {
    points.filter(|r| r[0].hypot(r[1]) > min_planar_distance)
}

/// Fuse `clouds` into the frame of `reference`.
///
/// Output rows keep the input order: every sensor's block in slice order,
/// each block in its original point order. Zero inputs give an empty
/// `N × 3` result.
///
/// # Errors
///
/// - [`V2xError::UnknownSensor`] when `reference` is not among the inputs.
/// - [`V2xError::InvalidParameter`] when a sensor appears twice.
/// - [`V2xError::InvalidShape`] when the inputs disagree on columns per point.
pub fn merge_point_clouds(
    clouds: &[SensorCloud],
    reference: SensorId,
    options: &FusionOptions,
) -> Result<FusedPointCloud, V2xError> {
    let Some(first) = clouds.first() else {
        debug!("no sensors to fuse");
        return FusedPointCloud::new(PointCloud::empty(3)?, Vec::new());
    };

    let mut seen = HashSet::new();
    if let Some(dup) = clouds.iter().find(|c| !seen.insert(c.sensor)) {
        return Err(V2xError::parameter(
            "clouds",
            format!("{} listed more than once", dup.sensor),
        ));
    }
    let stride = first.points.stride();
    if let Some(bad) = clouds.iter().find(|c| c.points.stride() != stride) {
        return Err(V2xError::shape(
            format!("{stride} columns per point"),
            format!("{} columns from {}", bad.points.stride(), bad.sensor),
        ));
    }
    let reference_from_common = clouds
        .iter()
        .find(|c| c.sensor == reference)
        .map(|c| c.common_from_sensor.inverse())
        .ok_or(V2xError::UnknownSensor(reference))?;

    let blocks: Vec<PointCloud> = clouds
        .par_iter()
        .map(|c| {
            let mut pts = match options.min_planar_distance {
                Some(d) => prune_near_sensor(&c.points, d),
                None => c.points.clone(),
            };
            let reference_from_sensor = reference_from_common.compose(&c.common_from_sensor);
            transform_in_place(&reference_from_sensor, &mut pts);
            pts
        })
        .collect();

    let source_index: Vec<SensorId> = clouds
        .iter()
        .zip(&blocks)
        .flat_map(|(c, b)| std::iter::repeat_n(c.sensor, b.len()))
        .collect();
    for (c, b) in clouds.iter().zip(&blocks) {
        debug!(sensor = %c.sensor, raw = c.points.len(), kept = b.len(), "sensor cloud fused");
    }

    FusedPointCloud::new(PointCloud::concat(&blocks, stride)?, source_index)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
