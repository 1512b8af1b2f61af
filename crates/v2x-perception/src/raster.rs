//! Range filtering and projections.
//!
//! - Orthogonal (bird's-eye-view) projection of points onto a square-pixel
//!   grid covering a [`PointCloudRange`], plus occupancy and mean-feature
//!   rasters built from it.
//! - Perspective projection of camera-frame points through a pinhole
//!   intrinsic matrix.
//!
//! # Example
//!
//! ```rust
//! use v2x_perception::pointcloud::PointCloud;
//! use v2x_perception::raster::{filter_points_in_range, orthogonal_projection, PointCloudRange};
//!
//! let range = PointCloudRange::new([0.0, 0.0, -5.0], [10.0, 10.0, 5.0]).unwrap();
//! let cloud = PointCloud::from_xyz(&[[0.5, 0.5, 0.0], [0.9, 0.9, 0.0], [1.5, 0.5, 0.0], [20.0, 0.0, 0.0]]);
//!
//! let inside = filter_points_in_range(&cloud, &range);
//! let proj = orthogonal_projection(&inside, &range, 1.0).unwrap();
//! assert_eq!(proj.pixels(), &[[0, 0], [1, 0]]);
//! assert_eq!(proj.point_to_pixel(), &[0, 0, 1]);
//! ```

use std::collections::HashMap;

use tracing::debug;
use v2x_types::V2xError;

use crate::pointcloud::PointCloud;
use crate::transform::{Mat3, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// PointCloudRange
// ────────────────────────────────────────────────────────────────────────────

/// Inclusive 3-D bounds `[x_min, y_min, z_min] .. [x_max, y_max, z_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCloudRange {
    min: Vec3,
    max: Vec3,
}

impl PointCloudRange {
    /// # Errors
    ///
    /// [`V2xError::InvalidParameter`] when a bound is not finite or
    /// `min > max` on some axis.
    pub fn new(min: Vec3, max: Vec3) -> Result<Self, V2xError> {
        if min.iter().chain(&max).any(|v| !v.is_finite()) {
            return Err(V2xError::parameter("point_cloud_range", "bounds must be finite"));
        }
        if (0..3).any(|k| min[k] > max[k]) {
            return Err(V2xError::parameter(
                "point_cloud_range",
                format!("min {min:?} exceeds max {max:?}"),
            ));
        }
        Ok(Self { min, max })
    }

    /// Parse `[x_min, y_min, z_min, x_max, y_max, z_max]`.
    pub fn from_slice(values: &[f64]) -> Result<Self, V2xError> {
        if values.len() != 6 {
            return Err(V2xError::shape("6 range values", format!("{} values", values.len())));
        }
        Self::new(
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        )
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2]]
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        (0..3).all(|k| p[k] >= self.min[k] && p[k] <= self.max[k])
    }
}

/// Points with every coordinate inside `range`, in their original order.
pub fn filter_points_in_range(points: &PointCloud, range: &PointCloudRange) -> PointCloud {
    let kept = points.filter(|r| range.contains([r[0], r[1], r[2]]));
    debug!(input = points.len(), kept = kept.len(), "range filter");
    kept
}

/// True when every point lies inside `range`.
pub fn check_points_in_range(points: &PointCloud, range: &PointCloudRange) -> bool {
    first_out_of_range(points, range).is_none()
}

fn first_out_of_range(points: &PointCloud, range: &PointCloudRange) -> Option<usize> {
    points.xyz_iter().position(|p| !range.contains(p))
}

// ────────────────────────────────────────────────────────────────────────────
// Orthogonal projection
// ────────────────────────────────────────────────────────────────────────────

/// Raster dimensions `(width, height)` of `range` at `resolution`.
pub fn bev_grid_size(range: &PointCloudRange, resolution: f64) -> Result<(usize, usize), V2xError> {
    check_resolution(resolution)?;
    let cells = |k: usize| ((range.max[k] - range.min[k]) / resolution).ceil().max(1.0) as usize;
    Ok((cells(0), cells(1)))
}

fn check_resolution(resolution: f64) -> Result<(), V2xError> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(V2xError::parameter(
            "resolution",
            format!("must be a positive number of metres, got {resolution}"),
        ));
    }
    Ok(())
}

/// Result of [`orthogonal_projection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrthogonalProjection {
    width: usize,
    height: usize,
    pixels: Vec<[usize; 2]>,
    point_to_pixel: Vec<usize>,
}

impl OrthogonalProjection {
    /// Grid width (pixels along x).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height (pixels along y).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Distinct occupied pixels `[pixel_x, pixel_y]`, in order of first hit.
    pub fn pixels(&self) -> &[[usize; 2]] {
        &self.pixels
    }

    /// For every input point, its index into [`pixels`](Self::pixels).
    pub fn point_to_pixel(&self) -> &[usize] {
        &self.point_to_pixel
    }

    /// Points landing in each occupied pixel.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.pixels.len()];
        for &p in &self.point_to_pixel {
            counts[p] += 1;
        }
        counts
    }

    /// Binary occupancy raster: 255 where at least one point landed.
    pub fn occupancy(&self) -> BevImage {
        let mut img = BevImage::zeros(self.width, self.height);
        for &[x, y] in &self.pixels {
            img.set(x, y, 255.0);
        }
        img
    }

    /// Per-pixel mean of feature column `column` of `points`.
    ///
    /// `points` must be the cloud this projection was computed from.
    pub fn mean_feature(&self, points: &PointCloud, column: usize) -> Result<BevImage, V2xError> {
        if points.len() != self.point_to_pixel.len() {
            return Err(V2xError::shape(
                format!("{} points", self.point_to_pixel.len()),
                format!("{} points", points.len()),
            ));
        }
        let values = points.column(column)?;
        let mut sums = vec![0.0; self.pixels.len()];
        for (&p, v) in self.point_to_pixel.iter().zip(&values) {
            sums[p] += v;
        }
        let mut img = BevImage::zeros(self.width, self.height);
        for ((&[x, y], sum), count) in self.pixels.iter().zip(&sums).zip(self.counts()) {
            img.set(x, y, sum / count as f64);
        }
        Ok(img)
    }
}

/// Project in-range points onto the BEV grid.
///
/// `pixel = floor((coord - min) / resolution)` for x and y; points on the
/// upper bound fall into the last row/column.
///
/// # Errors
///
/// - [`V2xError::OutOfRange`] for the first point outside `range`; filter
///   with [`filter_points_in_range`] first.
/// - [`V2xError::InvalidParameter`] for a non-positive resolution.
pub fn orthogonal_projection(
    points: &PointCloud,
    range: &PointCloudRange,
    resolution: f64,
) -> Result<OrthogonalProjection, V2xError> {
    let (width, height) = bev_grid_size(range, resolution)?;
    if let Some(index) = first_out_of_range(points, range) {
        return Err(V2xError::OutOfRange { index });
    }

    let to_cell = |v: f64, lo: f64, n: usize| (((v - lo) / resolution).floor() as usize).min(n - 1);

    let mut lookup: HashMap<[usize; 2], usize> = HashMap::new();
    let mut pixels = Vec::new();
    let mut point_to_pixel = Vec::with_capacity(points.len());
    for p in points.xyz_iter() {
        let cell = [to_cell(p[0], range.min[0], width), to_cell(p[1], range.min[1], height)];
        let idx = *lookup.entry(cell).or_insert_with(|| {
            pixels.push(cell);
            pixels.len() - 1
        });
        point_to_pixel.push(idx);
    }
    debug!(points = points.len(), pixels = pixels.len(), width, height, "orthogonal projection");

    Ok(OrthogonalProjection {
        width,
        height,
        pixels,
        point_to_pixel,
    })
}

/// A single-channel raster, row-major with `row = pixel_y`.
#[derive(Debug, Clone, PartialEq)]
pub struct BevImage {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl BevImage {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, v: f64) {
        self.data[y * self.width + x] = v;
    }

    /// Largest value, 0 for an all-zero image.
    pub fn max_value(&self) -> f64 {
        self.data.iter().copied().fold(0.0, f64::max)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Perspective projection
// ────────────────────────────────────────────────────────────────────────────

/// Pinhole camera matrix `K`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeIntrinsics(pub Mat3);

impl PinholeIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self([[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]])
    }

    /// Parse 9 row-major values.
    pub fn from_slice(values: &[f64]) -> Result<Self, V2xError> {
        if values.len() != 9 {
            return Err(V2xError::shape("a 3x3 intrinsic matrix (9 values)", format!("{} values", values.len())));
        }
        Ok(Self(std::array::from_fn(|r| std::array::from_fn(|c| values[r * 3 + c]))))
    }
}

/// Project camera-frame points to pixel coordinates `(u, v)`.
///
/// Computes `K · p` and divides by depth. Points at or behind the camera give
/// non-finite or mirrored coordinates; callers filter them beforehand.
///
/// # Errors
///
/// [`V2xError::InvalidShape`] unless `points` has exactly 3 columns.
pub fn perspective_projection(
    points: &PointCloud,
    intrinsics: &PinholeIntrinsics,
) -> Result<Vec<[f64; 2]>, V2xError> {
    if points.stride() != 3 {
        return Err(V2xError::shape(
            "camera-frame points with 3 columns",
            format!("{} columns", points.stride()),
        ));
    }
    let k = &intrinsics.0;
    Ok(points
        .xyz_iter()
        .map(|p| {
            let h: Vec3 = std::array::from_fn(|r| k[r][0] * p[0] + k[r][1] * p[1] + k[r][2] * p[2]);
            [h[0] / h[2], h[1] / h[2]]
        })
        .collect())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ten_by_ten() -> PointCloudRange {
        PointCloudRange::new([0.0, 0.0, -1.0], [10.0, 10.0, 1.0]).unwrap()
    }

    // ── Range ───────────────────────────────────────────────────────────────

    #[test]
    fn range_from_slice() {
        assert!(matches!(
            PointCloudRange::from_slice(&[0.0; 5]),
            Err(V2xError::InvalidShape { .. })
        ));
        let r = PointCloudRange::from_slice(&[-51.2, -51.2, -25.0, 51.2, 51.2, 3.0]).unwrap();
        assert_eq!(r.to_array(), [-51.2, -51.2, -25.0, 51.2, 51.2, 3.0]);
        assert!(PointCloudRange::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn filter_keeps_inclusive_bounds_in_order() {
        let cloud = PointCloud::from_rows(&[
            [5.0, 5.0, 0.0, 1.0],
            [10.0, 0.0, 1.0, 2.0],
            [10.1, 5.0, 0.0, 3.0],
            [5.0, 5.0, -1.5, 4.0],
            [0.0, 10.0, -1.0, 5.0],
        ])
        .unwrap();
        let kept = filter_points_in_range(&cloud, &ten_by_ten());
        assert_eq!(kept.column(3).unwrap(), vec![1.0, 2.0, 5.0]);
        assert!(check_points_in_range(&kept, &ten_by_ten()));
        assert!(!check_points_in_range(&cloud, &ten_by_ten()));
    }

    // ── Orthogonal projection ───────────────────────────────────────────────

    #[test]
    fn nearby_points_share_a_pixel() {
        let cloud = PointCloud::from_xyz(&[[0.5, 0.5, 0.0], [0.9, 0.9, 0.3], [1.5, 0.5, -0.2]]);
        let proj = orthogonal_projection(&cloud, &ten_by_ten(), 1.0).unwrap();
        assert_eq!(proj.pixels(), &[[0, 0], [1, 0]]);
        assert_eq!(proj.point_to_pixel(), &[0, 0, 1]);
        assert_eq!((proj.width(), proj.height()), (10, 10));
        assert_eq!(proj.counts(), vec![2, 1]);
    }

    #[test]
    fn grid_size_rounds_up() {
        let r = PointCloudRange::from_slice(&[-51.2, -51.2, -25.0, 51.2, 51.2, 3.0]).unwrap();
        assert_eq!(bev_grid_size(&r, 0.2).unwrap(), (512, 512));
        let r = PointCloudRange::new([0.0; 3], [10.5, 3.0, 1.0]).unwrap();
        assert_eq!(bev_grid_size(&r, 1.0).unwrap(), (11, 3));
    }

    #[test]
    fn upper_bound_falls_in_last_pixel() {
        let cloud = PointCloud::from_xyz(&[[10.0, 10.0, 0.0]]);
        let proj = orthogonal_projection(&cloud, &ten_by_ten(), 1.0).unwrap();
        assert_eq!(proj.pixels(), &[[9, 9]]);
    }

    #[test]
    fn out_of_range_point_is_rejected() {
        let cloud = PointCloud::from_xyz(&[[1.0, 1.0, 0.0], [11.0, 1.0, 0.0]]);
        let err = orthogonal_projection(&cloud, &ten_by_ten(), 1.0).unwrap_err();
        assert_eq!(err, V2xError::OutOfRange { index: 1 });
    }

    #[test]
    fn bad_resolution_is_rejected() {
        let cloud = PointCloud::from_xyz(&[[1.0, 1.0, 0.0]]);
        assert!(orthogonal_projection(&cloud, &ten_by_ten(), 0.0).is_err());
        assert!(orthogonal_projection(&cloud, &ten_by_ten(), f64::NAN).is_err());
    }

    #[test]
    fn empty_cloud_projects_to_nothing() {
        let proj = orthogonal_projection(&PointCloud::empty(4).unwrap(), &ten_by_ten(), 0.5).unwrap();
        assert!(proj.pixels().is_empty());
        assert_eq!(proj.occupancy().max_value(), 0.0);
    }

    #[test]
    fn occupancy_and_mean_intensity() {
        let cloud = PointCloud::from_rows(&[
            [0.2, 0.2, 0.0, 10.0],
            [0.8, 0.1, 0.0, 30.0],
            [3.5, 7.5, 0.0, 5.0],
        ])
        .unwrap();
        let proj = orthogonal_projection(&cloud, &ten_by_ten(), 1.0).unwrap();

        let occ = proj.occupancy();
        assert_eq!(occ.get(0, 0), 255.0);
        assert_eq!(occ.get(3, 7), 255.0);
        assert_eq!(occ.get(7, 3), 0.0);
        assert_eq!(occ.data().iter().filter(|v| **v > 0.0).count(), 2);

        let intensity = proj.mean_feature(&cloud, 3).unwrap();
        assert_abs_diff_eq!(intensity.get(0, 0), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(intensity.get(3, 7), 5.0, epsilon = 1e-12);
        assert_eq!(intensity.max_value(), 20.0);
    }

    #[test]
    fn mean_feature_checks_inputs() {
        let cloud = PointCloud::from_xyz(&[[0.2, 0.2, 0.0]]);
        let proj = orthogonal_projection(&cloud, &ten_by_ten(), 1.0).unwrap();
        assert!(proj.mean_feature(&cloud, 3).is_err());
        let other = PointCloud::from_xyz(&[[0.2, 0.2, 0.0], [0.3, 0.3, 0.0]]);
        assert!(proj.mean_feature(&other, 0).is_err());
    }

    // ── Perspective projection ──────────────────────────────────────────────

    #[test]
    fn pinhole_projects_and_normalises() {
        let k = PinholeIntrinsics::new(500.0, 400.0, 320.0, 240.0);
        let cloud = PointCloud::from_xyz(&[[0.0, 0.0, 5.0], [1.0, -0.5, 2.0]]);
        let uv = perspective_projection(&cloud, &k).unwrap();
        assert_abs_diff_eq!(uv[0][0], 320.0, epsilon = 1e-12);
        assert_abs_diff_eq!(uv[0][1], 240.0, epsilon = 1e-12);
        assert_abs_diff_eq!(uv[1][0], 570.0, epsilon = 1e-12);
        assert_abs_diff_eq!(uv[1][1], 140.0, epsilon = 1e-12);
    }

    #[test]
    fn pinhole_rejects_wrong_shapes() {
        let k = PinholeIntrinsics::new(1.0, 1.0, 0.0, 0.0);
        let cloud = PointCloud::from_rows(&[[0.0, 0.0, 1.0, 0.5]]).unwrap();
        assert!(perspective_projection(&cloud, &k).is_err());
        assert!(PinholeIntrinsics::from_slice(&[0.0; 4]).is_err());
        assert_eq!(
            PinholeIntrinsics::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap(),
            PinholeIntrinsics::new(1.0, 1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn zero_depth_is_not_finite() {
        let k = PinholeIntrinsics::new(1.0, 1.0, 0.0, 0.0);
        let uv = perspective_projection(&PointCloud::from_xyz(&[[1.0, 1.0, 0.0]]), &k).unwrap();
        assert!(!uv[0][0].is_finite());
    }
}
