//! Homogeneous transform algebra.
//!
//! A [`Transform`] is a 4×4 rigid-body matrix `[R t; 0 1]`. Transforms are
//! named after the frames they connect: `vehicle_from_sensor` maps points
//! expressed in the sensor frame into the vehicle frame.
//!
//! # Example
//!
//! ```rust
//! use v2x_perception::transform::{make_transform, Quaternion};
//!
//! // Sensor mounted 1 m above the vehicle origin, same orientation.
//! let vehicle_from_sensor = make_transform([0.0, 0.0, 1.0], Quaternion::identity()).unwrap();
//! // Vehicle 10 m east of the global origin, heading north.
//! let global_from_vehicle = make_transform(
//!     [10.0, 0.0, 0.0],
//!     Quaternion::from_yaw(std::f64::consts::FRAC_PI_2),
//! )
//! .unwrap();
//!
//! let global_from_sensor = global_from_vehicle.compose(&vehicle_from_sensor);
//! let p = global_from_sensor.apply([1.0, 0.0, 0.0]);
//! assert!((p[0] - 10.0).abs() < 1e-9);
//! assert!((p[1] - 1.0).abs() < 1e-9);
//! assert!((p[2] - 1.0).abs() < 1e-9);
//! ```

use v2x_types::V2xError;

use crate::pointcloud::PointCloud;

pub type Vec3 = [f64; 3];
pub type Mat3 = [[f64; 3]; 3];
pub type Mat4 = [[f64; 4]; 4];

/// Tolerance used when validating rotation matrices.
pub const ROTATION_TOLERANCE: f64 = 1e-6;

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A quaternion `(w, x, y, z)` representing a 3-D rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// From the dataset's `[w, x, y, z]` layout.
    pub fn from_array(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = 0.5 * yaw;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Scale to unit length.
    ///
    /// # Errors
    ///
    /// [`V2xError::InvalidRotation`] for a zero or non-finite quaternion.
    pub fn normalized(self) -> Result<Self, V2xError> {
        let n = self.norm();
        if !n.is_finite() || n < f64::EPSILON {
            return Err(V2xError::InvalidRotation(format!(
                "quaternion {self:?} cannot be normalised"
            )));
        }
        Ok(Self::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }

    /// Rotation matrix of this quaternion. Assumes unit length.
    pub fn to_rotation_matrix(self) -> Mat3 {
        let Self { w, x, y, z } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rotation input
// ────────────────────────────────────────────────────────────────────────────

/// The accepted encodings of a rotation, resolved once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rotation {
    Quaternion(Quaternion),
    Matrix3(Mat3),
    /// Only the upper-left 3×3 block is used.
    Homogeneous(Mat4),
}

impl Rotation {
    /// Interpret a flat, row-major value list by its length: 4 values are a
    /// `(w, x, y, z)` quaternion, 9 a 3×3 matrix, 16 a 4×4 matrix.
    pub fn from_slice(values: &[f64]) -> Result<Self, V2xError> {
        match values.len() {
            4 => Ok(Self::Quaternion(Quaternion::new(
                values[0], values[1], values[2], values[3],
            ))),
            9 => Ok(Self::Matrix3(std::array::from_fn(|r| {
                std::array::from_fn(|c| values[r * 3 + c])
            }))),
            16 => Ok(Self::Homogeneous(std::array::from_fn(|r| {
                std::array::from_fn(|c| values[r * 4 + c])
            }))),
            n => Err(V2xError::shape(
                "a quaternion (4), a 3x3 (9) or a 4x4 (16) rotation",
                format!("{n} values"),
            )),
        }
    }

    /// Resolve to a validated 3×3 rotation matrix.
    ///
    /// Quaternions are normalised first; matrices must already be orthonormal
    /// with determinant +1.
    pub fn to_matrix(self) -> Result<Mat3, V2xError> {
        let m = match self {
            Rotation::Quaternion(q) => return Ok(q.normalized()?.to_rotation_matrix()),
            Rotation::Matrix3(m) => m,
            Rotation::Homogeneous(h) => upper_left(&h),
        };
        validate_rotation(&m)?;
        Ok(m)
    }
}

impl From<Quaternion> for Rotation {
    fn from(q: Quaternion) -> Self {
        Rotation::Quaternion(q)
    }
}

impl From<Mat3> for Rotation {
    fn from(m: Mat3) -> Self {
        Rotation::Matrix3(m)
    }
}

impl From<Mat4> for Rotation {
    fn from(m: Mat4) -> Self {
        Rotation::Homogeneous(m)
    }
}

fn upper_left(h: &Mat4) -> Mat3 {
    std::array::from_fn(|r| std::array::from_fn(|c| h[r][c]))
}

fn determinant(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn validate_rotation(m: &Mat3) -> Result<(), V2xError> {
    if m.iter().flatten().any(|v| !v.is_finite()) {
        return Err(V2xError::InvalidRotation("matrix has non-finite entries".into()));
    }
    for i in 0..3 {
        for j in 0..3 {
            let dot: f64 = (0..3).map(|k| m[i][k] * m[j][k]).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            if (dot - expected).abs() > ROTATION_TOLERANCE {
                return Err(V2xError::InvalidRotation(format!(
                    "matrix is not orthonormal (row {i} · row {j} = {dot})"
                )));
            }
        }
    }
    let det = determinant(m);
    if (det - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(V2xError::InvalidRotation(format!(
            "determinant is {det}, expected +1"
        )));
    }
    Ok(())
}

/// Rotation of `yaw` radians about +Z.
pub fn rotation_about_z(yaw: f64) -> Mat3 {
    let (sin, cos) = yaw.sin_cos();
    [[cos, -sin, 0.0], [sin, cos, 0.0], [0.0, 0.0, 1.0]]
}

/// Heading of a rotation: the rotated x-axis projected onto the xy-plane.
///
/// Only meaningful for rotations with negligible roll and pitch; that
/// precondition is not checked.
pub fn quaternion_to_yaw(q: Quaternion) -> f64 {
    yaw_of_matrix(&q.to_rotation_matrix())
}

fn yaw_of_matrix(m: &Mat3) -> f64 {
    // R · [1, 0, 0]ᵀ is the first column.
    m[1][0].atan2(m[0][0])
}

// ────────────────────────────────────────────────────────────────────────────
// Transform
// ────────────────────────────────────────────────────────────────────────────

/// A 4×4 homogeneous rigid-body transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    m: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Assemble from a validated rotation and a translation.
    pub fn from_parts(rotation: Mat3, translation: Vec3) -> Self {
        let mut t = Self::identity();
        for r in 0..3 {
            t.m[r][..3].copy_from_slice(&rotation[r]);
            t.m[r][3] = translation[r];
        }
        t
    }

    /// Wrap a full 4×4 matrix after checking it is a rigid transform.
    pub fn from_matrix(m: Mat4) -> Result<Self, V2xError> {
        if m[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(V2xError::shape(
                "bottom row [0, 0, 0, 1]",
                format!("{:?}", m[3]),
            ));
        }
        validate_rotation(&upper_left(&m))?;
        Ok(Self { m })
    }

    /// Wrap 16 row-major values.
    pub fn from_rows(values: &[f64]) -> Result<Self, V2xError> {
        if values.len() != 16 {
            return Err(V2xError::shape("a 4x4 matrix (16 values)", format!("{} values", values.len())));
        }
        Self::from_matrix(std::array::from_fn(|r| {
            std::array::from_fn(|c| values[r * 4 + c])
        }))
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.m
    }

    pub fn rotation(&self) -> Mat3 {
        upper_left(&self.m)
    }

    pub fn translation(&self) -> Vec3 {
        [self.m[0][3], self.m[1][3], self.m[2][3]]
    }

    /// Heading of the rotation part (ground-plane assumption).
    pub fn yaw(&self) -> f64 {
        yaw_of_matrix(&self.rotation())
    }

    /// `self ∘ inner`: apply `inner` first, then `self`.
    ///
    /// If `self` = T_c_from_b and `inner` = T_b_from_a, the result is
    /// T_c_from_a.
    pub fn compose(&self, inner: &Transform) -> Transform {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = (0..4).map(|k| self.m[r][k] * inner.m[k][c]).sum();
            }
        }
        Transform { m: out }
    }

    /// Closed-form inverse `[Rᵀ, -Rᵀt]`.
    pub fn inverse(&self) -> Transform {
        let r = self.rotation();
        let t = self.translation();
        let rt: Mat3 = std::array::from_fn(|i| std::array::from_fn(|j| r[j][i]));
        let t_inv: Vec3 =
            std::array::from_fn(|i| -(rt[i][0] * t[0] + rt[i][1] * t[1] + rt[i][2] * t[2]));
        Transform::from_parts(rt, t_inv)
    }

    /// Map a single point.
    #[inline]
    pub fn apply(&self, p: Vec3) -> Vec3 {
        let m = &self.m;
        std::array::from_fn(|r| m[r][0] * p[0] + m[r][1] * p[1] + m[r][2] * p[2] + m[r][3])
    }

    /// Rotate a direction (no translation).
    #[inline]
    pub fn apply_vector(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        std::array::from_fn(|r| m[r][0] * v[0] + m[r][1] * v[1] + m[r][2] * v[2])
    }

    /// Largest element-wise difference to `other`.
    pub fn max_abs_diff(&self, other: &Transform) -> f64 {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Free functions
// ────────────────────────────────────────────────────────────────────────────

/// Build a transform from a translation and any accepted rotation encoding.
///
/// # Errors
///
/// [`V2xError::InvalidRotation`] when the rotation is not a proper rotation.
/// Shape errors surface earlier, in [`Rotation::from_slice`].
pub fn make_transform(translation: Vec3, rotation: impl Into<Rotation>) -> Result<Transform, V2xError> {
    Ok(Transform::from_parts(rotation.into().to_matrix()?, translation))
}

/// `outer ∘ inner`; see [`Transform::compose`].
pub fn compose(outer: &Transform, inner: &Transform) -> Transform {
    outer.compose(inner)
}

/// Return a transformed copy of `points`. Feature columns are copied
/// unchanged.
pub fn transform_copy(t: &Transform, points: &PointCloud) -> PointCloud {
    let mut out = points.clone();
    transform_in_place(t, &mut out);
    out
}

/// Overwrite the coordinates of `points` with their transformed values.
pub fn transform_in_place(t: &Transform, points: &mut PointCloud) {
    let stride = points.stride();
    for row in points.data_mut().chunks_exact_mut(stride) {
        let p = t.apply([row[0], row[1], row[2]]);
        row[..3].copy_from_slice(&p);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, PI};

    fn sample_pose() -> Transform {
        // Arbitrary non-trivial rotation (normalised inside make_transform).
        let q = Quaternion::new(0.9, 0.1, -0.3, 0.2);
        make_transform([4.0, -2.5, 1.25], q).unwrap()
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_matrix() {
        let m = Quaternion::identity().to_rotation_matrix();
        assert_eq!(m, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let t = make_transform([0.0; 3], q).unwrap();
        let r = t.apply([1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(r[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_quaternion_is_rejected() {
        let err = make_transform([0.0; 3], Quaternion::new(0.0, 0.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, V2xError::InvalidRotation(_)));
    }

    #[test]
    fn quaternion_to_yaw_recovers_heading() {
        for yaw in [-3.0, -FRAC_PI_2, -0.2, 0.0, 0.7, FRAC_PI_2, 3.0] {
            assert_abs_diff_eq!(quaternion_to_yaw(Quaternion::from_yaw(yaw)), yaw, epsilon = 1e-12);
        }
    }

    // ── Rotation input ──────────────────────────────────────────────────────

    #[test]
    fn rotation_from_slice_dispatches_on_length() {
        assert!(matches!(
            Rotation::from_slice(&[1.0, 0.0, 0.0, 0.0]),
            Ok(Rotation::Quaternion(_))
        ));
        assert!(matches!(Rotation::from_slice(&[0.0; 9]), Ok(Rotation::Matrix3(_))));
        assert!(matches!(Rotation::from_slice(&[0.0; 16]), Ok(Rotation::Homogeneous(_))));
        let err = Rotation::from_slice(&[0.0; 6]).unwrap_err();
        assert!(matches!(err, V2xError::InvalidShape { .. }));
    }

    #[test]
    fn matrix_rotation_matches_quaternion() {
        let yaw = 0.4;
        let from_q = make_transform([1.0, 2.0, 3.0], Quaternion::from_yaw(yaw)).unwrap();
        let from_m = make_transform([1.0, 2.0, 3.0], rotation_about_z(yaw)).unwrap();
        assert!(from_q.max_abs_diff(&from_m) < 1e-12);

        let from_h = make_transform([1.0, 2.0, 3.0], *from_m.matrix()).unwrap();
        assert!(from_h.max_abs_diff(&from_m) < 1e-12);
    }

    #[test]
    fn non_orthonormal_matrix_is_rejected() {
        let scaled = [[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            make_transform([0.0; 3], scaled),
            Err(V2xError::InvalidRotation(_))
        ));
    }

    #[test]
    fn reflection_is_rejected() {
        let mirror = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]];
        assert!(make_transform([0.0; 3], mirror).is_err());
    }

    #[test]
    fn make_transform_layout() {
        let t = make_transform([1.0, 2.0, 3.0], rotation_about_z(PI / 6.0)).unwrap();
        let m = t.matrix();
        assert_eq!([m[0][3], m[1][3], m[2][3]], [1.0, 2.0, 3.0]);
        assert_eq!(m[3], [0.0, 0.0, 0.0, 1.0]);
        assert_abs_diff_eq!(m[0][0], (PI / 6.0).cos(), epsilon = 1e-15);
        assert_abs_diff_eq!(m[1][0], (PI / 6.0).sin(), epsilon = 1e-15);
    }

    // ── Transform ───────────────────────────────────────────────────────────

    #[test]
    fn from_rows_checks_length_and_bottom_row() {
        assert!(Transform::from_rows(&[0.0; 12]).is_err());
        let mut rows = [0.0; 16];
        rows[0] = 1.0;
        rows[5] = 1.0;
        rows[10] = 1.0;
        assert!(Transform::from_rows(&rows).is_err());
        rows[15] = 1.0;
        assert_eq!(Transform::from_rows(&rows).unwrap(), Transform::identity());
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let t = sample_pose();
        assert!(t.compose(&t.inverse()).max_abs_diff(&Transform::identity()) < 1e-6);
        assert!(t.inverse().compose(&t).max_abs_diff(&Transform::identity()) < 1e-6);
    }

    #[test]
    fn inverse_roundtrips_points() {
        let t = sample_pose();
        let p = [3.0, -7.5, 0.25];
        let back = t.inverse().apply(t.apply(p));
        for k in 0..3 {
            assert_abs_diff_eq!(back[k], p[k], epsilon = 1e-9);
        }
    }

    #[test]
    fn compose_applies_inner_first() {
        let translate = make_transform([1.0, 0.0, 0.0], Quaternion::identity()).unwrap();
        let rotate = make_transform([0.0; 3], Quaternion::from_yaw(FRAC_PI_2)).unwrap();
        // Translate, then rotate: (0,0,0) → (1,0,0) → (0,1,0).
        let p = rotate.compose(&translate).apply([0.0; 3]);
        assert_abs_diff_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn compose_is_associative() {
        let a = sample_pose();
        let b = make_transform([0.5, 0.5, 0.0], Quaternion::from_yaw(1.1)).unwrap();
        let c = make_transform([-3.0, 0.0, 2.0], Quaternion::new(0.7, 0.0, 0.7, 0.1)).unwrap();
        let left = compose(&compose(&a, &b), &c);
        let right = compose(&a, &compose(&b, &c));
        assert!(left.max_abs_diff(&right) < 1e-12);
    }

    #[test]
    fn transform_yaw() {
        let t = make_transform([0.0; 3], Quaternion::from_yaw(-1.2)).unwrap();
        assert_abs_diff_eq!(t.yaw(), -1.2, epsilon = 1e-12);
    }

    // ── Point clouds ────────────────────────────────────────────────────────

    #[test]
    fn transform_copy_keeps_features_and_source() {
        let cloud = PointCloud::from_rows(&[[1.0, 0.0, 0.0, 0.3], [0.0, 2.0, 0.0, 0.9]]).unwrap();
        let t = make_transform([0.0, 0.0, 5.0], Quaternion::from_yaw(FRAC_PI_2)).unwrap();
        let moved = transform_copy(&t, &cloud);

        assert_eq!(cloud.xyz(0), [1.0, 0.0, 0.0], "input must be untouched");
        let p0 = moved.xyz(0);
        assert_abs_diff_eq!(p0[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p0[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p0[2], 5.0, epsilon = 1e-12);
        assert_eq!(moved.column(3).unwrap(), vec![0.3, 0.9]);
    }

    #[test]
    fn transform_in_place_overwrites_coordinates() {
        let mut cloud = PointCloud::from_rows(&[[1.0, 2.0, 3.0, 7.0]]).unwrap();
        let t = make_transform([1.0, 1.0, 1.0], Quaternion::identity()).unwrap();
        transform_in_place(&t, &mut cloud);
        assert_eq!(cloud.row(0), &[2.0, 3.0, 4.0, 7.0]);
    }

    #[test]
    fn transform_of_empty_cloud_is_empty() {
        let cloud = PointCloud::empty(4).unwrap();
        let moved = transform_copy(&sample_pose(), &cloud);
        assert!(moved.is_empty());
        assert_eq!(moved.stride(), 4);
    }
}
