//! Oriented bounding boxes and point-in-box membership.
//!
//! An [`OrientedBox`] has a center, extents `(dx, dy, dz)` along its local
//! axes and a heading (`yaw`, rotation about +Z). Roll and pitch are always
//! zero.
//!
//! # Corner order
//!
//! [`OrientedBox::corners`] returns the eight corners in a fixed order that
//! renderers rely on:
//!
//! ```text
//!        4 -------- 0          front face (+x): 0-1-2-3
//!       /|         /|          back face  (-x): 4-5-6-7
//!      5 -------- 1 |          top face       : 0-4-5-1
//!      | 7 ------ | 3          front diagonals 0-2, 1-3 mark the heading
//!      |/         |/
//!      6 -------- 2
//! ```

use v2x_types::{DetectionClass, V2xError};

use crate::octree::{Aabb, Octree};
use crate::pointcloud::PointCloud;
use crate::transform::{Transform, Vec3, rotation_about_z};

/// Inclusive slack used by [`point_in_box`] to absorb floating error on faces.
pub const DEFAULT_BOX_TOLERANCE: f64 = 1e-2;

/// Leaf capacity of the octree built by [`find_points_in_boxes_indexed`].
const INDEX_LEAF_CAPACITY: usize = 32;

// ────────────────────────────────────────────────────────────────────────────
// OrientedBox
// ────────────────────────────────────────────────────────────────────────────

/// A yaw-only oriented 3-D box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    center: Vec3,
    size: Vec3,
    yaw: f64,
    label: Option<DetectionClass>,
}

impl OrientedBox {
    /// # Errors
    ///
    /// [`V2xError::InvalidParameter`] when an extent is not a positive finite
    /// number, or a coordinate is not finite.
    pub fn new(center: Vec3, size: Vec3, yaw: f64) -> Result<Self, V2xError> {
        if size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(V2xError::parameter("size", format!("extents must be positive, got {size:?}")));
        }
        if center.iter().any(|c| !c.is_finite()) || !yaw.is_finite() {
            return Err(V2xError::parameter("center/yaw", "must be finite"));
        }
        Ok(Self {
            center,
            size,
            yaw,
            label: None,
        })
    }

    /// Parse a `[cx, cy, cz, dx, dy, dz, yaw]` record.
    pub fn from_slice(values: &[f64]) -> Result<Self, V2xError> {
        if values.len() != 7 {
            return Err(V2xError::shape(
                "7 box values (cx, cy, cz, dx, dy, dz, yaw)",
                format!("{} values", values.len()),
            ));
        }
        Self::new(
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
            values[6],
        )
    }

    pub fn with_label(mut self, label: DetectionClass) -> Self {
        self.label = Some(label);
        self
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// `(dx, dy, dz)`.
    pub fn size(&self) -> Vec3 {
        self.size
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn label(&self) -> Option<DetectionClass> {
        self.label
    }

    pub fn volume(&self) -> f64 {
        self.size.iter().product()
    }

    /// `[cx, cy, cz, dx, dy, dz, yaw]`.
    pub fn to_array(&self) -> [f64; 7] {
        let [cx, cy, cz] = self.center;
        let [dx, dy, dz] = self.size;
        [cx, cy, cz, dx, dy, dz, self.yaw]
    }

    /// The eight corners, in the order documented at module level.
    pub fn corners(&self) -> [Vec3; 8] {
        const SIGNS: [[f64; 3]; 8] = [
            [1.0, 1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, 1.0],
            [-1.0, -1.0, 1.0],
            [-1.0, -1.0, -1.0],
            [-1.0, 1.0, -1.0],
        ];
        let rot = rotation_about_z(self.yaw);
        SIGNS.map(|s| {
            let local: Vec3 = std::array::from_fn(|k| 0.5 * s[k] * self.size[k]);
            std::array::from_fn(|r| {
                self.center[r] + rot[r][0] * local[0] + rot[r][1] * local[1] + rot[r][2] * local[2]
            })
        })
    }

    /// Coordinates of `p` in the box's local frame.
    pub fn to_local(&self, p: Vec3) -> Vec3 {
        let d = [p[0] - self.center[0], p[1] - self.center[1], p[2] - self.center[2]];
        let (sin, cos) = self.yaw.sin_cos();
        // Rotation by -yaw.
        [cos * d[0] + sin * d[1], -sin * d[0] + cos * d[1], d[2]]
    }

    /// True when `p` lies inside the box grown by `tol` on every face.
    pub fn contains(&self, p: Vec3, tol: f64) -> bool {
        let local = self.to_local(p);
        (0..3).all(|k| local[k].abs() <= 0.5 * self.size[k] + tol)
    }

    /// World-axis bounds of the box grown by `tol`.
    ///
    /// The local faces are grown before rotating, matching [`contains`](Self::contains).
    pub fn aabb(&self, tol: f64) -> Aabb {
        let (sin, cos) = self.yaw.sin_cos();
        let [hx, hy, hz] = self.size.map(|s| 0.5 * s + tol);
        let half = [
            cos.abs() * hx + sin.abs() * hy,
            sin.abs() * hx + cos.abs() * hy,
            hz,
        ];
        Aabb::new(
            std::array::from_fn(|k| self.center[k] - half[k]),
            std::array::from_fn(|k| self.center[k] + half[k]),
        )
    }

    /// Re-express this box in another frame.
    ///
    /// The center is mapped through `t`; the heading is the yaw of `t`'s
    /// rotation applied to the box's forward axis. Only valid when `t` has
    /// negligible roll and pitch.
    pub fn transformed(&self, t: &Transform) -> OrientedBox {
        let (sin, cos) = self.yaw.sin_cos();
        let forward = t.apply_vector([cos, sin, 0.0]);
        OrientedBox {
            center: t.apply(self.center),
            size: self.size,
            yaw: forward[1].atan2(forward[0]),
            label: self.label,
        }
    }
}

/// Corners of a box; see [`OrientedBox::corners`].
pub fn box_to_corners(b: &OrientedBox) -> [Vec3; 8] {
    b.corners()
}

/// True when `point` lies inside `b` (faces inclusive, grown by `tol`).
pub fn point_in_box(point: Vec3, b: &OrientedBox, tol: f64) -> bool {
    b.contains(point, tol)
}

// ────────────────────────────────────────────────────────────────────────────
// Point → box assignment
// ────────────────────────────────────────────────────────────────────────────

/// For every point, the index of the box containing it, or `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxAssignment(Vec<Option<usize>>);

impl BoxAssignment {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, point: usize) -> Option<usize> {
        self.0.get(point).copied().flatten()
    }

    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.0
    }

    /// True for points that belong to some box.
    pub fn foreground_mask(&self) -> Vec<bool> {
        self.0.iter().map(Option::is_some).collect()
    }

    /// Integer form with `-1` for unassigned points.
    pub fn to_signed(&self) -> Vec<i64> {
        self.0.iter().map(|a| a.map_or(-1, |b| b as i64)).collect()
    }

    /// Number of points assigned to each of `num_boxes` boxes.
    pub fn points_per_box(&self, num_boxes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_boxes];
        for b in self.0.iter().flatten() {
            if let Some(c) = counts.get_mut(*b) {
                *c += 1;
            }
        }
        counts
    }
}

/// Assign every point to the first box (in list order) that contains it.
///
/// Points and boxes must be expressed in the same frame. Runs in O(N·B);
/// overlapping boxes resolve to the lower index. An empty box list yields an
/// all-`None` assignment.
pub fn find_points_in_boxes(points: &PointCloud, boxes: &[OrientedBox], tol: f64) -> BoxAssignment {
    let assignment = points
        .xyz_iter()
        .map(|p| boxes.iter().position(|b| b.contains(p, tol)))
        .collect();
    BoxAssignment(assignment)
}

/// Same result as [`find_points_in_boxes`], with an octree pre-filter.
///
/// Boxes are visited in list order and only claim points that no earlier
/// box has claimed, which reproduces the first-match rule.
pub fn find_points_in_boxes_indexed(
    points: &PointCloud,
    boxes: &[OrientedBox],
    tol: f64,
) -> BoxAssignment {
    let mut assignment = vec![None; points.len()];
    if boxes.is_empty() || points.is_empty() {
        return BoxAssignment(assignment);
    }

    let tree = Octree::from_cloud(points, INDEX_LEAF_CAPACITY);
    for (b_idx, b) in boxes.iter().enumerate() {
        for i in tree.query_indices(&b.aabb(tol)) {
            if assignment[i].is_none() && b.contains(points.xyz(i), tol) {
                assignment[i] = Some(b_idx);
            }
        }
    }
    BoxAssignment(assignment)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
