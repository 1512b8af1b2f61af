//! Octree over point indices.
//!
//! Partitions 3-D space recursively so that "which points lie inside this
//! box?" can be answered without scanning the whole cloud. Used as the
//! candidate pre-filter of
//! [`find_points_in_boxes_indexed`][crate::boxes::find_points_in_boxes_indexed].
//!
//! # Example
//!
//! ```rust
//! use v2x_perception::octree::{Aabb, Octree};
//! use v2x_perception::pointcloud::PointCloud;
//!
//! let cloud = PointCloud::from_xyz(&[[1.0, 2.0, 3.0], [8.0, 8.0, 8.0]]);
//! let tree = Octree::from_cloud(&cloud, 8);
//!
//! let probe = Aabb::new([0.5, 1.5, 2.5], [1.5, 2.5, 3.5]);
//! assert_eq!(tree.query_indices(&probe), vec![0]);
//! ```

use crate::pointcloud::PointCloud;
use crate::transform::Vec3;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])],
            max: [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])],
        }
    }

    /// Smallest box containing every point, `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        Some(it.fold(Self::new(first, first), |b, p| b.expanded_to(p)))
    }

    fn expanded_to(self, p: Vec3) -> Self {
        Self {
            min: std::array::from_fn(|k| self.min[k].min(p[k])),
            max: std::array::from_fn(|k| self.max[k].max(p[k])),
        }
    }

    /// Grow the box by `margin` on every side.
    pub fn inflated(&self, margin: f64) -> Self {
        Self {
            min: self.min.map(|v| v - margin),
            max: self.max.map(|v| v + margin),
        }
    }

    /// Midpoint.
    pub fn centre(&self) -> Vec3 {
        std::array::from_fn(|k| (self.min[k] + self.max[k]) * 0.5)
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Vec3) -> bool {
        (0..3).all(|k| p[k] >= self.min[k] && p[k] <= self.max[k])
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        (0..3).all(|k| self.min[k] <= other.max[k] && self.max[k] >= other.min[k])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Entry {
    index: usize,
    position: Vec3,
}

/// Point-index octree over a fixed root box.
///
/// Entries are stored in the deepest node whose bounding box still contains
/// them. Subdividing stops when either
/// - the number of entries in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
#[derive(Debug)]
pub struct Octree {
    root: OctreeNode,
    max_depth: usize,
}

impl Octree {
    /// Empty tree over `bounds`, at most 8 levels deep.
    ///
    /// - `capacity` – maximum entries per leaf before subdivision is attempted.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self::with_max_depth(bounds, capacity, 8)
    }

    /// Empty tree with a custom depth limit.
    pub fn with_max_depth(bounds: Aabb, capacity: usize, max_depth: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity.max(1)),
            max_depth,
        }
    }

    /// Index every point of `cloud` under its row number.
    pub fn from_cloud(cloud: &PointCloud, capacity: usize) -> Self {
        let bounds = Aabb::from_points(cloud.xyz_iter())
            .unwrap_or_else(|| Aabb::new([0.0; 3], [0.0; 3]));
        let mut tree = Self::new(bounds, capacity);
        for (i, p) in cloud.xyz_iter().enumerate() {
            tree.insert(i, p);
        }
        tree
    }

    /// Insert a point under `index`.
    ///
    /// Points outside the root box are dropped.
    pub fn insert(&mut self, index: usize, position: Vec3) {
        self.root.insert(Entry { index, position }, self.max_depth, 0);
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.root.count()
    }

    /// True when the tree contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of every entry lying inside `region`, ascending.
    pub fn query_indices(&self, region: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.root.query(region, &mut out);
        out.sort_unstable();
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Entries stored at this node (only non-empty when the node is a leaf).
    entries: Vec<Entry>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            entries: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            None => self.entries.len(),
            Some(children) => children.iter().map(|c| c.count()).sum(),
        }
    }

    fn insert(&mut self, entry: Entry, max_depth: usize, depth: usize) {
        if !self.bounds.contains_point(entry.position) {
            return;
        }

        match self.children.as_mut() {
            None => {
                self.entries.push(entry);
                if self.entries.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
            }
            Some(children) => {
                if let Some(child) = children
                    .iter_mut()
                    .find(|c| c.bounds.contains_point(entry.position))
                {
                    child.insert(entry, max_depth, depth + 1);
                }
            }
        }
    }

    fn query(&self, region: &Aabb, out: &mut Vec<usize>) {
        if !self.bounds.overlaps(region) {
            return;
        }
        match &self.children {
            None => out.extend(
                self.entries
                    .iter()
                    .filter(|e| region.contains_point(e.position))
                    .map(|e| e.index),
            ),
            Some(children) => {
                for child in children.iter() {
                    child.query(region, out);
                }
            }
        }
    }

    /// Split this leaf into eight children and redistribute existing entries.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        let octants = [
            Aabb::new(min, c),
            Aabb::new([c[0], min[1], min[2]], [max[0], c[1], c[2]]),
            Aabb::new([min[0], c[1], min[2]], [c[0], max[1], c[2]]),
            Aabb::new([c[0], c[1], min[2]], [max[0], max[1], c[2]]),
            Aabb::new([min[0], min[1], c[2]], [c[0], c[1], max[2]]),
            Aabb::new([c[0], min[1], c[2]], [max[0], c[1], max[2]]),
            Aabb::new([min[0], c[1], c[2]], [c[0], max[1], max[2]]),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        // Each entry goes to the first octant that contains it, so entries on
        // a shared face are never duplicated.
        for entry in std::mem::take(&mut self.entries) {
            if let Some(child) = children
                .iter_mut()
                .find(|ch| ch.bounds.contains_point(entry.position))
            {
                child.insert(entry, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
