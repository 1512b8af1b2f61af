//! Row-major point cloud container.
//!
//! Every point has at least three leading coordinates `(x, y, z)` followed by
//! a fixed number of feature columns (intensity, ring, ...). The frame a
//! cloud is expressed in is not stored; callers track it.

use v2x_types::V2xError;

use crate::transform::Vec3;

/// `N × stride` point array, `stride ≥ 3`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    data: Vec<f64>,
    stride: usize,
}

impl PointCloud {
    /// Wrap a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// [`V2xError::InvalidShape`] when `stride < 3` or the buffer length is
    /// not a multiple of `stride`.
    pub fn new(data: Vec<f64>, stride: usize) -> Result<Self, V2xError> {
        if stride < 3 {
            return Err(V2xError::shape(
                "at least 3 columns per point",
                format!("{stride} columns"),
            ));
        }
        if data.len() % stride != 0 {
            return Err(V2xError::shape(
                format!("a multiple of {stride} values"),
                format!("{} values", data.len()),
            ));
        }
        Ok(Self { data, stride })
    }

    /// An empty cloud with `stride` columns.
    pub fn empty(stride: usize) -> Result<Self, V2xError> {
        Self::new(Vec::new(), stride)
    }

    /// Build an `N × 3` cloud from bare coordinates.
    pub fn from_xyz(points: &[Vec3]) -> Self {
        Self {
            data: points.iter().flatten().copied().collect(),
            stride: 3,
        }
    }

    /// Build an `N × C` cloud from fixed-width rows.
    pub fn from_rows<const C: usize>(rows: &[[f64; C]]) -> Result<Self, V2xError> {
        Self::new(rows.iter().flatten().copied().collect(), C)
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Columns per point.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Feature columns after `(x, y, z)`.
    #[inline]
    pub fn num_features(&self) -> usize {
        self.stride - 3
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Full row of point `i`. Panics when out of bounds, like slice indexing.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.stride..(i + 1) * self.stride]
    }

    /// Coordinates of point `i`.
    pub fn xyz(&self, i: usize) -> Vec3 {
        let r = self.row(i);
        [r[0], r[1], r[2]]
    }

    /// Iterate over full rows.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.stride)
    }

    /// Iterate over coordinates.
    pub fn xyz_iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.rows().map(|r| [r[0], r[1], r[2]])
    }

    /// Coordinates only, as an owned array list.
    pub fn to_xyz(&self) -> Vec<Vec3> {
        self.xyz_iter().collect()
    }

    /// Values of column `c` for every point.
    pub fn column(&self, c: usize) -> Result<Vec<f64>, V2xError> {
        if c >= self.stride {
            return Err(V2xError::shape(
                format!("a column index below {}", self.stride),
                format!("column {c}"),
            ));
        }
        Ok(self.rows().map(|r| r[c]).collect())
    }

    /// Keep the rows for which `keep` returns true, in order.
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&[f64]) -> bool,
    {
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.rows() {
            if keep(row) {
                data.extend_from_slice(row);
            }
        }
        Self {
            data,
            stride: self.stride,
        }
    }

    /// Keep the rows whose mask entry is true.
    pub fn select(&self, mask: &[bool]) -> Result<Self, V2xError> {
        if mask.len() != self.len() {
            return Err(V2xError::shape(
                format!("a mask of length {}", self.len()),
                format!("length {}", mask.len()),
            ));
        }
        let mut flags = mask.iter();
        Ok(self.filter(|_| flags.next().copied().unwrap_or(false)))
    }

    /// Stack clouds vertically, preserving order.
    ///
    /// # Errors
    ///
    /// [`V2xError::InvalidShape`] when the parts disagree on their stride.
    pub fn concat(parts: &[PointCloud], stride: usize) -> Result<Self, V2xError> {
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.data.len()).sum());
        for part in parts {
            if part.stride != stride {
                return Err(V2xError::shape(
                    format!("{stride} columns per point"),
                    format!("{} columns", part.stride),
                ));
            }
            data.extend_from_slice(&part.data);
        }
        Self::new(data, stride)
    }

    /// Axis-aligned bounds of the coordinates, `None` when empty.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut it = self.xyz_iter();
        let first = it.next()?;
        Some(it.fold((first, first), |(mut lo, mut hi), p| {
            for k in 0..3 {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
            (lo, hi)
        }))
    }
}
