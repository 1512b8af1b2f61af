//! `v2x-perception` – point-cloud geometry for multi-agent LiDAR data.
//!
//! Pure, synchronous math over in-memory arrays. Dataset records come in
//! through [`v2x_types`]; nothing in this crate touches files or renders.
//!
//! # Modules
//!
//! - [`transform`] – [`Transform`][transform::Transform]: 4×4 rigid-body
//!   transforms built from a translation and a quaternion or rotation matrix,
//!   with composition, analytic inverse and point application.
//! - [`pointcloud`] – [`PointCloud`][pointcloud::PointCloud]: row-major N×C
//!   array whose first three columns are x, y, z.
//! - [`boxes`] – [`OrientedBox`][boxes::OrientedBox]: yaw-only boxes, corner
//!   computation in a fixed order, point-in-box assignment.
//! - [`octree`] – [`Octree`][octree::Octree]: partitions 3-D space so box
//!   assignment only tests nearby points.
//! - [`frames`] – sensor → vehicle → global transforms from calibration and
//!   ego-pose records.
//! - [`fusion`] – [`merge_point_clouds`][fusion::merge_point_clouds]: brings
//!   several LiDARs into one reference frame, tagging each point with its
//!   source sensor.
//! - [`raster`] – range filtering, bird's-eye-view projection and pinhole
//!   projection.
//! - [`render`] – [`RenderScene`][render::RenderScene]: arrays and colors for
//!   an external viewer.

pub mod boxes;
pub mod frames;
pub mod fusion;
pub mod octree;
pub mod pointcloud;
pub mod raster;
pub mod render;
pub mod transform;
