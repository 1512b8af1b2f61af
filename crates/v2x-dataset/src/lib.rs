//! `v2x-dataset` – the boundary between nuScenes-style V2X records and the
//! geometry in [`v2x_perception`].
//!
//! # Modules
//!
//! - [`provider`] – the [`DatasetProvider`][provider::DatasetProvider] trait
//!   and the serde-backed [`InMemoryProvider`][provider::InMemoryProvider].
//! - [`lidar`] – decodes packed sweeps into point clouds.
//! - [`frames`] – [`FrameResolver`][frames::FrameResolver]: capture token →
//!   sensor/vehicle/global transforms.
//! - [`annotations`] – annotation records → labeled boxes in the global or
//!   sensor frame.
//! - [`sample`] – finds every LiDAR of a sample and fuses them.
//!
//! # Example
//!
//! ```rust
//! use v2x_dataset::provider::InMemoryProvider;
//! use v2x_dataset::sample::available_point_clouds;
//! use v2x_perception::fusion::FusionOptions;
//! use v2x_types::SampleDataRef;
//!
//! let mut provider = InMemoryProvider::new();
//! provider.insert_sample("s0", Vec::<SampleDataRef>::new());
//!
//! let fused = available_point_clouds(&provider, "s0", "LIDAR_TOP_id_1", &FusionOptions::default()).unwrap();
//! assert!(fused.is_empty());
//! ```

pub mod annotations;
pub mod frames;
pub mod lidar;
pub mod provider;
pub mod sample;
