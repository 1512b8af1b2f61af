//! The [`DatasetProvider`] trait and an in-memory implementation.
//!
//! A provider resolves opaque tokens to dataset records. Sample tokens list
//! the sensor captures taken at one instant; sensor (sample-data) tokens
//! identify one capture and resolve to its calibration, the ego pose of the
//! agent that took it, the raw point-cloud bytes and the annotations visible
//! at its timestamp.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use v2x_types::{AnnotationRecord, CalibrationRecord, EgoPoseRecord, SampleDataRef, V2xError};

/// Read access to a nuScenes-style dataset.
///
/// Every method fails with [`V2xError::MissingRecord`] when the token is
/// unknown.
pub trait DatasetProvider {
    /// Captures belonging to `sample`, in dataset order.
    fn sample_data(&self, sample: &str) -> Result<Vec<SampleDataRef>, V2xError>;

    /// Mounting of the sensor that produced capture `sensor`.
    fn calibration(&self, sensor: &str) -> Result<CalibrationRecord, V2xError>;

    /// Pose of the capturing agent at the capture timestamp.
    fn ego_pose(&self, sensor: &str) -> Result<EgoPoseRecord, V2xError>;

    /// Raw LiDAR sweep: little-endian `f32` rows of x, y, z, intensity, ring.
    fn point_cloud_bytes(&self, sensor: &str) -> Result<Cow<'_, [u8]>, V2xError>;

    /// Annotations at the capture timestamp, in the global frame.
    fn annotations(&self, sensor: &str) -> Result<Vec<AnnotationRecord>, V2xError>;
}

// ────────────────────────────────────────────────────────────────────────────
// InMemoryProvider
// ────────────────────────────────────────────────────────────────────────────

/// Everything known about one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub calibration: CalibrationRecord,
    pub ego_pose: EgoPoseRecord,
    /// Path of the `.bin` sweep, for serialised bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_cloud_file: Option<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationRecord>,
}

/// Hash-map backed provider.
///
/// Deserialises from a scene bundle; the sweeps themselves are attached
/// afterwards with [`insert_point_cloud`](Self::insert_point_cloud), using
/// [`point_cloud_files`](Self::point_cloud_files) to find them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryProvider {
    #[serde(default)]
    samples: HashMap<String, Vec<SampleDataRef>>,
    #[serde(default)]
    captures: HashMap<String, CaptureRecord>,
    #[serde(skip)]
    point_clouds: HashMap<String, Vec<u8>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the captures of a sample. Replaces any previous list.
    pub fn insert_sample(&mut self, sample: impl Into<String>, data: Vec<SampleDataRef>) {
        self.samples.insert(sample.into(), data);
    }

    /// Register a capture. Replaces any previous record with the same token.
    pub fn insert_capture(&mut self, sensor: impl Into<String>, record: CaptureRecord) {
        self.captures.insert(sensor.into(), record);
    }

    /// Attach the raw sweep of a capture.
    pub fn insert_point_cloud(&mut self, sensor: impl Into<String>, bytes: Vec<u8>) {
        self.point_clouds.insert(sensor.into(), bytes);
    }

    /// `(sensor token, file)` for every capture naming a sweep file.
    pub fn point_cloud_files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.captures
            .iter()
            .filter_map(|(token, c)| Some((token.as_str(), c.point_cloud_file.as_deref()?)))
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn capture(&self, sensor: &str) -> Result<&CaptureRecord, V2xError> {
        self.captures
            .get(sensor)
            .ok_or_else(|| V2xError::missing("sample_data", sensor))
    }
}

impl DatasetProvider for InMemoryProvider {
    fn sample_data(&self, sample: &str) -> Result<Vec<SampleDataRef>, V2xError> {
        self.samples
            .get(sample)
            .cloned()
            .ok_or_else(|| V2xError::missing("sample", sample))
    }

    fn calibration(&self, sensor: &str) -> Result<CalibrationRecord, V2xError> {
        Ok(self.capture(sensor)?.calibration.clone())
    }

    fn ego_pose(&self, sensor: &str) -> Result<EgoPoseRecord, V2xError> {
        Ok(self.capture(sensor)?.ego_pose.clone())
    }

    fn point_cloud_bytes(&self, sensor: &str) -> Result<Cow<'_, [u8]>, V2xError> {
        self.point_clouds
            .get(sensor)
            .map(|b| Cow::Borrowed(b.as_slice()))
            .ok_or_else(|| V2xError::missing("point_cloud", sensor))
    }

    fn annotations(&self, sensor: &str) -> Result<Vec<AnnotationRecord>, V2xError> {
        Ok(self.capture(sensor)?.annotations.clone())
    }
}
