//! Annotation records → labeled [`OrientedBox`]es.
//!
//! Annotations are stored in the global frame with `size = [w, l, h]`. A box
//! is built with `dx = l`, `dy = w`, `dz = h` so that its local +x axis is
//! the object's heading.

use tracing::{debug, warn};
use v2x_perception::boxes::OrientedBox;
use v2x_perception::transform::{Quaternion, quaternion_to_yaw};
use v2x_types::{AnnotationRecord, Category, ClassRegistry, DetectionClass, V2xError};

use crate::frames::FrameResolver;
use crate::provider::DatasetProvider;

/// Annotations below this `w·l·h` are spurious.
pub const MIN_BOX_VOLUME: f64 = 0.1;

/// Global-frame boxes visible at capture `sensor`.
///
/// Skipped: categories mapped to `ignore` or listed in `ignored`, unknown
/// categories, boxes under [`MIN_BOX_VOLUME`] and boxes without LiDAR returns.
/// Kept boxes stay in provider order.
pub fn annotated_boxes<P>(
    provider: &P,
    registry: &ClassRegistry,
    sensor: &str,
    ignored: &[DetectionClass],
) -> Result<Vec<OrientedBox>, V2xError>
where
    P: DatasetProvider + ?Sized,
{
    let records = provider.annotations(sensor)?;
    let mut boxes = Vec::with_capacity(records.len());
    for record in &records {
        let class = match registry.categorize(&record.category_name) {
            Some(Category::Detection(class)) if !ignored.contains(&class) => class,
            Some(_) => continue,
            None => {
                warn!(
                    token = %record.token,
                    category = %record.category_name,
                    "skipping annotation with unknown category"
                );
                continue;
            }
        };
        if record.volume() < MIN_BOX_VOLUME || record.max_lidar_pts() < 1 {
            continue;
        }
        boxes.push(record_to_box(record)?.with_label(class));
    }
    debug!(sensor, records = records.len(), kept = boxes.len(), "annotations loaded");
    Ok(boxes)
}

/// [`annotated_boxes`] re-expressed in the frame of the capturing sensor.
pub fn annotated_boxes_in_sensor_frame<P>(
    provider: &P,
    registry: &ClassRegistry,
    sensor: &str,
    ignored: &[DetectionClass],
) -> Result<Vec<OrientedBox>, V2xError>
where
    P: DatasetProvider + ?Sized,
{
    let sensor_from_global = FrameResolver::new(provider).sensor_from_global(sensor)?;
    Ok(annotated_boxes(provider, registry, sensor, ignored)?
        .iter()
        .map(|b| b.transformed(&sensor_from_global))
        .collect())
}

fn record_to_box(record: &AnnotationRecord) -> Result<OrientedBox, V2xError> {
    let [w, l, h] = record.size;
    let yaw = quaternion_to_yaw(Quaternion::from_array(record.rotation).normalized()?);
    OrientedBox::new(record.translation, [l, w, h], yaw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CaptureRecord, InMemoryProvider};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};
    use v2x_types::{CalibrationRecord, EgoPoseRecord};

    fn anno(token: &str, category: &str, size: [f64; 3], seen_by_one: u32) -> AnnotationRecord {
        AnnotationRecord {
            token: token.into(),
            category_name: category.into(),
            translation: [20.0, 10.0, 1.0],
            size,
            // 90° about +Z.
            rotation: [FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2],
            // Only the second agent sees the object.
            num_lidar_pts: vec![0, seen_by_one],
        }
    }

    fn provider(annotations: Vec<AnnotationRecord>) -> InMemoryProvider {
        let mut p = InMemoryProvider::new();
        p.insert_capture(
            "sd0",
            CaptureRecord {
                calibration: CalibrationRecord {
                    token: "cs".into(),
                    translation: [0.0, 0.0, 1.0],
                    rotation: [1.0, 0.0, 0.0, 0.0],
                },
                ego_pose: EgoPoseRecord {
                    token: "ep".into(),
                    timestamp: 0,
                    translation: [10.0, 10.0, 0.0],
                    rotation: [1.0, 0.0, 0.0, 0.0],
                },
                point_cloud_file: None,
                annotations,
            },
        );
        p
    }

    #[test]
    fn builds_labeled_boxes_with_length_along_x() {
        let p = provider(vec![anno("a", "vehicle.car", [1.8, 4.5, 1.5], 12)]);
        let boxes = annotated_boxes(&p, &ClassRegistry::new(), "sd0", &[]).unwrap();
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.center(), [20.0, 10.0, 1.0]);
        assert_eq!(b.size(), [4.5, 1.8, 1.5]);
        assert_abs_diff_eq!(b.yaw(), FRAC_PI_2, epsilon = 1e-12);
        assert_eq!(b.label(), Some(DetectionClass::Car));
    }

    #[test]
    fn filters_ignored_degenerate_and_empty_boxes() {
        let p = provider(vec![
            anno("keep", "human.pedestrian.adult", [0.6, 0.7, 1.7], 3),
            anno("ignore-bucket", "vehicle.emergency.police", [2.0, 5.0, 1.8], 40),
            anno("ignored-class", "vehicle.bicycle", [0.6, 1.8, 1.2], 5),
            anno("tiny", "movable_object.trafficcone", [0.1, 0.1, 0.5], 5),
            anno("no-points", "vehicle.truck", [2.5, 8.0, 3.0], 0),
            anno("unknown", "vehicle.spaceship", [2.0, 2.0, 2.0], 5),
        ]);
        let boxes = annotated_boxes(&p, &ClassRegistry::new(), "sd0", &[DetectionClass::Bicycle]).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label(), Some(DetectionClass::Pedestrian));
    }

    #[test]
    fn sensor_frame_boxes_are_relative_to_the_sensor() {
        let p = provider(vec![anno("a", "vehicle.car", [1.8, 4.5, 1.5], 12)]);
        let boxes = annotated_boxes_in_sensor_frame(&p, &ClassRegistry::new(), "sd0", &[]).unwrap();
        // Sensor sits at (10, 10, 1) in the global frame, axes aligned.
        let c = boxes[0].center();
        assert_abs_diff_eq!(c[0], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(boxes[0].yaw(), FRAC_PI_2, epsilon = 1e-12);
        assert_eq!(boxes[0].label(), Some(DetectionClass::Car));
    }

    #[test]
    fn missing_capture_is_an_error() {
        let p = provider(Vec::new());
        let r = annotated_boxes_in_sensor_frame(&p, &ClassRegistry::new(), "sd1", &[]);
        assert!(matches!(r, Err(V2xError::MissingRecord { .. })));
    }
}
