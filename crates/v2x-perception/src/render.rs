//! Render-ready arrays for external viewers.
//!
//! Nothing here draws. A [`RenderScene`] bundles the points, per-point colors,
//! box corners and per-box colors a 3-D viewer needs, and serialises to JSON.

use serde::Serialize;
use v2x_types::{ClassRegistry, Rgb, SensorId};

use crate::boxes::{BoxAssignment, OrientedBox};
use crate::fusion::FusedPointCloud;
use crate::pointcloud::PointCloud;
use crate::transform::Vec3;

/// Corner-index pairs drawing a box: front face, back face, the four
/// front-to-back edges, and the two front diagonals marking the heading.
pub const BOX_EDGES: [[usize; 2]; 14] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
    [0, 2],
    [1, 3],
];

pub const FOREGROUND: Rgb = [1.0, 0.0, 0.0];
pub const BACKGROUND: Rgb = [0.0, 0.0, 0.0];

/// Palette cycled over fusion sources.
const SOURCE_PALETTE: [Rgb; 6] = [
    [0.12, 0.47, 0.71],
    [1.0, 0.5, 0.05],
    [0.17, 0.63, 0.17],
    [0.84, 0.15, 0.16],
    [0.58, 0.4, 0.74],
    [0.55, 0.34, 0.29],
];

/// Everything a viewer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderScene {
    pub points: Vec<Vec3>,
    pub point_colors: Option<Vec<Rgb>>,
    pub boxes: Vec<[Vec3; 8]>,
    pub box_colors: Option<Vec<Rgb>>,
    pub edges: [[usize; 2]; 14],
}

impl RenderScene {
    pub fn new(points: &PointCloud) -> Self {
        Self {
            points: points.to_xyz(),
            point_colors: None,
            boxes: Vec::new(),
            box_colors: None,
            edges: BOX_EDGES,
        }
    }

    /// Attach per-point colors. Ignored unless there is one per point.
    pub fn with_point_colors(mut self, colors: Vec<Rgb>) -> Self {
        if colors.len() == self.points.len() {
            self.point_colors = Some(colors);
        }
        self
    }

    pub fn with_boxes(mut self, boxes: &[OrientedBox], colors: Option<Vec<Rgb>>) -> Self {
        self.boxes = boxes.iter().map(OrientedBox::corners).collect();
        self.box_colors = colors.filter(|c| c.len() == boxes.len());
        self
    }
}

/// One color per fusion source, cycling the palette in order of appearance.
pub fn source_colors(fused: &FusedPointCloud) -> Vec<Rgb> {
    let sensors: Vec<SensorId> = fused.sensors();
    fused
        .source_index()
        .iter()
        .map(|s| {
            let slot = sensors.iter().position(|x| x == s).unwrap_or(0);
            SOURCE_PALETTE[slot % SOURCE_PALETTE.len()]
        })
        .collect()
}

/// Red for points inside some box, black otherwise.
pub fn foreground_colors(assignment: &BoxAssignment) -> Vec<Rgb> {
    assignment
        .as_slice()
        .iter()
        .map(|a| if a.is_some() { FOREGROUND } else { BACKGROUND })
        .collect()
}

/// Points take the class color of their box; unlabeled boxes and background
/// points are black.
pub fn class_colors(assignment: &BoxAssignment, boxes: &[OrientedBox], registry: &ClassRegistry) -> Vec<Rgb> {
    assignment
        .as_slice()
        .iter()
        .map(|a| {
            a.and_then(|b| boxes.get(b))
                .and_then(OrientedBox::label)
                .map_or(BACKGROUND, |c| registry.color(c))
        })
        .collect()
}

/// Class color for each box, red when a box carries no label.
pub fn box_colors(boxes: &[OrientedBox], registry: &ClassRegistry) -> Vec<Rgb> {
    boxes
        .iter()
        .map(|b| b.label().map_or(FOREGROUND, |c| registry.color(c)))
        .collect()
}
