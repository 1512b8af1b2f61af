//! Detection-class registry.
//!
//! Maps the dataset's general category strings onto the ten detection
//! classes (or the `ignore` bucket) and assigns every class a display color.
//! A [`ClassRegistry`] is built once and passed by reference to whatever needs
//! it; there is no global table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// RGB color with channels in `[0, 1]`.
pub type Rgb = [f64; 3];

/// The ten detection classes, in index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    Car,
    Truck,
    ConstructionVehicle,
    Bus,
    Trailer,
    Barrier,
    Motorcycle,
    Bicycle,
    Pedestrian,
    TrafficCone,
}

impl DetectionClass {
    pub const ALL: [DetectionClass; 10] = [
        DetectionClass::Car,
        DetectionClass::Truck,
        DetectionClass::ConstructionVehicle,
        DetectionClass::Bus,
        DetectionClass::Trailer,
        DetectionClass::Barrier,
        DetectionClass::Motorcycle,
        DetectionClass::Bicycle,
        DetectionClass::Pedestrian,
        DetectionClass::TrafficCone,
    ];

    /// Class index used in label arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            DetectionClass::Car => "car",
            DetectionClass::Truck => "truck",
            DetectionClass::ConstructionVehicle => "construction_vehicle",
            DetectionClass::Bus => "bus",
            DetectionClass::Trailer => "trailer",
            DetectionClass::Barrier => "barrier",
            DetectionClass::Motorcycle => "motorcycle",
            DetectionClass::Bicycle => "bicycle",
            DetectionClass::Pedestrian => "pedestrian",
            DetectionClass::TrafficCone => "traffic_cone",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of mapping a general category string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Detection(DetectionClass),
    /// Irrelevant category (animals, emergency vehicles, debris, ...).
    Ignore,
}

/// General category → detection category, as shipped with the dataset tooling.
const GENERAL_TO_DETECTION: [(&str, Category); 23] = [
    ("human.pedestrian.adult", Category::Detection(DetectionClass::Pedestrian)),
    ("human.pedestrian.child", Category::Detection(DetectionClass::Pedestrian)),
    ("human.pedestrian.wheelchair", Category::Ignore),
    ("human.pedestrian.stroller", Category::Ignore),
    ("human.pedestrian.personal_mobility", Category::Ignore),
    ("human.pedestrian.police_officer", Category::Detection(DetectionClass::Pedestrian)),
    ("human.pedestrian.construction_worker", Category::Detection(DetectionClass::Pedestrian)),
    ("animal", Category::Ignore),
    ("vehicle.car", Category::Detection(DetectionClass::Car)),
    ("vehicle.motorcycle", Category::Detection(DetectionClass::Motorcycle)),
    ("vehicle.bicycle", Category::Detection(DetectionClass::Bicycle)),
    ("vehicle.bus.bendy", Category::Detection(DetectionClass::Bus)),
    ("vehicle.bus.rigid", Category::Detection(DetectionClass::Bus)),
    ("vehicle.truck", Category::Detection(DetectionClass::Truck)),
    ("vehicle.construction", Category::Detection(DetectionClass::ConstructionVehicle)),
    ("vehicle.emergency.ambulance", Category::Ignore),
    ("vehicle.emergency.police", Category::Ignore),
    ("vehicle.trailer", Category::Detection(DetectionClass::Trailer)),
    ("movable_object.barrier", Category::Detection(DetectionClass::Barrier)),
    ("movable_object.trafficcone", Category::Detection(DetectionClass::TrafficCone)),
    ("movable_object.pushable_pullable", Category::Ignore),
    ("movable_object.debris", Category::Ignore),
    ("static_object.bicycle_rack", Category::Ignore),
];

/// Immutable category mapping plus per-class colors.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    mapping: HashMap<String, Category>,
    colors: [Rgb; 10],
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// Registry with the dataset's category table and rainbow class colors.
    pub fn new() -> Self {
        let mapping = GENERAL_TO_DETECTION
            .iter()
            .map(|(name, cat)| (name.to_string(), *cat))
            .collect();
        let n = DetectionClass::ALL.len();
        let colors = std::array::from_fn(|i| rainbow(i as f64 / (n - 1) as f64));
        Self { mapping, colors }
    }

    /// Map a general category string. `None` for strings the table does not
    /// know.
    pub fn categorize(&self, general_name: &str) -> Option<Category> {
        self.mapping.get(general_name).copied()
    }

    pub fn color(&self, class: DetectionClass) -> Rgb {
        self.colors[class.index()]
    }

    pub fn colors(&self) -> &[Rgb; 10] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// matplotlib's `rainbow` colormap (256-entry lookup table) sampled at `x`.
pub fn rainbow(x: f64) -> Rgb {
    const LUT_SIZE: f64 = 256.0;
    let idx = (x.clamp(0.0, 1.0) * LUT_SIZE).floor().min(LUT_SIZE - 1.0);
    let t = idx / (LUT_SIZE - 1.0);
    let r = (2.0 * t - 0.5).abs();
    let g = (t * std::f64::consts::PI).sin();
    let b = (t * std::f64::consts::FRAC_PI_2).cos();
    [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]
}
