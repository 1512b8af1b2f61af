//! The `fuse` and `bev` pipelines over a scene bundle.
//!
//! A scene bundle is a JSON [`InMemoryProvider`] whose captures name their
//! `.bin` sweeps relative to the bundle file.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use image::GrayImage;
use tracing::{debug, info};
use v2x_dataset::annotations::annotated_boxes_in_sensor_frame;
use v2x_dataset::lidar::POINT_FEATURES;
use v2x_dataset::provider::InMemoryProvider;
use v2x_dataset::sample::{available_lidar_channels, available_point_clouds};
use v2x_perception::boxes::find_points_in_boxes_indexed;
use v2x_perception::fusion::FusedPointCloud;
use v2x_perception::raster::{BevImage, filter_points_in_range, orthogonal_projection};
use v2x_perception::render::{RenderScene, box_colors, class_colors, foreground_colors, source_colors};
use v2x_types::ClassRegistry;

use crate::config::Config;

const INTENSITY_COLUMN: usize = POINT_FEATURES - 1;

/// How `fuse` colors points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// By the LiDAR that captured them.
    Source,
    /// Red inside any box, black elsewhere.
    Foreground,
    /// By the class of the containing box.
    Class,
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Self::Source),
            "foreground" => Ok(Self::Foreground),
            "class" => Ok(Self::Class),
            other => Err(format!("unknown color mode `{other}` (expected source, foreground or class)")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scene loading
// ─────────────────────────────────────────────────────────────────────────────

/// Read a scene bundle and the sweeps it references.
pub fn load_scene(path: &Path) -> Result<InMemoryProvider> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read scene {}", path.display()))?;
    let mut provider: InMemoryProvider =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse scene {}", path.display()))?;

    let base = path.parent().unwrap_or(Path::new("."));
    let files: Vec<(String, PathBuf)> = provider
        .point_cloud_files()
        .map(|(token, file)| (token.to_string(), base.join(file)))
        .collect();
    for (token, file) in files {
        let bytes = fs::read(&file).with_context(|| format!("failed to read sweep {}", file.display()))?;
        debug!(token = %token, bytes = bytes.len(), "sweep loaded");
        provider.insert_point_cloud(token, bytes);
    }
    info!(scene = %path.display(), samples = provider.num_samples(), "scene loaded");
    Ok(provider)
}

fn fuse_sample(provider: &InMemoryProvider, cfg: &Config, sample: &str) -> Result<FusedPointCloud> {
    available_point_clouds(provider, sample, &cfg.reference_channel, &cfg.fusion_options())
        .with_context(|| format!("failed to fuse sample `{sample}` into {}", cfg.reference_channel))
}

// ─────────────────────────────────────────────────────────────────────────────
// fuse
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FuseSummary {
    pub points: usize,
    pub sensors: usize,
    pub boxes: usize,
    pub foreground: usize,
    pub output: PathBuf,
}

/// Fuse every LiDAR of `sample`, assign points to the annotated boxes and
/// write a [`RenderScene`] to `<output_dir>/<sample>.json`.
pub fn run_fuse(cfg: &Config, scene: &Path, sample: &str, color: ColorMode) -> Result<FuseSummary> {
    let provider = load_scene(scene)?;
    let fused = fuse_sample(&provider, cfg, sample)?;

    let reference = available_lidar_channels(&provider, sample)?
        .into_iter()
        .find(|d| d.channel == cfg.reference_channel)
        .ok_or_else(|| anyhow!("{} did not capture sample `{sample}`", cfg.reference_channel))?;

    let registry = ClassRegistry::new();
    let boxes = annotated_boxes_in_sensor_frame(&provider, &registry, &reference.token, &[])
        .with_context(|| format!("failed to load annotations for `{}`", reference.token))?;
    let assignment = find_points_in_boxes_indexed(fused.points(), &boxes, cfg.box_tolerance);

    let point_colors = match color {
        ColorMode::Source => source_colors(&fused),
        ColorMode::Foreground => foreground_colors(&assignment),
        ColorMode::Class => class_colors(&assignment, &boxes, &registry),
    };
    let render = RenderScene::new(fused.points())
        .with_point_colors(point_colors)
        .with_boxes(&boxes, Some(box_colors(&boxes, &registry)));

    fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("failed to create {}", cfg.output_dir.display()))?;
    let output = cfg.output_dir.join(format!("{sample}.json"));
    let file = File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &render)
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(FuseSummary {
        points: fused.len(),
        sensors: fused.sensors().len(),
        boxes: boxes.len(),
        foreground: assignment.foreground_mask().iter().filter(|f| **f).count(),
        output,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// bev
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct BevSummary {
    pub width: usize,
    pub height: usize,
    pub points: usize,
    pub occupied: usize,
    pub occupancy: PathBuf,
    pub intensity: PathBuf,
}

/// Fuse `sample`, rasterize it over the configured range and write
/// `occupancy.png` and `intensity.png` under `<output_dir>/<sample>/`.
pub fn run_bev(cfg: &Config, scene: &Path, sample: &str) -> Result<BevSummary> {
    let range = cfg.range()?;
    let provider = load_scene(scene)?;
    let fused = fuse_sample(&provider, cfg, sample)?;

    let inside = filter_points_in_range(fused.points(), &range);
    let projection = orthogonal_projection(&inside, &range, cfg.bev_resolution)?;
    let occupancy = projection.occupancy();
    let intensity = projection.mean_feature(&inside, INTENSITY_COLUMN)?;

    let dir = cfg.output_dir.join(sample);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let occupancy_path = dir.join("occupancy.png");
    let intensity_path = dir.join("intensity.png");
    save_gray(&occupancy, 1.0, &occupancy_path)?;
    let peak = intensity.max_value();
    save_gray(&intensity, if peak > 0.0 { 255.0 / peak } else { 0.0 }, &intensity_path)?;

    Ok(BevSummary {
        width: projection.width(),
        height: projection.height(),
        points: inside.len(),
        occupied: projection.pixels().len(),
        occupancy: occupancy_path,
        intensity: intensity_path,
    })
}

/// Write `img * scale` as an 8-bit PNG with +y pointing up.
fn save_gray(img: &BevImage, scale: f64, path: &Path) -> Result<()> {
    let pixels: Vec<u8> = img
        .data()
        .iter()
        .map(|v| (v * scale).round().clamp(0.0, 255.0) as u8)
        .collect();
    let Some(buf) = GrayImage::from_raw(img.width() as u32, img.height() as u32, pixels) else {
        bail!("raster of {}x{} does not match its data", img.width(), img.height());
    };
    image::imageops::flip_vertical(&buf)
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2x_dataset::provider::CaptureRecord;
    use v2x_types::{AnnotationRecord, CalibrationRecord, EgoPoseRecord, SampleDataRef};

    fn sweep(rows: &[[f32; 5]]) -> Vec<u8> {
        rows.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn capture(ego_x: f64, file: &str, annotations: Vec<AnnotationRecord>) -> CaptureRecord {
        CaptureRecord {
            calibration: CalibrationRecord {
                token: "cs".into(),
                translation: [0.0, 0.0, 0.0],
                rotation: [1.0, 0.0, 0.0, 0.0],
            },
            ego_pose: EgoPoseRecord {
                token: "ep".into(),
                timestamp: 0,
                translation: [ego_x, 0.0, 0.0],
                rotation: [1.0, 0.0, 0.0, 0.0],
            },
            point_cloud_file: Some(file.into()),
            annotations,
        }
    }

    /// Two agents 10 m apart and one car at x = 5 (global).
    fn write_scene(dir: &Path) -> PathBuf {
        let car = AnnotationRecord {
            token: "car".into(),
            category_name: "vehicle.car".into(),
            translation: [5.0, 0.0, 0.0],
            size: [2.0, 4.0, 2.0],
            rotation: [1.0, 0.0, 0.0, 0.0],
            num_lidar_pts: vec![10],
        };
        let mut p = InMemoryProvider::new();
        p.insert_sample(
            "s0",
            vec![
                SampleDataRef {
                    channel: "LIDAR_TOP_id_1".into(),
                    token: "sd1".into(),
                },
                SampleDataRef {
                    channel: "LIDAR_TOP_id_2".into(),
                    token: "sd2".into(),
                },
            ],
        );
        p.insert_capture("sd1", capture(0.0, "sweeps/sd1.bin", vec![car]));
        p.insert_capture("sd2", capture(10.0, "sweeps/sd2.bin", Vec::new()));

        fs::create_dir_all(dir.join("sweeps")).expect("mkdir");
        fs::write(
            dir.join("sweeps/sd1.bin"),
            sweep(&[[5.0, 0.5, 0.0, 100.0, 0.0], [-20.0, 3.0, 0.0, 20.0, 0.0]]),
        )
        .expect("write");
        fs::write(dir.join("sweeps/sd2.bin"), sweep(&[[-4.5, 0.0, 0.5, 50.0, 0.0]])).expect("write");

        let path = dir.join("scene.json");
        fs::write(&path, serde_json::to_string(&p).expect("json")).expect("write");
        path
    }

    fn config(out: &Path) -> Config {
        Config {
            output_dir: out.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn color_mode_parses() {
        assert_eq!("class".parse::<ColorMode>(), Ok(ColorMode::Class));
        assert_eq!("source".parse::<ColorMode>(), Ok(ColorMode::Source));
        assert!("rainbow".parse::<ColorMode>().is_err());
    }

    #[test]
    fn scene_loads_sweeps_relative_to_bundle() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let scene = write_scene(dir.path());
        let provider = load_scene(&scene).expect("load");
        let cloud = available_point_clouds(&provider, "s0", "LIDAR_TOP_id_1", &Default::default()).expect("fuse");
        assert_eq!(cloud.len(), 3);
    }

    #[test]
    fn missing_sweep_is_reported() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let scene = write_scene(dir.path());
        fs::remove_file(dir.path().join("sweeps/sd2.bin")).expect("rm");
        let err = load_scene(&scene).unwrap_err();
        assert!(format!("{err:#}").contains("sd2.bin"));
    }

    #[test]
    fn fuse_writes_render_scene() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let scene = write_scene(dir.path());
        let cfg = config(&dir.path().join("out"));

        let summary = run_fuse(&cfg, &scene, "s0", ColorMode::Foreground).expect("fuse");
        assert_eq!(summary.points, 3);
        assert_eq!(summary.sensors, 2);
        assert_eq!(summary.boxes, 1);
        // One point from each agent lands on the car.
        assert_eq!(summary.foreground, 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&summary.output).expect("read")).expect("parse");
        assert_eq!(json["points"].as_array().expect("points").len(), 3);
        assert_eq!(json["boxes"].as_array().expect("boxes").len(), 1);
        assert_eq!(json["point_colors"][0], serde_json::json!([1.0, 0.0, 0.0]));
    }

    #[test]
    fn fuse_rejects_unknown_reference() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let scene = write_scene(dir.path());
        let cfg = Config {
            reference_channel: "LIDAR_TOP_id_5".into(),
            ..config(dir.path())
        };
        assert!(run_fuse(&cfg, &scene, "s0", ColorMode::Class).is_err());
    }

    #[test]
    fn bev_writes_both_rasters() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let scene = write_scene(dir.path());
        let cfg = Config {
            point_cloud_range: [-10.0, -10.0, -5.0, 10.0, 10.0, 5.0],
            bev_resolution: 1.0,
            ..config(&dir.path().join("out"))
        };

        let summary = run_bev(&cfg, &scene, "s0").expect("bev");
        assert_eq!((summary.width, summary.height), (20, 20));
        // The point at x = -20 falls outside the range.
        assert_eq!(summary.points, 2);
        // (5, 0.5) and (5.5, 0) share pixel (15, 10).
        assert_eq!(summary.occupied, 1);

        let occupancy = image::open(&summary.occupancy).expect("png").to_luma8();
        assert_eq!(occupancy.dimensions(), (20, 20));
        // Flipped so +y is up: pixel_y 10 is image row 9.
        assert_eq!(occupancy.get_pixel(15, 9).0, [255]);
        assert_eq!(occupancy.get_pixel(15, 10).0, [0]);

        let intensity = image::open(&summary.intensity).expect("png").to_luma8();
        assert_eq!(intensity.get_pixel(15, 9).0, [255]);
    }
}
