//! Pipeline configuration – reads/writes `~/.v2x/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use v2x_perception::boxes::DEFAULT_BOX_TOLERANCE;
use v2x_perception::fusion::{DEFAULT_MIN_PLANAR_DISTANCE, FusionOptions};
use v2x_perception::raster::PointCloudRange;

/// Persisted pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// BEV region in the reference LiDAR frame:
    /// `[x_min, y_min, z_min, x_max, y_max, z_max]` in metres.
    #[serde(default = "default_point_cloud_range")]
    pub point_cloud_range: [f64; 6],

    /// Metres per BEV pixel.
    #[serde(default = "default_bev_resolution")]
    pub bev_resolution: f64,

    /// Returns closer than this to their LiDAR on the xy-plane are dropped.
    #[serde(default = "default_min_planar_distance")]
    pub min_planar_distance: f64,

    /// Slack added to box extents for point-in-box tests.
    #[serde(default = "default_box_tolerance")]
    pub box_tolerance: f64,

    /// LiDAR channel whose frame the fused cloud is expressed in.
    #[serde(default = "default_reference_channel")]
    pub reference_channel: String,

    /// Where `fuse` and `bev` write their outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_point_cloud_range() -> [f64; 6] {
    [-51.2, -51.2, -25.0, 51.2, 51.2, 3.0]
}
fn default_bev_resolution() -> f64 {
    0.2
}
fn default_min_planar_distance() -> f64 {
    DEFAULT_MIN_PLANAR_DISTANCE
}
fn default_box_tolerance() -> f64 {
    DEFAULT_BOX_TOLERANCE
}
fn default_reference_channel() -> String {
    "LIDAR_TOP_id_1".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("v2x-out")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            point_cloud_range: default_point_cloud_range(),
            bev_resolution: default_bev_resolution(),
            min_planar_distance: default_min_planar_distance(),
            box_tolerance: default_box_tolerance(),
            reference_channel: default_reference_channel(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    pub fn range(&self) -> Result<PointCloudRange> {
        PointCloudRange::from_slice(&self.point_cloud_range).context("invalid `point_cloud_range` in config")
    }

    pub fn fusion_options(&self) -> FusionOptions {
        FusionOptions {
            min_planar_distance: Some(self.min_planar_distance),
        }
    }
}

/// Return the path to `~/.v2x/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".v2x").join("config.toml")
}

/// Load the config from `path`, or the default location when `None`, then
/// apply environment overrides. Returns `Ok(None)` if the file does not exist.
pub fn load(path: Option<&Path>) -> Result<Option<Config>> {
    let loaded = match path {
        Some(p) => load_from(p)?,
        None => load_from(&config_path())?,
    };
    Ok(loaded.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read config at {}", path.display()))?;
    let cfg = toml::from_str(&raw).with_context(|| format!("failed to parse config at {}", path.display()))?;
    Ok(Some(cfg))
}

/// Apply `V2X_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `V2X_REFERENCE_CHANNEL` | `reference_channel` |
/// | `V2X_BEV_RESOLUTION` | `bev_resolution` |
/// | `V2X_MIN_PLANAR_DISTANCE` | `min_planar_distance` |
/// | `V2X_OUTPUT_DIR` | `output_dir` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from `lookup`, keyed by the `V2X_*` variable names.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("V2X_REFERENCE_CHANNEL") {
        cfg.reference_channel = v;
    }
    if let Some(v) = lookup("V2X_BEV_RESOLUTION")
        && let Ok(r) = v.parse::<f64>()
    {
        cfg.bev_resolution = r;
    }
    if let Some(v) = lookup("V2X_MIN_PLANAR_DISTANCE")
        && let Ok(d) = v.parse::<f64>()
    {
        cfg.min_planar_distance = d;
    }
    if let Some(v) = lookup("V2X_OUTPUT_DIR") {
        cfg.output_dir = PathBuf::from(v);
    }
}

/// Save the config to `path`, creating parent directories if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("failed to serialize config")?;
    fs::write(path, raw).with_context(|| format!("failed to write config at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.point_cloud_range, [-51.2, -51.2, -25.0, 51.2, 51.2, 3.0]);
        assert_eq!(loaded.bev_resolution, 0.2);
        assert_eq!(loaded.box_tolerance, DEFAULT_BOX_TOLERANCE);
        assert_eq!(loaded.reference_channel, "LIDAR_TOP_id_1");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("partial.toml");
        fs::write(&path, "bev_resolution = 0.5\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.bev_resolution, 0.5);
        assert_eq!(cfg.min_planar_distance, DEFAULT_MIN_PLANAR_DISTANCE);
        assert_eq!(cfg.output_dir, PathBuf::from("v2x-out"));
    }

    #[test]
    fn config_path_points_to_v2x_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".v2x"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        fs::write(&path, "bev_resolution = \"fine\"\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn range_is_validated() {
        let mut cfg = Config::default();
        assert!(cfg.range().is_ok());
        cfg.point_cloud_range = [1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        assert!(cfg.range().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_change_reference_channel() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, vars(&[("V2X_REFERENCE_CHANNEL", "LIDAR_TOP_id_0")]));
        assert_eq!(cfg.reference_channel, "LIDAR_TOP_id_0");
    }

    #[test]
    fn overrides_ignore_invalid_number() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, vars(&[("V2X_MIN_PLANAR_DISTANCE", "far")]));
        assert_eq!(cfg.min_planar_distance, DEFAULT_MIN_PLANAR_DISTANCE);
    }

    #[test]
    fn overrides_change_resolution_and_output_dir() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            vars(&[("V2X_BEV_RESOLUTION", "0.4"), ("V2X_OUTPUT_DIR", "/tmp/bev")]),
        );
        assert_eq!(cfg.bev_resolution, 0.4);
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/bev"));
    }

    #[test]
    fn no_overrides_leave_config_untouched() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, vars(&[]));
        assert_eq!(cfg, Config::default());
    }
}
