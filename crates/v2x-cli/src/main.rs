//! `v2x` – multi-agent LiDAR fusion from the command line.
//!
//! ```text
//! v2x [--config PATH] fuse --scene scene.json --sample TOKEN [--color class]
//! v2x [--config PATH] bev  --scene scene.json --sample TOKEN
//! v2x [--config PATH] init-config [--force]
//! ```
//!
//! Settings come from `~/.v2x/config.toml` (or `--config`), then `V2X_*`
//! environment variables. Without a config file the defaults are used.

mod config;
mod pipeline;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Result, bail};
use argh::FromArgs;
use colored::Colorize;
use tracing::{error, info};

use crate::config::Config;
use crate::pipeline::ColorMode;

#[derive(FromArgs)]
/// Fuse V2X LiDAR sweeps and rasterize them to bird's-eye-view images.
struct Args {
    /// config file (default: ~/.v2x/config.toml)
    #[argh(option)]
    config: Option<PathBuf>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Fuse(FuseArgs),
    Bev(BevArgs),
    InitConfig(InitConfigArgs),
}

#[derive(FromArgs)]
/// Fuse every LiDAR of a sample and write a render scene (JSON).
#[argh(subcommand, name = "fuse")]
struct FuseArgs {
    /// scene bundle (JSON)
    #[argh(option)]
    scene: PathBuf,

    /// sample token
    #[argh(option)]
    sample: String,

    /// point colors: source, foreground or class (default: class)
    #[argh(option, default = "ColorMode::Class")]
    color: ColorMode,
}

#[derive(FromArgs)]
/// Fuse a sample and write occupancy and intensity BEV images.
#[argh(subcommand, name = "bev")]
struct BevArgs {
    /// scene bundle (JSON)
    #[argh(option)]
    scene: PathBuf,

    /// sample token
    #[argh(option)]
    sample: String,
}

#[derive(FromArgs)]
/// Write the default configuration file.
#[argh(subcommand, name = "init-config")]
struct InitConfigArgs {
    /// overwrite an existing file
    #[argh(switch)]
    force: bool,
}

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); V2X_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("V2X_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    let args: Args = argh::from_env();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("{}: {e:#}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    match args.command {
        Command::InitConfig(cmd) => init_config(&config_path, cmd.force),
        Command::Fuse(cmd) => {
            let cfg = resolve_config(args.config.as_deref())?;
            let s = pipeline::run_fuse(&cfg, &cmd.scene, &cmd.sample, cmd.color)?;
            println!(
                "  {} {} points from {} LiDAR(s), {} box(es), {} foreground point(s)",
                "✓".green(),
                s.points,
                s.sensors,
                s.boxes,
                s.foreground
            );
            println!("    scene → {}", s.output.display().to_string().bold());
            Ok(())
        }
        Command::Bev(cmd) => {
            let cfg = resolve_config(args.config.as_deref())?;
            let s = pipeline::run_bev(&cfg, &cmd.scene, &cmd.sample)?;
            println!(
                "  {} {}x{} grid, {} point(s) in range, {} occupied pixel(s)",
                "✓".green(),
                s.width,
                s.height,
                s.points,
                s.occupied
            );
            println!("    occupancy → {}", s.occupancy.display().to_string().bold());
            println!("    intensity → {}", s.intensity.display().to_string().bold());
            Ok(())
        }
    }
}

/// An explicit `--config` must exist; the default location may be absent.
fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match config::load(explicit)? {
        Some(cfg) => {
            info!(reference = %cfg.reference_channel, "config loaded");
            Ok(cfg)
        }
        None => match explicit {
            Some(p) => bail!("config file {} does not exist", p.display()),
            None => {
                info!("no config file, using defaults");
                let mut cfg = Config::default();
                config::apply_env_overrides(&mut cfg);
                Ok(cfg)
            }
        },
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    config::save_to(&Config::default(), path)?;
    println!("  {} wrote {}", "✓".green(), path.display().to_string().bold());
    Ok(())
}
