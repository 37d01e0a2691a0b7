use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use image::GrayImage;
use infracal_core::{Descriptor, Keypoint, PinholeCamera};
use infracal_pipeline::{
    CalibrationReport, Capabilities, FeatureDetector, InfrastructureCalibration,
    InfrastructureConfig,
};

/// Rig extrinsics calibration from a recorded infrastructure session.
#[derive(Debug, Parser)]
#[command(author, version, about = "Infrastructure-based multi-camera rig calibration")]
struct Args {
    /// Frame sets saved by a capture session.
    #[arg(long)]
    frame_sets: String,

    /// JSON array of PinholeCamera, one per rig camera.
    #[arg(long)]
    cameras: String,

    /// Optional path to JSON InfrastructureConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Refine scene points together with extrinsics and odometry.
    #[arg(long)]
    optimize_scene_points: bool,
}

/// Replayed sessions are already localized; no image is ever processed.
struct NoFeatures;

impl FeatureDetector for NoFeatures {
    fn detect(&self, _image: &GrayImage) -> Vec<Keypoint> {
        Vec::new()
    }

    fn compute(&self, _image: &GrayImage, _keypoints: &[Keypoint]) -> Vec<Descriptor> {
        Vec::new()
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn write_report_json(report: &CalibrationReport) -> Result<String> {
    Ok(report.to_json_pretty()?)
}

fn run_from_files(
    frame_sets_path: &str,
    cameras_path: &str,
    config_path: Option<&str>,
    optimize_scene_points: bool,
) -> Result<String> {
    let cameras: Vec<PinholeCamera> = load_json_file(Path::new(cameras_path))?;

    let mut config = if let Some(cfg_path) = config_path {
        load_json_file::<InfrastructureConfig>(Path::new(cfg_path))?
    } else {
        InfrastructureConfig::default()
    };
    config.refine.optimize_scene_points |= optimize_scene_points;

    let mut calib = InfrastructureCalibration::new(cameras, config, Capabilities::new(NoFeatures))?;
    calib.load_frame_sets(Path::new(frame_sets_path))?;
    let report = calib.run()?;
    write_report_json(&report)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        log::error!("{:#}", err);
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let json = run_from_files(
        &args.frame_sets,
        &args.cameras,
        args.config.as_deref(),
        args.optimize_scene_points,
    )?;
    println!("{}", json);
    Ok(())
}
