//! replay - run a recorded detection session through the occupancy pipeline
//!
//! Loads one still image and a session file of timestamped detection batches,
//! feeds every batch through a single pipeline instance (so dwell time
//! accumulates across frames), writes one annotated image per batch and prints
//! the per-frame report summary as JSON lines.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use catstay::config::CatstayConfig;
use catstay::{ObjectDetector, Pipeline, RawDetection, ScriptedDetector};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Still image the detections refer to.
    #[arg(long)]
    image: PathBuf,
    /// Session file: JSON array of {"at_secs": <seconds>, "detections": [...]}.
    #[arg(long)]
    session: PathBuf,
    /// Output directory for annotated frames.
    #[arg(long, default_value = "replay_out")]
    out: PathBuf,
    /// Config file (JSON, or TOML with a .toml extension). Defaults to $CATSTAY_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SessionFrame {
    at_secs: f64,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = match args.config.as_deref() {
        Some(path) => CatstayConfig::load_from(Some(path))?,
        None => CatstayConfig::load()?,
    };
    let pipeline = Pipeline::new(cfg.pipeline_settings()?)?;

    let image = image::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image.display()))?
        .to_rgb8();

    let raw = fs::read_to_string(&args.session)
        .with_context(|| format!("failed to read session {}", args.session.display()))?;
    let frames: Vec<SessionFrame> = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid session file {}: {}", args.session.display(), e))?;

    let timestamps = frames
        .iter()
        .enumerate()
        .map(|(index, frame)| capture_time(index, frame.at_secs))
        .collect::<Result<Vec<_>>>()?;
    let mut detector = ScriptedDetector::new(frames.into_iter().map(|f| f.detections).collect());

    detector
        .warm_up()
        .with_context(|| format!("{} detector failed to warm up", detector.name()))?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    log::info!(
        "replaying {} frames over {} ({} regions, subject={})",
        timestamps.len(),
        args.image.display(),
        pipeline.regions().len(),
        pipeline.subject_class()
    );

    for (index, now) in timestamps.into_iter().enumerate() {
        let report = pipeline.run(&mut detector, &image, now)?;

        let out_path = args.out.join(format!("processed_{:04}.png", index));
        report
            .annotated_image
            .save(&out_path)
            .with_context(|| format!("failed to write {}", out_path.display()))?;

        println!("{}", serde_json::to_string(&report.summary())?);
    }

    let occupancy = pipeline.occupancy()?;
    for (region, total) in occupancy.buckets() {
        log::info!("{}: {:.1}s", region, total.as_secs_f64());
    }
    log::info!("dominant region: {}", occupancy.dominant());
    Ok(())
}

/// Session offsets are seconds since the Unix epoch.
fn capture_time(index: usize, at_secs: f64) -> Result<SystemTime> {
    if !at_secs.is_finite() || at_secs < 0.0 {
        return Err(anyhow!(
            "session frame {} has invalid at_secs {}",
            index,
            at_secs
        ));
    }
    Duration::try_from_secs_f64(at_secs)
        .ok()
        .and_then(|offset| UNIX_EPOCH.checked_add(offset))
        .ok_or_else(|| anyhow!("session frame {} has out-of-range at_secs {}", index, at_secs))
}
