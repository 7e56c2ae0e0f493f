//! Per-frame orchestration: validate, filter, accrue, annotate, report.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::annotate::{load_font, AnnotationStyle, FrameAnnotator};
use crate::detect::{Detection, ObjectDetector, RawDetection};
use crate::occupancy::{AccrualPolicy, OccupancyState, OccupancyTracker};
use crate::region::RegionRegistry;

pub const DEFAULT_SUBJECT_CLASS: &str = "cat";
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.1;

/// Everything a pipeline needs, already validated by the caller or by
/// [`crate::config::CatstayConfig::pipeline_settings`].
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub subject_class: String,
    /// Minimum confidence for a subject detection to accrue dwell time.
    pub confidence_threshold: f32,
    pub accrual_policy: AccrualPolicy,
    pub regions: RegionRegistry,
    pub style: AnnotationStyle,
    pub font_path: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn new(regions: RegionRegistry) -> Self {
        Self {
            subject_class: DEFAULT_SUBJECT_CLASS.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            accrual_policy: AccrualPolicy::default(),
            regions,
            style: AnnotationStyle::default(),
            font_path: None,
        }
    }
}

/// Accumulated time for one bucket at report time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub region: String,
    pub seconds: f64,
}

/// Result of one pipeline call.
#[derive(Clone, Debug)]
pub struct Report {
    /// Every valid subject-class detection, including those below the
    /// accrual threshold.
    pub detections: Vec<Detection>,
    pub dominant_region: String,
    pub annotated_image: RgbImage,
    /// Malformed records dropped at the boundary.
    pub skipped: usize,
    pub occupancy: Vec<BucketSnapshot>,
}

/// Serializable part of a [`Report`] (everything except the image).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub detections: Vec<Detection>,
    pub dominant_region: String,
    pub skipped: usize,
    pub occupancy: Vec<BucketSnapshot>,
}

impl Report {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            detections: self.detections.clone(),
            dominant_region: self.dominant_region.clone(),
            skipped: self.skipped,
            occupancy: self.occupancy.clone(),
        }
    }
}

fn snapshot(state: &OccupancyState) -> Vec<BucketSnapshot> {
    state
        .buckets()
        .map(|(region, total)| BucketSnapshot {
            region: region.to_string(),
            seconds: total.as_secs_f64(),
        })
        .collect()
}

/// Long-lived pipeline instance. Owns the occupancy state for the lifetime
/// of the process; `process` may be called from several threads.
pub struct Pipeline {
    subject_class: String,
    confidence_threshold: f32,
    regions: Arc<RegionRegistry>,
    tracker: Mutex<OccupancyTracker>,
    annotator: FrameAnnotator,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        if !(0.0..=1.0).contains(&settings.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold {} outside [0, 1]",
                settings.confidence_threshold
            ));
        }
        if settings.subject_class.trim().is_empty() {
            return Err(anyhow!("subject class must not be empty"));
        }

        let mut annotator = FrameAnnotator::new(settings.style);
        match &settings.font_path {
            Some(path) => annotator = annotator.with_font(load_font(path)?),
            None => log::info!("no label font configured; label text will not be rendered"),
        }

        let regions = Arc::new(settings.regions);
        Ok(Self {
            subject_class: settings.subject_class,
            confidence_threshold: settings.confidence_threshold,
            tracker: Mutex::new(OccupancyTracker::new(
                regions.clone(),
                settings.accrual_policy,
            )),
            regions,
            annotator,
        })
    }

    pub fn regions(&self) -> &RegionRegistry {
        &self.regions
    }

    pub fn subject_class(&self) -> &str {
        &self.subject_class
    }

    /// Copy of the current occupancy state.
    pub fn occupancy(&self) -> Result<OccupancyState> {
        let tracker = self
            .tracker
            .lock()
            .map_err(|_| anyhow!("occupancy tracker lock poisoned"))?;
        Ok(tracker.state().clone())
    }

    /// Process one frame and the detections the model produced for it.
    ///
    /// Malformed records are skipped and counted. All valid subject-class
    /// detections are drawn; only those at or above the confidence threshold
    /// accrue dwell time.
    pub fn process(
        &self,
        image: &RgbImage,
        raw: Vec<RawDetection>,
        now: SystemTime,
    ) -> Result<Report> {
        let mut skipped = 0;
        let mut detections = Vec::new();
        for (index, record) in raw.into_iter().enumerate() {
            match Detection::try_from(record) {
                Ok(detection) if detection.label == self.subject_class => {
                    detections.push(detection)
                }
                Ok(_) => {}
                Err(reason) => {
                    skipped += 1;
                    log::warn!("skipping detection #{}: {}", index, reason);
                }
            }
        }

        let qualifying: Vec<Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .cloned()
            .collect();

        // Read baseline, credit, move baseline: one critical section.
        let (outcome, occupancy) = {
            let mut tracker = self
                .tracker
                .lock()
                .map_err(|_| anyhow!("occupancy tracker lock poisoned"))?;
            let outcome = tracker.accrue(&qualifying, now);
            (outcome, snapshot(tracker.state()))
        };

        let annotated_image = self.annotator.annotate(image, &detections, &self.regions);

        log::info!(
            "{} detections={} qualifying={} skipped={} elapsed={:.1}s dominant={}",
            self.subject_class,
            detections.len(),
            qualifying.len(),
            skipped,
            outcome.elapsed.as_secs_f64(),
            outcome.dominant
        );

        Ok(Report {
            detections,
            dominant_region: outcome.dominant,
            annotated_image,
            skipped,
            occupancy,
        })
    }

    /// Run `detector` on `image`, then [`Pipeline::process`] its output.
    pub fn run(
        &self,
        detector: &mut dyn ObjectDetector,
        image: &RgbImage,
        now: SystemTime,
    ) -> Result<Report> {
        let raw = detector
            .detect(image)
            .map_err(|e| anyhow!("detector '{}' failed: {}", detector.name(), e))?;
        self.process(image, raw, now)
    }
}
