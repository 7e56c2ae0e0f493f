//! catstay: region-occupancy tracking for a single camera subject.
//!
//! Given a still frame and the detections an external model produced for it,
//! the pipeline keeps a running tally of how long the subject (a cat, by
//! default) has spent in each named region of the frame, reports the region
//! it has occupied longest, and renders an annotated copy of the frame.
//!
//! # Module Structure
//!
//! - `region`: boxes, the inclusive overlap test, the ordered region registry
//! - `detect`: detection records, boundary validation, the detector seam
//! - `occupancy`: dwell-time state and the only code that mutates it
//! - `annotate`: box/label/region rendering
//! - `pipeline`: per-frame orchestration and reports
//! - `config`: file + environment configuration
//!
//! The model, image I/O and any transport are outside this crate.

use anyhow::{anyhow, Result};
use std::sync::OnceLock;

pub mod annotate;
pub mod config;
pub mod detect;
pub mod occupancy;
pub mod pipeline;
pub mod region;

pub use annotate::{AnnotationStyle, FrameAnnotator, LabelLayout};
pub use detect::{Detection, ObjectDetector, RawDetection, RejectReason, ScriptedDetector};
pub use occupancy::{AccrualOutcome, AccrualPolicy, OccupancyState, OccupancyTracker};
pub use pipeline::{BucketSnapshot, Pipeline, PipelineSettings, Report, ReportSummary};
pub use region::{overlaps, BoundingBox, Region, RegionRegistry};

/// Bucket for qualifying detections that overlap no region.
pub const ELSEWHERE: &str = "elsewhere";

/// Dominant-region value when nothing has ever been classified.
pub const NONE: &str = "none";

// -------------------- Region Name Discipline --------------------

/// Region names double as report keys, so they are restricted to a small
/// lowercase alphabet and may not collide with the sentinel buckets.
///
/// Allowed: "sofa", "window_sill", "cat-tree"
/// Disallowed: whitespace, slashes, other punctuation, "elsewhere", "none".
pub fn validate_region_name(name: &str) -> Result<()> {
    static REGION_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = REGION_NAME_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_-]{1,64}$").unwrap());

    let name = name.to_lowercase();
    if !re.is_match(&name) {
        return Err(anyhow!(
            "invalid region config: region name '{}' must match ^[a-z0-9_-]{{1,64}}$",
            name
        ));
    }
    if name == ELSEWHERE || name == NONE {
        return Err(anyhow!(
            "invalid region config: region name '{}' is reserved",
            name
        ));
    }
    Ok(())
}
