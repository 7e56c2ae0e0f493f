use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::RawDetection;

/// Replays pre-recorded detection batches, one per `detect` call.
///
/// Once the script runs out every further call returns no detections.
pub struct ScriptedDetector {
    frames: VecDeque<Vec<RawDetection>>,
    calls: u64,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            frames: frames.into(),
            calls: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ObjectDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}
