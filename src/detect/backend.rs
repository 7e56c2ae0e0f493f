use anyhow::Result;
use image::RgbImage;

use crate::detect::result::RawDetection;

/// Object detector seam.
///
/// The model itself lives outside this crate. Implementations wrap whatever
/// runtime produces detections and hand back unvalidated records; the
/// pipeline validates them and drops malformed ones.
///
/// The image is borrowed read-only for the duration of the call.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a decoded frame.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
