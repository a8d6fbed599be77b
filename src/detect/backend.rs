use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object detector capability.
///
/// The model is a black box: given a decoded frame and a confidence threshold it returns
/// `(class id, confidence, box)` triples. Entries with confidence at or above the threshold
/// are returned; the detection filter applies its own, stricter cut afterwards.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &RgbImage, threshold: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
