use anyhow::Result;

use crate::detect::result::RawDetections;
use crate::frame::Frame;

/// Periocular detector capability.
///
/// The pipeline hands over a frame already resized to the model input size
/// together with the IoU and confidence thresholds. Implementations apply
/// thresholding and NMS themselves and return the surviving candidates in the
/// two-array layout of [`RawDetections`].
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a fixed-size frame.
    fn detect(
        &mut self,
        input: &Frame,
        iou_threshold: f32,
        confidence_threshold: f32,
    ) -> Result<RawDetections>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
