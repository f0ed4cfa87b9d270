use anyhow::Result;

use crate::frame::Frame;

/// Protrusion regressor capability: one fixed-size eye crop in, one
/// millimeter estimate out.
pub trait RegressorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Estimate protrusion for a crop already resized to the model input.
    fn predict(&mut self, input: &Frame) -> Result<f32>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
