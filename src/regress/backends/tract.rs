#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::onnx::{self, OnnxPlan};
use crate::regress::backend::RegressorBackend;

/// Tract-based protrusion regressor.
///
/// The estimate is the first element of the first model output.
pub struct TractRegressor {
    model: OnnxPlan,
    width: u32,
    height: u32,
}

impl TractRegressor {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model = onnx::load_model(model_path.as_ref(), width, height)?;
        Ok(Self {
            model,
            width,
            height,
        })
    }
}

impl RegressorBackend for TractRegressor {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(&mut self, input: &Frame) -> Result<f32> {
        let tensor = onnx::frame_to_tensor(input, self.width, self.height)?;
        let outputs = onnx::run(&self.model, tensor)?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values = onnx::flatten(output)?;
        values
            .first()
            .copied()
            .ok_or_else(|| anyhow!("model output was empty"))
    }
}
