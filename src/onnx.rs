#![cfg(feature = "backend-tract")]
//! Shared tract plumbing for the ONNX detector and regressor backends.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::frame::Frame;

pub(crate) type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Load an ONNX model with a fixed `1x3xHxW` f32 input and prepare it for inference.
pub(crate) fn load_model(model_path: &Path, width: u32, height: u32) -> Result<OnnxPlan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// NCHW tensor scaled to 0..1. The frame must already match the model input.
pub(crate) fn frame_to_tensor(frame: &Frame, width: u32, height: u32) -> Result<Tensor> {
    if frame.dimensions() != (width, height) {
        return Err(anyhow!(
            "frame size {}x{} does not match model input {}x{}",
            frame.width(),
            frame.height(),
            width,
            height
        ));
    }
    let pixels = frame.pixels();
    let width = width as usize;
    let input = tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width),
        |(_, channel, y, x)| {
            let idx = (y * width + x) * 3 + channel;
            pixels[idx] as f32 / 255.0
        },
    );
    Ok(input.into_tensor())
}

/// Run the plan on one tensor.
pub(crate) fn run(plan: &OnnxPlan, input: Tensor) -> Result<TVec<TValue>> {
    plan.run(tvec!(input.into())).context("ONNX inference failed")
}

/// Flatten one output tensor to f32 values.
pub(crate) fn flatten(output: &TValue) -> Result<Vec<f32>> {
    let view = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    Ok(view.iter().copied().collect())
}
