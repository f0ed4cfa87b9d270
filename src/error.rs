//! Failure taxonomy for a single pipeline run.
//!
//! None of these escape `TwoStagePipeline::run`; they are recovered locally and
//! surface only as the result's status string.

/// Why a pipeline stage degraded.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("{capability} model unavailable: {reason}")]
    ModelUnavailable {
        capability: &'static str,
        reason: String,
    },
    #[error("malformed detector output: {0}")]
    MalformedOutput(String),
    #[error("empty crop for rect x={x:.1} y={y:.1} w={width:.1} h={height:.1}")]
    EmptyCrop {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    #[error("{capability} inference failed: {reason}")]
    Inference {
        capability: &'static str,
        reason: String,
    },
}

impl PipelineError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    pub(crate) fn inference(capability: &'static str, err: &anyhow::Error) -> Self {
        Self::Inference {
            capability,
            reason: format!("{err:#}"),
        }
    }
}
