//! Exophthalmometer
//!
//! Measures eye protrusion (exophthalmos) in millimetres from a face image.
//!
//! # Architecture
//!
//! Every measurement is a two-stage run:
//!
//! 1. **Detect**: a periocular detector finds the left (`L`) and right (`R`)
//!    eye regions in a 640x640 rescale of the frame.
//! 2. **Gate**: the run is accepted only with at most one detection per side
//!    and at least one eye overall.
//! 3. **Regress**: each accepted eye is cropped from the full-resolution frame,
//!    rescaled to 224x224, and passed to a protrusion regressor.
//! 4. **Annotate**: detected boxes are drawn on a copy of the frame.
//!
//! A side that is not measured keeps its previous estimate, so a live view
//! never flickers back to zero.
//!
//! # Module Structure
//!
//! - `geometry`: detector output decoding, normalized/pixel rectangles
//! - `gate`: detection acceptance rule
//! - `crop`, `overlay`: pure image operations
//! - `detect`, `regress`: model capabilities and their backends
//! - `pipeline`: `TwoStagePipeline` and single-shot runs
//! - `sampler`: `StreamingSampler` for live sources
//! - `ingest`: frame sources and pixel format normalization
//! - `config`: pipeline and application configuration

use std::fmt;

pub mod config;
pub mod crop;
pub mod detect;
pub mod error;
pub mod frame;
pub mod gate;
pub mod geometry;
pub mod ingest;
#[cfg(feature = "backend-tract")]
mod onnx;
pub mod overlay;
pub mod pipeline;
pub mod regress;
pub mod sampler;

pub use config::{AppConfig, BackendKind, ModelSettings, PipelineConfig, SourceSettings};
pub use detect::{DetectorBackend, RawDetections, StubBackend};
pub use error::PipelineError;
pub use frame::{Frame, FrameSlot, Rotation};
pub use gate::Rejection;
pub use geometry::{Detection, Label, PixelRect, Side};
pub use ingest::{FrameSource, ManualFeed, ManualSource, PixelFormat};
pub use pipeline::{spawn_single_shot, Capability, TwoStagePipeline};
pub use regress::{RegressorBackend, StubRegressor};
pub use sampler::{
    IntervalTicker, ManualTicker, PresentationSink, SamplerState, SamplerStats,
    StreamingSampler, TickHandle, Ticker,
};

// ----------------------------------------------------------------------------
// Measurement results
// ----------------------------------------------------------------------------

/// Per-side protrusion estimates in millimetres.
///
/// Used both as a run's output and as the prior for the next run. Both sides
/// start at 0.0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Estimates {
    pub right_mm: f64,
    pub left_mm: f64,
}

impl Estimates {
    pub fn get(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_mm,
            Side::Right => self.right_mm,
        }
    }

    /// Copy with `side` replaced.
    pub fn with(self, side: Side, mm: f64) -> Self {
        match side {
            Side::Left => Self {
                left_mm: mm,
                ..self
            },
            Side::Right => Self {
                right_mm: mm,
                ..self
            },
        }
    }
}

impl fmt::Display for Estimates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Right: {:.1}mm, Left: {:.1}mm",
            self.right_mm, self.left_mm
        )
    }
}

/// What a run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The gate accepted the detections. The flags say which sides received a
    /// fresh estimate; a side can be detected yet not measured if its crop or
    /// regression failed.
    Measured { left: bool, right: bool },
    /// The gate refused the detections; both estimates are the prior.
    Rejected(Rejection),
}

/// Output of one pipeline run. Owned by the receiver; never mutated.
#[derive(Clone, Debug)]
pub struct MeasurementResult {
    estimates: Estimates,
    annotated: Frame,
    outcome: Outcome,
    status: Option<String>,
}

impl MeasurementResult {
    pub(crate) fn new(
        estimates: Estimates,
        annotated: Frame,
        outcome: Outcome,
        status: Option<String>,
    ) -> Self {
        Self {
            estimates,
            annotated,
            outcome,
            status,
        }
    }

    pub fn right_mm(&self) -> f64 {
        self.estimates.right_mm
    }

    pub fn left_mm(&self) -> f64 {
        self.estimates.left_mm
    }

    pub fn estimates(&self) -> Estimates {
        self.estimates
    }

    /// Input frame with detection boxes drawn, or the input itself when the
    /// gate rejected the run.
    pub fn annotated(&self) -> &Frame {
        &self.annotated
    }

    pub fn into_annotated(self) -> Frame {
        self.annotated
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Why the run degraded, if it did.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// `Right: 17.2mm, Left: 16.8mm`
    pub fn summary(&self) -> String {
        self.estimates.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_replace_one_side() {
        let base = Estimates {
            right_mm: 1.0,
            left_mm: 2.0,
        };
        let next = base.with(Side::Left, 5.0);
        assert_eq!(next.right_mm, 1.0);
        assert_eq!(next.get(Side::Left), 5.0);
        assert_eq!(base.left_mm, 2.0);
    }

    #[test]
    fn summary_uses_one_decimal() {
        let result = MeasurementResult::new(
            Estimates {
                right_mm: 17.24,
                left_mm: 0.0,
            },
            Frame::filled(1, 1, [0, 0, 0]),
            Outcome::Measured {
                left: false,
                right: true,
            },
            None,
        );
        assert_eq!(result.summary(), "Right: 17.2mm, Left: 0.0mm");
        assert_eq!(Estimates::default().to_string(), "Right: 0.0mm, Left: 0.0mm");
        assert_eq!(result.into_annotated().dimensions(), (1, 1));
    }
}
