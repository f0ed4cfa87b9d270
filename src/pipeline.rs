//! Two-stage measurement: detect periocular regions, then regress protrusion
//! per accepted eye.

use anyhow::{Context, Result};
use std::thread::JoinHandle;

use crate::config::{ModelSettings, PipelineConfig};
use crate::crop::crop;
use crate::detect::{self, DetectorBackend};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::gate;
use crate::geometry::{decode_detections, to_pixel_rect, Detection, PixelRect, Side};
use crate::overlay;
use crate::regress::{self, RegressorBackend};
use crate::{Estimates, MeasurementResult, Outcome};

/// A model handle constructed once per session.
///
/// `Unavailable` keeps the construction failure so every run can report it
/// instead of retrying the load.
pub enum Capability<B: ?Sized> {
    Ready(Box<B>),
    Unavailable(String),
}

impl<B: ?Sized> Capability<B> {
    pub fn from_result(result: Result<Box<B>>) -> Self {
        match result {
            Ok(backend) => Capability::Ready(backend),
            Err(err) => Capability::Unavailable(format!("{err:#}")),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Capability::Ready(_))
    }
}

/// Detector + regressor bound to one [`PipelineConfig`].
pub struct TwoStagePipeline {
    config: PipelineConfig,
    detector: Capability<dyn DetectorBackend>,
    regressor: Capability<dyn RegressorBackend>,
}

impl TwoStagePipeline {
    pub fn new(
        config: PipelineConfig,
        detector: Box<dyn DetectorBackend>,
        regressor: Box<dyn RegressorBackend>,
    ) -> Self {
        Self::with_capabilities(
            config,
            Capability::Ready(detector),
            Capability::Ready(regressor),
        )
    }

    pub fn with_capabilities(
        config: PipelineConfig,
        detector: Capability<dyn DetectorBackend>,
        regressor: Capability<dyn RegressorBackend>,
    ) -> Self {
        Self {
            config,
            detector,
            regressor,
        }
    }

    /// Load both models from settings. A model that fails to load leaves the
    /// pipeline degraded rather than failing construction.
    pub fn from_settings(
        config: PipelineConfig,
        detector: &ModelSettings,
        regressor: &ModelSettings,
    ) -> Self {
        let (dw, dh) = config.detection_input;
        let (rw, rh) = config.regression_input;
        let detector = Capability::from_result(detect::load_backend(detector, dw, dh));
        let regressor = Capability::from_result(regress::load_backend(regressor, rw, rh));
        if let Capability::Unavailable(reason) = &detector {
            log::warn!("detector unavailable: {}", reason);
        }
        if let Capability::Unavailable(reason) = &regressor {
            log::warn!("regressor unavailable: {}", reason);
        }
        Self::with_capabilities(config, detector, regressor)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run each ready backend's warm-up hook. Failures are logged only.
    pub fn warm_up(&mut self) {
        if let Capability::Ready(detector) = &mut self.detector {
            if let Err(err) = detector.warm_up() {
                log::warn!("detector {} warm-up failed: {:#}", detector.name(), err);
            }
        }
        if let Capability::Ready(regressor) = &mut self.regressor {
            if let Err(err) = regressor.warm_up() {
                log::warn!("regressor {} warm-up failed: {:#}", regressor.name(), err);
            }
        }
    }

    /// Measure one frame.
    ///
    /// `prior` is carried forward for every side this run does not measure.
    /// Nothing here fails: detector trouble degrades to "no detections",
    /// per-side trouble leaves that side's prior in place, and the reasons
    /// end up in the result's status string.
    pub fn run(&mut self, image: &Frame, prior: Estimates) -> MeasurementResult {
        let mut notes: Vec<String> = Vec::new();

        let detections = match self.detect(image) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("treating run as no detections: {}", err);
                notes.push(err.to_string());
                Vec::new()
            }
        };

        if let Err(rejection) = gate::evaluate(&detections) {
            log::debug!(
                "gate rejected {} detection(s): {}",
                detections.len(),
                rejection
            );
            notes.insert(0, rejection.to_string());
            return MeasurementResult::new(
                prior,
                image.clone(),
                Outcome::Rejected(rejection),
                Some(notes.join("; ")),
            );
        }

        let (width, height) = image.dimensions();
        let rects: Vec<PixelRect> = detections
            .iter()
            .map(|det| to_pixel_rect(det, width, height))
            .collect();

        let mut estimates = prior;
        let mut measured_left = false;
        let mut measured_right = false;
        for (det, rect) in detections.iter().zip(&rects) {
            let Some(side) = det.label().side() else {
                continue;
            };
            match self.measure(image, rect) {
                Ok(mm) => {
                    log::debug!("{} eye: {:.2}mm", side, mm);
                    estimates = estimates.with(side, mm);
                    match side {
                        Side::Left => measured_left = true,
                        Side::Right => measured_right = true,
                    }
                }
                Err(err) => {
                    log::warn!("skipping {} eye: {}", side, err);
                    notes.push(format!("{side} eye skipped: {err}"));
                }
            }
        }

        let labels: Vec<&str> = detections.iter().map(|det| det.label().as_str()).collect();
        let annotated = overlay::render(image, &rects, &labels);
        let status = if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        };

        MeasurementResult::new(
            estimates,
            annotated,
            Outcome::Measured {
                left: measured_left,
                right: measured_right,
            },
            status,
        )
    }

    fn detect(&mut self, image: &Frame) -> Result<Vec<Detection>, PipelineError> {
        let detector = match &mut self.detector {
            Capability::Ready(detector) => detector,
            Capability::Unavailable(reason) => {
                return Err(PipelineError::ModelUnavailable {
                    capability: "detector",
                    reason: reason.clone(),
                })
            }
        };

        let (w, h) = self.config.detection_input;
        let input = image.resized(w, h);
        let raw = detector
            .detect(
                &input,
                self.config.iou_threshold,
                self.config.confidence_threshold,
            )
            .map_err(|err| PipelineError::inference("detector", &err))?;

        let candidates = raw.implied_candidates();
        if candidates > self.config.max_candidates {
            return Err(PipelineError::malformed(format!(
                "{} candidates exceeds the limit of {}",
                candidates, self.config.max_candidates
            )));
        }

        decode_detections(&raw.confidences, &raw.coordinates, &self.config.label_order)
    }

    fn measure(&mut self, image: &Frame, rect: &PixelRect) -> Result<f64, PipelineError> {
        let regressor = match &mut self.regressor {
            Capability::Ready(regressor) => regressor,
            Capability::Unavailable(reason) => {
                return Err(PipelineError::ModelUnavailable {
                    capability: "regressor",
                    reason: reason.clone(),
                })
            }
        };

        let eye = crop(image, rect)?;
        let (w, h) = self.config.regression_input;
        let input = eye.resized(w, h);
        let estimate = regressor
            .predict(&input)
            .map_err(|err| PipelineError::inference("regressor", &err))?;
        if !estimate.is_finite() {
            return Err(PipelineError::Inference {
                capability: "regressor",
                reason: format!("non-finite estimate {estimate}"),
            });
        }
        Ok(f64::from(estimate))
    }
}

/// Run one measurement off the calling thread.
///
/// The pipeline travels to the worker and comes back with the result so its
/// model handles are reused by the next call.
pub fn spawn_single_shot(
    mut pipeline: TwoStagePipeline,
    frame: Frame,
    prior: Estimates,
) -> Result<JoinHandle<(TwoStagePipeline, MeasurementResult)>> {
    std::thread::Builder::new()
        .name("single-shot".to_string())
        .spawn(move || {
            let result = pipeline.run(&frame, prior);
            (pipeline, result)
        })
        .context("failed to spawn single-shot worker")
}
