use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;
use crate::frame::Frame;

/// Scripted detector for tests and offline runs.
///
/// Replays queued outputs in order and falls back to a fixed output once the
/// script is exhausted. Every call is recorded so tests can check what the
/// pipeline asked for.
pub struct StubBackend {
    script: VecDeque<Result<RawDetections, String>>,
    fallback: RawDetections,
    calls: Arc<Mutex<Vec<StubCall>>>,
}

/// One recorded `detect` call.
#[derive(Clone, Debug, PartialEq)]
pub struct StubCall {
    pub width: u32,
    pub height: u32,
    pub iou_threshold: f32,
    pub confidence_threshold: f32,
}

impl StubBackend {
    /// Detector that never finds anything.
    pub fn new() -> Self {
        Self::fixed(RawDetections::empty())
    }

    /// Detector that returns `output` on every call.
    pub fn fixed(output: RawDetections) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: output,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue an output for the next unscripted call.
    pub fn then(mut self, output: RawDetections) -> Self {
        self.script.push_back(Ok(output));
        self
    }

    /// Queue a failure for the next unscripted call.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    /// Shared view of the recorded calls.
    pub fn calls(&self) -> Arc<Mutex<Vec<StubCall>>> {
        Arc::clone(&self.calls)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        input: &Frame,
        iou_threshold: f32,
        confidence_threshold: f32,
    ) -> Result<RawDetections> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("stub call log poisoned"))?
            .push(StubCall {
                width: input.width(),
                height: input.height(),
                iou_threshold,
                confidence_threshold,
            });

        match self.script.pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
