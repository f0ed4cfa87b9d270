use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::regress::backend::RegressorBackend;

type PredictFn = Box<dyn FnMut(&Frame) -> Result<f32> + Send>;

/// Regressor for tests and offline runs.
pub struct StubRegressor {
    script: VecDeque<Result<f32, String>>,
    fallback: PredictFn,
}

impl StubRegressor {
    /// Always returns `value`.
    pub fn constant(value: f32) -> Self {
        Self::from_fn(move |_| Ok(value))
    }

    /// Computes the estimate from the crop.
    pub fn from_fn<F>(predict: F) -> Self
    where
        F: FnMut(&Frame) -> Result<f32> + Send + 'static,
    {
        Self {
            script: VecDeque::new(),
            fallback: Box::new(predict),
        }
    }

    /// Queue a value for the next unscripted call.
    pub fn then(mut self, value: f32) -> Self {
        self.script.push_back(Ok(value));
        self
    }

    /// Queue a failure for the next unscripted call.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }
}

impl RegressorBackend for StubRegressor {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, input: &Frame) -> Result<f32> {
        match self.script.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow!(message)),
            None => (self.fallback)(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_runs_before_fallback() {
        let mut regressor = StubRegressor::constant(16.5).then(21.0).then_fail("nan");
        let crop = Frame::filled(224, 224, [0, 0, 0]);
        assert_eq!(regressor.predict(&crop).unwrap(), 21.0);
        assert!(regressor.predict(&crop).is_err());
        assert_eq!(regressor.predict(&crop).unwrap(), 16.5);
    }

    #[test]
    fn from_fn_sees_the_crop() {
        let mut regressor =
            StubRegressor::from_fn(|frame| Ok(frame.as_rgb().get_pixel(0, 0)[0] as f32));
        let crop = Frame::filled(4, 4, [18, 0, 0]);
        assert_eq!(regressor.predict(&crop).unwrap(), 18.0);
    }
}
