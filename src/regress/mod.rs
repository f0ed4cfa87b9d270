//! Protrusion regressor capability and its backends.

mod backend;
mod backends;

use anyhow::Result;

pub use backend::RegressorBackend;
pub use backends::StubRegressor;
#[cfg(feature = "backend-tract")]
pub use backends::TractRegressor;

use crate::config::{BackendKind, ModelSettings};

/// Construct the regressor named by `settings` for a `width` x `height` input.
pub fn load_backend(
    settings: &ModelSettings,
    width: u32,
    height: u32,
) -> Result<Box<dyn RegressorBackend>> {
    match settings.backend {
        BackendKind::Stub => Ok(Box::new(StubRegressor::constant(0.0))),
        BackendKind::Tract => load_tract(settings, width, height),
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(
    settings: &ModelSettings,
    width: u32,
    height: u32,
) -> Result<Box<dyn RegressorBackend>> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("tract regressor requires a model path"))?;
    Ok(Box::new(TractRegressor::new(path, width, height)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(
    _settings: &ModelSettings,
    _width: u32,
    _height: u32,
) -> Result<Box<dyn RegressorBackend>> {
    anyhow::bail!("tract regressor requires the backend-tract feature")
}
