//! Periocular detector capability and its backends.

mod backend;
mod backends;
mod result;

use anyhow::Result;

pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubCall};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::RawDetections;

use crate::config::{BackendKind, ModelSettings};

/// Construct the detector named by `settings` for a `width` x `height` input.
pub fn load_backend(
    settings: &ModelSettings,
    width: u32,
    height: u32,
) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend {
        BackendKind::Stub => Ok(Box::new(StubBackend::new())),
        BackendKind::Tract => load_tract(settings, width, height),
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(
    settings: &ModelSettings,
    width: u32,
    height: u32,
) -> Result<Box<dyn DetectorBackend>> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("tract detector requires a model path"))?;
    Ok(Box::new(TractBackend::new(path, width, height)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(
    _settings: &ModelSettings,
    _width: u32,
    _height: u32,
) -> Result<Box<dyn DetectorBackend>> {
    anyhow::bail!("tract detector requires the backend-tract feature")
}
