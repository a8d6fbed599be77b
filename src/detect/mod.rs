mod backend;
mod backends;
mod result;

use anyhow::{anyhow, Result};

pub use backend::Detector;
pub use backends::StubDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use result::{BoundingBox, Detection};

use crate::config::{DetectorBackendKind, ModelSettings};

/// Construct the configured detector. Failure here is fatal at startup.
pub fn build_detector(settings: &ModelSettings) -> Result<Box<dyn Detector>> {
    let mut detector: Box<dyn Detector> = match settings.backend {
        DetectorBackendKind::Stub => Box::new(StubDetector::new()),
        DetectorBackendKind::Tract => build_tract(settings)?,
    };
    detector.warm_up()?;
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &ModelSettings) -> Result<Box<dyn Detector>> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires model.model_path"))?;
    Ok(Box::new(TractDetector::new(
        path,
        settings.input_width,
        settings.input_height,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &ModelSettings) -> Result<Box<dyn Detector>> {
    Err(anyhow!(
        "tract backend requires building with the backend-tract feature"
    ))
}
