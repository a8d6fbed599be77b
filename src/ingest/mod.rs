//! Frame acquisition.
//!
//! A `FrameSource` pulls one encoded frame per cycle and reports failure as a `FetchError`
//! value; it never panics or retries on its own. Decoding is a separate step because a
//! corrupt payload needs different operator feedback than an unreachable camera.
//!
//! Sources:
//! - HTTP snapshot endpoint (ESP32-CAM style `GET /cam-hi.jpg`)
//! - `stub://` synthetic frames (no hardware)
//! - Scripted results (testing)

pub mod http;
pub mod stub;

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::{imageops, ImageFormat, RgbImage};
use serde::Deserialize;
use url::Url;

use crate::config::CameraSettings;
use crate::error::FetchError;

pub use http::{HttpSnapshotConfig, HttpSnapshotSource};
pub use stub::{ScriptedSource, SyntheticSource};

/// Largest frame accepted from a camera.
pub const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Pulls one encoded frame per call.
pub trait FrameSource: Send {
    fn fetch_frame(&mut self) -> Result<Vec<u8>, FetchError>;

    /// Human-readable source description for logs.
    fn describe(&self) -> String;
}

/// Decode an encoded frame. `None` means the payload is not a usable image.
pub fn decode(bytes: &[u8]) -> Option<RgbImage> {
    image::load_from_memory(bytes)
        .ok()
        .map(|image| image.into_rgb8())
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    frame
        .write_to(&mut out, ImageFormat::Jpeg)
        .context("encode jpeg")?;
    Ok(out.into_inner())
}

/// Fixed rotation applied to every decoded frame before detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    None,
    #[default]
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn apply(self, frame: RgbImage) -> RgbImage {
        match self {
            Rotation::None => frame,
            Rotation::Cw90 => imageops::rotate90(&frame),
            Rotation::Cw180 => imageops::rotate180(&frame),
            Rotation::Cw270 => imageops::rotate270(&frame),
        }
    }
}

impl std::str::FromStr for Rotation {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" | "0" => Ok(Rotation::None),
            "cw90" | "90" => Ok(Rotation::Cw90),
            "cw180" | "180" => Ok(Rotation::Cw180),
            "cw270" | "270" => Ok(Rotation::Cw270),
            other => Err(anyhow!(
                "unsupported rotation '{}'; expected none, cw90, cw180 or cw270",
                other
            )),
        }
    }
}

/// Join the camera base URL with the snapshot path.
pub fn snapshot_url(base_url: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).with_context(|| format!("parse camera url {}", joined))
}

/// Open the source named by the camera settings.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let url = snapshot_url(&settings.base_url, &settings.snapshot_path)?;
    match url.scheme() {
        "http" | "https" => Ok(Box::new(HttpSnapshotSource::new(HttpSnapshotConfig {
            url: url.to_string(),
            timeout: settings.timeout,
        })?)),
        "stub" => Ok(Box::new(SyntheticSource::new(url.to_string(), 640, 480))),
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected http(s) or stub",
            other
        )),
    }
}
