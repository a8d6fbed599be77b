use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::Detector;
use crate::detect::result::Detection;

/// Stub detector for tests and hardware-free runs.
///
/// Scripted mode pops one batch per call and returns nothing once the script runs out.
/// Fixed mode returns the same batch every call.
pub struct StubDetector {
    script: VecDeque<Result<Vec<Detection>, String>>,
    fixed: Option<Vec<Detection>>,
    calls: u64,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fixed: None,
            calls: 0,
        }
    }

    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self {
            fixed: Some(detections),
            ..Self::new()
        }
    }

    pub fn scripted(batches: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            script: batches.into_iter().map(Ok).collect(),
            ..Self::new()
        }
    }

    /// Queue a failing call.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    pub fn then(mut self, batch: Vec<Detection>) -> Self {
        self.script.push_back(Ok(batch));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &RgbImage, threshold: f32) -> Result<Vec<Detection>> {
        self.calls += 1;
        let batch = match self.script.pop_front() {
            Some(Ok(batch)) => batch,
            Some(Err(message)) => return Err(anyhow!(message)),
            None => self.fixed.clone().unwrap_or_default(),
        };
        Ok(batch
            .into_iter()
            .filter(|det| det.confidence >= threshold)
            .collect())
    }
}
