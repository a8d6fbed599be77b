#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};

/// Tract-based backend for SSD-style ONNX detection models.
///
/// Expects a single `1x3xHxW` f32 input normalised to -1..1 and the usual four outputs of
/// an exported object-detection graph: boxes `[1, N, 4]` (ymin, xmin, ymax, xmax, 0..1),
/// classes `[1, N]`, scores `[1, N]` and a detection count `[1]`.
pub struct TractDetector {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let value = resized.get_pixel(x as u32, y as u32)[channel] as f32;
                (value - 127.5) / 127.5
            },
        );
        input.into_tensor()
    }

    fn extract_detections(
        &self,
        outputs: &TVec<TValue>,
        frame_width: u32,
        frame_height: u32,
        threshold: f32,
    ) -> Result<Vec<Detection>> {
        if outputs.len() < 4 {
            return Err(anyhow!(
                "model produced {} outputs; expected boxes, classes, scores, count",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("boxes tensor was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("classes tensor was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("scores tensor was not f32")?;
        let count = outputs[3]
            .to_array_view::<f32>()
            .context("count tensor was not f32")?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0)
            .max(0.0) as usize;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let count = count.min(scores.len()).min(classes.len()).min(boxes.len() / 4);

        let fw = frame_width as f32;
        let fh = frame_height as f32;
        let mut detections = Vec::new();
        for i in 0..count {
            let confidence = scores[i];
            if !confidence.is_finite() || confidence < threshold {
                continue;
            }
            let ymin = boxes[i * 4].clamp(0.0, 1.0);
            let xmin = boxes[i * 4 + 1].clamp(0.0, 1.0);
            let ymax = boxes[i * 4 + 2].clamp(0.0, 1.0);
            let xmax = boxes[i * 4 + 3].clamp(0.0, 1.0);
            let bbox = BoundingBox::new(
                (xmin * fw) as i32,
                (ymin * fh) as i32,
                ((xmax - xmin) * fw).max(0.0) as i32,
                ((ymax - ymin) * fh).max(0.0) as i32,
            );
            detections.push(Detection::new(classes[i].round() as i32, confidence, bbox));
        }
        Ok(detections)
    }
}

impl Detector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage, threshold: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_detections(&outputs, frame.width(), frame.height(), threshold)
    }
}
