//! Detection filter and running accounting.

use serde::Serialize;

use crate::detect::{BoundingBox, Detection};
use crate::taxonomy::{is_alert_label, AnimalTaxonomy};

/// Post-detector confidence cut. A detection must score strictly above this.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// A detection that survived filtering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedDetection {
    pub class_id: i32,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub label: String,
    pub is_alert_class: bool,
}

/// Process-lifetime counters. Only ever incremented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStatistics {
    cycles_processed: u64,
    animal_detections_total: u64,
}

impl CycleStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles_processed(&self) -> u64 {
        self.cycles_processed
    }

    pub fn animal_detections_total(&self) -> u64 {
        self.animal_detections_total
    }

    /// Detections per processed cycle, 0 before the first cycle.
    ///
    /// A hit-rate, not model precision; it exceeds 1.0 when cycles carry several animals.
    pub fn running_accuracy(&self) -> f64 {
        if self.cycles_processed == 0 {
            0.0
        } else {
            self.animal_detections_total as f64 / self.cycles_processed as f64
        }
    }

    pub fn accuracy_percent(&self) -> f64 {
        self.running_accuracy() * 100.0
    }

    fn record_cycle(&mut self) {
        self.cycles_processed += 1;
    }

    fn record_detection(&mut self) {
        self.animal_detections_total += 1;
    }
}

/// Resolves labels, applies the confidence cut and updates the statistics.
pub struct DetectionFilter {
    taxonomy: AnimalTaxonomy,
    threshold: f32,
}

impl DetectionFilter {
    pub fn new(taxonomy: AnimalTaxonomy) -> Self {
        Self {
            taxonomy,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Filter one cycle's raw detections, preserving detector order.
    ///
    /// Counts the cycle exactly once, even for an empty batch.
    pub fn filter_and_score(
        &self,
        raw: &[Detection],
        stats: &mut CycleStatistics,
    ) -> Vec<ResolvedDetection> {
        stats.record_cycle();

        let mut kept = Vec::new();
        for det in raw {
            let Some(label) = self.taxonomy.resolve(det.class_id) else {
                log::debug!("dropping class {} (not of interest)", det.class_id);
                continue;
            };
            if det.confidence.is_nan() || det.confidence <= self.threshold {
                log::debug!(
                    "dropping {} (id {}) at {:.2}: below {:.2}",
                    label,
                    det.class_id,
                    det.confidence,
                    self.threshold
                );
                continue;
            }
            stats.record_detection();
            kept.push(ResolvedDetection {
                class_id: det.class_id,
                confidence: det.confidence,
                bbox: det.bbox,
                is_alert_class: is_alert_label(&label),
                label,
            });
        }
        kept
    }
}
