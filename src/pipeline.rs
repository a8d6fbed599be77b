//! Polling loop.
//!
//! One cycle: fetch, decode, rotate, detect, filter, annotate, dispatch, present. A failed
//! cycle is logged with its category, the loop backs off and the next cycle starts from
//! scratch. A panic inside a cycle is caught and treated like any other failed cycle. The
//! display is polled once per attempt; the escape key ends the run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::alert::{DispatchReport, Dispatcher};
use crate::annotate::Annotator;
use crate::detect::Detector;
use crate::display::Display;
use crate::error::CycleError;
use crate::filter::{
    CycleStatistics, DetectionFilter, ResolvedDetection, DEFAULT_CONFIDENCE_THRESHOLD,
};
use crate::ingest::{decode, FrameSource, Rotation};

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Outcome of one successful cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub detections: Vec<ResolvedDetection>,
    pub dispatch: DispatchReport,
    /// Frame size after rotation.
    pub frame_size: (u32, u32),
}

/// Totals reported when the loop exits.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub attempts: u64,
    pub failed_cycles: u64,
    pub cycles_processed: u64,
    pub animal_detections: u64,
    pub accuracy_percent: f64,
}

pub struct Monitor {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    filter: DetectionFilter,
    stats: CycleStatistics,
    annotator: Annotator,
    dispatcher: Dispatcher,
    display: Box<dyn Display>,
    rotation: Rotation,
    detector_threshold: f32,
    retry_backoff: Duration,
}

impl Monitor {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        filter: DetectionFilter,
        annotator: Annotator,
        dispatcher: Dispatcher,
        display: Box<dyn Display>,
    ) -> Self {
        Self {
            source,
            detector,
            filter,
            stats: CycleStatistics::new(),
            annotator,
            dispatcher,
            display,
            rotation: Rotation::default(),
            detector_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_detector_threshold(mut self, threshold: f32) -> Self {
        self.detector_threshold = threshold;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn statistics(&self) -> &CycleStatistics {
        &self.stats
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn sink_name(&self) -> &'static str {
        self.dispatcher.sink_name()
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Run one cycle. Statistics change only once a frame reaches the filter.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let bytes = self.source.fetch_frame()?;
        let frame = decode(&bytes).ok_or(CycleError::DecodeFailed { len: bytes.len() })?;
        let frame: RgbImage = self.rotation.apply(frame);
        let frame_size = frame.dimensions();

        let raw = self
            .detector
            .detect(&frame, self.detector_threshold)
            .map_err(CycleError::Detect)?;
        let detections = self.filter.filter_and_score(&raw, &mut self.stats);

        let annotated = self.annotator.render(frame, &detections, &self.stats);
        let dispatch = self.dispatcher.dispatch(&detections);
        self.display
            .present(&annotated)
            .map_err(CycleError::Display)?;

        log::debug!(
            "cycle {}: {} raw, {} kept, accuracy {:.1}%, {:?}",
            self.stats.cycles_processed(),
            raw.len(),
            detections.len(),
            self.stats.accuracy_percent(),
            started.elapsed()
        );
        Ok(CycleReport {
            detections,
            dispatch,
            frame_size,
        })
    }

    /// `run_cycle` with panics turned into `CycleError::Panicked`.
    fn run_cycle_guarded(&mut self) -> Result<CycleReport, CycleError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
            Ok(result) => result,
            Err(payload) => Err(CycleError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Poll until the display reports the escape key.
    pub fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        loop {
            summary.attempts += 1;
            if let Err(e) = self.run_cycle_guarded() {
                summary.failed_cycles += 1;
                log::warn!(
                    "[{}] {}; retrying in {:?}",
                    e.category(),
                    e,
                    self.retry_backoff
                );
                if !self.retry_backoff.is_zero() {
                    std::thread::sleep(self.retry_backoff);
                }
            }

            if let Some(key) = self.display.poll_key() {
                if key.is_exit() {
                    break;
                }
                log::debug!("ignoring key {}", key.0);
            }
        }

        summary.cycles_processed = self.stats.cycles_processed();
        summary.animal_detections = self.stats.animal_detections_total();
        summary.accuracy_percent = self.stats.accuracy_percent();
        log::info!(
            "stopped after {} attempts ({} failed): {} cycles, {} detections, accuracy {:.1}%",
            summary.attempts,
            summary.failed_cycles,
            summary.cycles_processed,
            summary.animal_detections,
            summary.accuracy_percent
        );
        summary
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NullSink;
    use crate::detect::{BoundingBox, Detection, StubDetector};
    use crate::display::KeyCode;
    use crate::error::FetchError;
    use crate::ingest::{encode_jpeg, ScriptedSource};
    use crate::taxonomy::{AnimalTaxonomy, ClassTable};
    use anyhow::{anyhow, Result};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Panics on the first call, then finds nothing.
    struct PanickingDetector {
        calls: u32,
    }

    impl Detector for PanickingDetector {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn detect(&mut self, _frame: &RgbImage, _threshold: f32) -> Result<Vec<Detection>> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("tensor shape mismatch");
            }
            Ok(Vec::new())
        }
    }

    /// Records presented frame sizes and replays scripted key presses.
    struct ScriptedDisplay {
        frames: Arc<Mutex<Vec<(u32, u32)>>>,
        keys: VecDeque<Option<KeyCode>>,
        fail_present: bool,
    }

    impl Display for ScriptedDisplay {
        fn present(&mut self, frame: &RgbImage) -> Result<()> {
            if self.fail_present {
                return Err(anyhow!("window closed"));
            }
            self.frames.lock().unwrap().push(frame.dimensions());
            Ok(())
        }

        fn poll_key(&mut self) -> Option<KeyCode> {
            self.keys.pop_front().unwrap_or(Some(KeyCode::ESCAPE))
        }
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        encode_jpeg(&RgbImage::new(width, height)).unwrap()
    }

    fn monitor(
        frames: Vec<Result<Vec<u8>, FetchError>>,
        detector: impl Detector + 'static,
        display: ScriptedDisplay,
    ) -> Monitor {
        let table = ClassTable::parse("person\nbicycle\n");
        Monitor::new(
            Box::new(ScriptedSource::new(frames)),
            Box::new(detector),
            DetectionFilter::new(AnimalTaxonomy::with_defaults(table)),
            Annotator::default(),
            Dispatcher::new(Box::new(NullSink)),
            Box::new(display),
        )
        .with_retry_backoff(Duration::ZERO)
    }

    fn display(keys: Vec<Option<KeyCode>>) -> (ScriptedDisplay, Arc<Mutex<Vec<(u32, u32)>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        (
            ScriptedDisplay {
                frames: frames.clone(),
                keys: keys.into(),
                fail_present: false,
            },
            frames,
        )
    }

    #[test]
    fn cycle_rotates_before_presenting() {
        let (display, frames) = display(vec![]);
        let mut monitor = monitor(vec![Ok(jpeg(40, 30))], StubDetector::new(), display);
        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.frame_size, (30, 40));
        assert_eq!(*frames.lock().unwrap(), vec![(30, 40)]);
        assert_eq!(monitor.statistics().cycles_processed(), 1);
    }

    #[test]
    fn detector_failure_skips_cycle_without_counting() {
        let (display, frames) = display(vec![]);
        let mut monitor = monitor(
            vec![Ok(jpeg(16, 16))],
            StubDetector::new().then_fail("inference crashed"),
            display,
        );
        let err = monitor.run_cycle().unwrap_err();
        assert_eq!(err.category(), "detector");
        assert_eq!(monitor.statistics().cycles_processed(), 0);
        assert!(frames.lock().unwrap().is_empty());
    }

    #[test]
    fn display_failure_is_a_cycle_error_after_counting() {
        let (mut display, _) = display(vec![]);
        display.fail_present = true;
        let detector = StubDetector::fixed(vec![Detection::new(
            17,
            0.9,
            BoundingBox::new(1, 1, 5, 5),
        )]);
        let mut monitor = monitor(vec![Ok(jpeg(16, 16))], detector, display);
        let err = monitor.run_cycle().unwrap_err();
        assert_eq!(err.category(), "display");
        assert_eq!(monitor.statistics().animal_detections_total(), 1);
    }

    #[test]
    fn run_exits_on_escape_and_ignores_other_keys() {
        let (display, frames) = display(vec![None, Some(KeyCode(b'q')), Some(KeyCode::ESCAPE)]);
        let mut monitor = monitor(
            vec![Ok(jpeg(8, 8)), Ok(jpeg(8, 8)), Ok(jpeg(8, 8)), Ok(jpeg(8, 8))],
            StubDetector::new(),
            display,
        );
        let summary = monitor.run();
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.failed_cycles, 0);
        assert_eq!(summary.cycles_processed, 3);
        assert_eq!(frames.lock().unwrap().len(), 3);
    }

    #[test]
    fn panicking_cycle_is_skipped_and_loop_continues() {
        let (display, frames) = display(vec![None, Some(KeyCode::ESCAPE)]);
        let mut monitor = monitor(
            vec![Ok(jpeg(8, 8)), Ok(jpeg(8, 8))],
            PanickingDetector { calls: 0 },
            display,
        );
        let summary = monitor.run();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.failed_cycles, 1);
        assert_eq!(summary.cycles_processed, 1);
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn panic_payload_becomes_message() {
        let (display, _) = display(vec![]);
        let mut monitor = monitor(vec![Ok(jpeg(8, 8))], PanickingDetector { calls: 0 }, display);
        match monitor.run_cycle_guarded() {
            Err(CycleError::Panicked { message }) => {
                assert_eq!(message, "tensor shape mismatch")
            }
            other => panic!("expected a panicked cycle, got {:?}", other.map(|r| r.frame_size)),
        }
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }

    #[test]
    fn failed_cycle_waits_for_backoff_before_next_poll() {
        let (display, _) = display(vec![]);
        let mut monitor = monitor(
            vec![Err(FetchError::Exhausted)],
            StubDetector::new(),
            display,
        )
        .with_retry_backoff(Duration::from_millis(50));

        let started = Instant::now();
        let summary = monitor.run();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(summary.failed_cycles, 1);
        assert_eq!(summary.cycles_processed, 0);
    }

    #[test]
    fn default_backoff_is_one_second() {
        let (display, _) = display(vec![]);
        let monitor = Monitor::new(
            Box::new(ScriptedSource::new(Vec::new())),
            Box::new(StubDetector::new()),
            DetectionFilter::new(AnimalTaxonomy::with_defaults(ClassTable::parse(""))),
            Annotator::default(),
            Dispatcher::new(Box::new(NullSink)),
            Box::new(display),
        );
        assert_eq!(monitor.retry_backoff(), DEFAULT_RETRY_BACKOFF);
        assert_eq!(DEFAULT_RETRY_BACKOFF, Duration::from_secs(1));
    }
}
