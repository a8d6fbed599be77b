use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use image::{Rgb, RgbImage};

use animal_watch::alert::{AlertEvent, AlertKind, AlertSink, Dispatcher};
use animal_watch::error::{CycleError, FetchError};
use animal_watch::ingest::{encode_jpeg, ScriptedSource};
use animal_watch::{
    AnimalTaxonomy, Annotator, BoundingBox, ClassTable, Detection, DetectionFilter, Display,
    KeyCode, Monitor, StubDetector,
};

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<AlertEvent>>>);

impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CapturingDisplay {
    frames: Arc<Mutex<Vec<RgbImage>>>,
    keys: Arc<Mutex<VecDeque<Option<KeyCode>>>>,
}

impl Display for CapturingDisplay {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn poll_key(&mut self) -> Option<KeyCode> {
        self.keys
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Some(KeyCode::ESCAPE))
    }
}

struct Harness {
    monitor: Monitor,
    events: Arc<Mutex<Vec<AlertEvent>>>,
    display: CapturingDisplay,
}

fn coco_subset() -> ClassTable {
    ClassTable::parse("person\nbicycle\ncar\nmotorcycle\nairplane\n")
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_jpeg(&RgbImage::from_pixel(width, height, Rgb([40, 40, 40]))).unwrap()
}

fn harness(frames: Vec<Result<Vec<u8>, FetchError>>, detector: StubDetector) -> Harness {
    let sink = RecordingSink::default();
    let events = sink.0.clone();
    let display = CapturingDisplay::default();
    let monitor = Monitor::new(
        Box::new(ScriptedSource::new(frames)),
        Box::new(detector),
        DetectionFilter::new(AnimalTaxonomy::with_defaults(coco_subset())),
        Annotator::default(),
        Dispatcher::new(Box::new(sink)),
        Box::new(display.clone()),
    )
    .with_retry_backoff(Duration::ZERO);
    Harness {
        monitor,
        events,
        display,
    }
}

fn timeout() -> FetchError {
    FetchError::Timeout {
        url: "http://192.168.50.145/cam-hi.jpg".to_string(),
    }
}

#[test]
fn cat_is_detected_annotated_and_forwarded() {
    let detector = StubDetector::fixed(vec![Detection::new(
        17,
        0.92,
        BoundingBox::new(40, 120, 20, 20),
    )]);
    let mut h = harness(vec![Ok(jpeg(300, 200))], detector);

    let report = h.monitor.run_cycle().expect("cycle succeeds");
    assert_eq!(report.frame_size, (200, 300));
    assert_eq!(report.detections.len(), 1);
    assert_eq!(report.detections[0].label, "cat");
    assert!(!report.detections[0].is_alert_class);
    assert_eq!(report.dispatch.delivered, 1);
    assert_eq!(report.dispatch.alerts, 0);

    let stats = h.monitor.statistics();
    assert_eq!(stats.cycles_processed(), 1);
    assert_eq!(stats.animal_detections_total(), 1);
    assert_eq!(stats.accuracy_percent(), 100.0);

    let events = h.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::Detection);
    assert_eq!(events[0].label, "cat");

    let frames = h.display.frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(*frames[0].get_pixel(40, 120), Rgb([0, 0, 255]));
}

#[test]
fn turtle_raises_alert() {
    let detector = StubDetector::fixed(vec![Detection::new(
        86,
        0.80,
        BoundingBox::new(5, 30, 15, 10),
    )]);
    let mut h = harness(vec![Ok(jpeg(64, 64))], detector);

    let report = h.monitor.run_cycle().expect("cycle succeeds");
    assert_eq!(report.detections[0].label, "turtle");
    assert!(report.detections[0].is_alert_class);
    assert_eq!(report.dispatch.alerts, 1);

    let events = h.events.lock().unwrap();
    assert_eq!(events[0].kind, AlertKind::Alert);
    assert_eq!(events[0].label, "turtle");
    assert!((events[0].confidence - 0.80).abs() < 1e-6);
}

#[test]
fn threshold_boundary_is_counted_but_not_kept() {
    let detector = StubDetector::fixed(vec![
        Detection::new(18, 0.5, BoundingBox::new(0, 0, 10, 10)),
        Detection::new(1, 0.99, BoundingBox::new(0, 0, 10, 10)),
    ]);
    let mut h = harness(vec![Ok(jpeg(32, 32))], detector);

    let report = h.monitor.run_cycle().expect("cycle succeeds");
    assert!(report.detections.is_empty());
    assert_eq!(h.monitor.statistics().cycles_processed(), 1);
    assert_eq!(h.monitor.statistics().running_accuracy(), 0.0);
    assert!(h.events.lock().unwrap().is_empty());
    assert_eq!(h.display.frames.lock().unwrap().len(), 1);
}

#[test]
fn fetch_failure_leaves_statistics_untouched_then_recovers() {
    let mut h = harness(vec![Err(timeout()), Ok(jpeg(16, 16))], StubDetector::new());

    let err = h.monitor.run_cycle().unwrap_err();
    assert!(matches!(err, CycleError::Fetch(FetchError::Timeout { .. })));
    assert_eq!(err.category(), "network");
    assert_eq!(h.monitor.statistics().cycles_processed(), 0);
    assert!(h.display.frames.lock().unwrap().is_empty());

    h.monitor.run_cycle().expect("retry succeeds");
    assert_eq!(h.monitor.statistics().cycles_processed(), 1);
}

#[test]
fn undecodable_payload_is_a_stream_error() {
    let mut h = harness(vec![Ok(b"garbage".to_vec())], StubDetector::new());

    let err = h.monitor.run_cycle().unwrap_err();
    assert!(matches!(err, CycleError::DecodeFailed { len: 7 }));
    assert_eq!(err.category(), "stream");
    assert_eq!(h.monitor.statistics().cycles_processed(), 0);
}

#[test]
fn run_survives_outage_and_exits_on_escape() {
    let detector = StubDetector::fixed(vec![Detection::new(
        16,
        0.7,
        BoundingBox::new(1, 1, 4, 4),
    )]);
    let mut h = harness(
        vec![Err(timeout()), Ok(b"\xff\xd8".to_vec()), Ok(jpeg(16, 16))],
        detector,
    );
    h.display
        .keys
        .lock()
        .unwrap()
        .extend([None, None, Some(KeyCode::ESCAPE)]);

    let summary = h.monitor.run();
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.failed_cycles, 2);
    assert_eq!(summary.cycles_processed, 1);
    assert_eq!(summary.animal_detections, 1);
    assert_eq!(summary.accuracy_percent, 100.0);
    assert_eq!(h.events.lock().unwrap()[0].label, "bird");
}
