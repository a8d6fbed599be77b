//! Animal Watch
//!
//! Polls a network camera for still frames, runs an object detector on each one and keeps
//! only detections that resolve to an animal of interest. Retained detections are drawn onto
//! the frame and forwarded to an alert sink; turtles and tortoises raise alerts.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (HTTP snapshot endpoint, synthetic frames)
//! - `detect`: Detector trait and backends (stub, ONNX via tract)
//! - `taxonomy`: Class table and class id -> animal label resolution
//! - `filter`: Confidence cut and running statistics
//! - `annotate`: Overlay planning and rendering
//! - `alert`: Alert events, sinks (console, MQTT) and dispatch
//! - `display`: Display surface and exit key handling
//! - `pipeline`: The polling loop

pub mod alert;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod taxonomy;

pub use alert::{AlertEvent, AlertKind, AlertSink, ConsoleSink, Dispatcher, MqttSink, NullSink};
pub use annotate::{Annotator, ColorPalette};
pub use config::WatchConfig;
pub use detect::{build_detector, BoundingBox, Detection, Detector, StubDetector};
pub use display::{Display, ExitSignal, KeyCode, SnapshotDisplay};
pub use error::{CycleError, FetchError};
pub use filter::{CycleStatistics, DetectionFilter, ResolvedDetection};
pub use ingest::{open_source, FrameSource, Rotation};
pub use pipeline::{CycleReport, Monitor, RunSummary};
pub use taxonomy::{AnimalTaxonomy, ClassTable};
