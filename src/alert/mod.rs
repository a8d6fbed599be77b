//! Alert dispatch.
//!
//! Every retained detection is forwarded to an `AlertSink`. Alert-class labels go out as
//! `AlertKind::Alert`, everything else as `AlertKind::Detection`. Sinks are one-way and
//! best-effort: a failing sink is logged and never fails the cycle.

mod console;
mod mqtt;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::Serialize;

pub use console::ConsoleSink;
pub use mqtt::{parse_mqtt_endpoint, MqttEndpoint, MqttSink, MqttSinkConfig};

use crate::filter::ResolvedDetection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Detection,
    Alert,
}

/// What a sink receives.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub label: String,
    pub confidence: f32,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl AlertEvent {
    pub fn from_detection(det: &ResolvedDetection) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            kind: if det.is_alert_class {
                AlertKind::Alert
            } else {
                AlertKind::Detection
            },
            label: det.label.clone(),
            confidence: det.confidence,
            timestamp,
        }
    }
}

/// One-way event consumer.
pub trait AlertSink: Send {
    fn name(&self) -> &'static str;

    /// Deliver one event. Must not block on the network.
    fn notify(&mut self, event: &AlertEvent) -> Result<()>;
}

/// Sink that drops everything.
#[derive(Default)]
pub struct NullSink;

impl AlertSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn notify(&mut self, _event: &AlertEvent) -> Result<()> {
        Ok(())
    }
}

/// Delivery counts for one `dispatch` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub alerts: usize,
}

pub struct Dispatcher {
    sink: Box<dyn AlertSink>,
}

impl Dispatcher {
    pub fn new(sink: Box<dyn AlertSink>) -> Self {
        Self { sink }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Forward one cycle's detections. Sink failures are logged and counted, never returned.
    pub fn dispatch(&mut self, resolved: &[ResolvedDetection]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for det in resolved {
            let event = AlertEvent::from_detection(det);
            if event.kind == AlertKind::Alert {
                report.alerts += 1;
                log::warn!(
                    "{} DETECTED! confidence {:.2}",
                    det.label.to_uppercase(),
                    det.confidence
                );
            }
            log::info!(
                "detected {} (id {}) confidence {:.2}",
                det.label,
                det.class_id,
                det.confidence
            );
            match self.sink.notify(&event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log::warn!(
                        "{} sink failed to deliver {}: {:#}",
                        self.sink.name(),
                        event.label,
                        e
                    );
                }
            }
        }
        report
    }
}
