use std::io::Write;

use anyhow::{Context, Result};

use super::{AlertEvent, AlertKind, AlertSink};

/// Prints one line per event to stdout.
pub struct ConsoleSink<W: Write + Send = std::io::Stdout> {
    out: W,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> AlertSink for ConsoleSink<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        if event.kind == AlertKind::Alert {
            writeln!(
                self.out,
                "ALERT: {} DETECTED! Confidence: {:.2}",
                event.label.to_uppercase(),
                event.confidence
            )
            .context("write alert to console")?;
        }
        writeln!(
            self.out,
            "DETECTED: {} - Confidence: {:.2}",
            event.label, event.confidence
        )
        .context("write detection to console")?;
        self.out.flush().context("flush console")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_detection_and_alert_lines() {
        let mut sink = ConsoleSink::with_writer(Vec::new());
        sink.notify(&AlertEvent {
            kind: AlertKind::Detection,
            label: "cat".to_string(),
            confidence: 0.92,
            timestamp: 0,
        })
        .unwrap();
        sink.notify(&AlertEvent {
            kind: AlertKind::Alert,
            label: "turtle".to_string(),
            confidence: 0.8,
            timestamp: 0,
        })
        .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            out,
            "DETECTED: cat - Confidence: 0.92\n\
             ALERT: TURTLE DETECTED! Confidence: 0.80\n\
             DETECTED: turtle - Confidence: 0.80\n"
        );
    }
}
