//! HTTP snapshot frame source.
//!
//! Pulls a single JPEG per call from an ESP32-CAM style endpoint (`GET /cam-hi.jpg`).
//! Every call is an independent request bounded by the configured timeout; nothing is
//! buffered between calls, so a missed frame is simply lost.

use std::io::{self, Read};
use std::time::Duration;

use anyhow::Result;
use ureq::{Agent, AgentBuilder};

use super::{FrameSource, MAX_JPEG_BYTES};
use crate::error::FetchError;

/// Configuration for an HTTP snapshot source.
#[derive(Clone, Debug)]
pub struct HttpSnapshotConfig {
    /// Full snapshot URL.
    pub url: String,
    /// Bound on connect + read for one fetch.
    pub timeout: Duration,
}

impl Default for HttpSnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.50.145/cam-hi.jpg".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct HttpSnapshotSource {
    config: HttpSnapshotConfig,
    agent: Agent,
}

impl HttpSnapshotSource {
    pub fn new(config: HttpSnapshotConfig) -> Result<Self> {
        let agent = AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { config, agent })
    }
}

impl FrameSource for HttpSnapshotSource {
    fn fetch_frame(&mut self) -> Result<Vec<u8>, FetchError> {
        let url = &self.config.url;
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::Status {
                    url: url.clone(),
                    status,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(classify_transport(url, &transport))
            }
        };

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.clone(),
                status,
            });
        }

        read_body(url, response.into_reader())
    }

    fn describe(&self) -> String {
        format!("http snapshot {}", self.config.url)
    }
}

fn read_body(url: &str, reader: impl Read) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    reader
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|source| {
            if is_timeout(&source) {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Read {
                    url: url.to_string(),
                    source,
                }
            }
        })?;
    if bytes.is_empty() {
        return Err(FetchError::Empty {
            url: url.to_string(),
        });
    }
    if bytes.len() > MAX_JPEG_BYTES {
        return Err(FetchError::TooLarge {
            url: url.to_string(),
            limit: MAX_JPEG_BYTES,
        });
    }
    Ok(bytes)
}

fn classify_transport(url: &str, transport: &ureq::Transport) -> FetchError {
    let timed_out = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(is_timeout);
    if timed_out {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct TimingOutReader;

    impl Read for TimingOutReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
        }
    }

    #[test]
    fn empty_body_is_a_fetch_error() {
        let err = read_body("http://cam/cam-hi.jpg", Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, FetchError::Empty { .. }));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let body = vec![0u8; MAX_JPEG_BYTES + 10];
        let err = read_body("http://cam/cam-hi.jpg", Cursor::new(body)).unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { .. }));
    }

    #[test]
    fn body_read_timeout_maps_to_timeout() {
        let err = read_body("http://cam/cam-hi.jpg", TimingOutReader).unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[test]
    fn body_is_returned_verbatim() {
        let body = read_body("http://cam/cam-hi.jpg", Cursor::new(vec![0xFF, 0xD8, 1, 2])).unwrap();
        assert_eq!(body, vec![0xFF, 0xD8, 1, 2]);
    }

    #[test]
    fn unreachable_camera_is_a_transport_error() {
        // Port 9 on loopback: nothing listens there in CI.
        let mut source = HttpSnapshotSource::new(HttpSnapshotConfig {
            url: "http://127.0.0.1:9/cam-hi.jpg".to_string(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        let err = source.fetch_frame().unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport { .. } | FetchError::Timeout { .. }
        ));
    }
}
