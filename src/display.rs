//! Display surface.
//!
//! The loop hands every annotated frame to a `Display` and then polls it once for a key.
//! `SnapshotDisplay` is the headless surface: it writes the latest frame to a JPEG file and
//! reports the escape key once the shared exit flag is raised (Ctrl-C in the daemon).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::ingest::encode_jpeg;

/// Key code returned by a display poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const ESCAPE: KeyCode = KeyCode(27);

    pub fn is_exit(self) -> bool {
        self == Self::ESCAPE
    }
}

pub trait Display: Send {
    /// Present one annotated frame.
    fn present(&mut self, frame: &RgbImage) -> Result<()>;

    /// Poll for a single key press; `None` when nothing was pressed.
    fn poll_key(&mut self) -> Option<KeyCode>;
}

/// Shared flag that turns into an escape key press on the next poll.
#[derive(Clone, Debug, Default)]
pub struct ExitSignal(Arc<AtomicBool>);

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SnapshotDisplay {
    output: Option<PathBuf>,
    exit: ExitSignal,
    frames_presented: u64,
}

impl SnapshotDisplay {
    pub fn new(output: Option<PathBuf>, exit: ExitSignal) -> Self {
        Self {
            output,
            exit,
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl Display for SnapshotDisplay {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        if let Some(path) = &self.output {
            write_atomically(path, &encode_jpeg(frame)?)?;
        }
        self.frames_presented += 1;
        Ok(())
    }

    fn poll_key(&mut self) -> Option<KeyCode> {
        self.exit.is_raised().then_some(KeyCode::ESCAPE)
    }
}

/// Write via a sibling temp file and rename, so readers never see a half-written frame.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::decode;

    #[test]
    fn exit_signal_maps_to_escape() {
        let exit = ExitSignal::new();
        let mut display = SnapshotDisplay::new(None, exit.clone());
        assert_eq!(display.poll_key(), None);
        exit.raise();
        assert_eq!(display.poll_key(), Some(KeyCode::ESCAPE));
        assert!(KeyCode::ESCAPE.is_exit());
        assert!(!KeyCode(b'q').is_exit());
    }

    #[test]
    fn present_writes_latest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.jpg");
        let mut display = SnapshotDisplay::new(Some(path.clone()), ExitSignal::new());

        display.present(&RgbImage::new(12, 10)).unwrap();
        display.present(&RgbImage::new(20, 16)).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(decode(&bytes).unwrap().dimensions(), (20, 16));
        assert_eq!(display.frames_presented(), 2);
        assert!(!dir.path().join("latest.jpg.tmp").exists());
    }

    #[test]
    fn present_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("latest.jpg");
        let mut display = SnapshotDisplay::new(Some(path), ExitSignal::new());
        assert!(display.present(&RgbImage::new(4, 4)).is_err());
    }
}
