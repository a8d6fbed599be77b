use std::collections::VecDeque;

use image::{Rgb, RgbImage};

use super::{encode_jpeg, FrameSource};
use crate::error::FetchError;

/// Synthetic camera for `stub://` URLs.
///
/// Produces a JPEG with a slowly shifting gradient so consecutive frames differ.
pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            frame_count: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn fetch_frame(&mut self) -> Result<Vec<u8>, FetchError> {
        let shift = (self.frame_count % 256) as u32;
        let frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        });
        self.frame_count += 1;
        encode_jpeg(&frame).map_err(|e| FetchError::Transport {
            url: self.url.clone(),
            message: format!("{:#}", e),
        })
    }

    fn describe(&self) -> String {
        format!("synthetic {} ({}x{})", self.url, self.width, self.height)
    }
}

/// Source that replays a fixed script of fetch results, then reports exhaustion.
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<u8>, FetchError>>,
    fetches: u64,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<Vec<u8>, FetchError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fetches: 0,
        }
    }

    pub fn fetches(&self) -> u64 {
        self.fetches
    }
}

impl FrameSource for ScriptedSource {
    fn fetch_frame(&mut self) -> Result<Vec<u8>, FetchError> {
        self.fetches += 1;
        self.script.pop_front().unwrap_or(Err(FetchError::Exhausted))
    }

    fn describe(&self) -> String {
        format!("scripted ({} queued)", self.script.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::decode;

    #[test]
    fn synthetic_frames_decode_and_change() {
        let mut source = SyntheticSource::new("stub://pond", 16, 12);
        let a = source.fetch_frame().unwrap();
        let b = source.fetch_frame().unwrap();
        assert_eq!(decode(&a).unwrap().dimensions(), (16, 12));
        assert_ne!(a, b);
    }

    #[test]
    fn scripted_source_replays_then_exhausts() {
        let mut source = ScriptedSource::new(vec![
            Ok(vec![1, 2, 3]),
            Err(FetchError::Timeout {
                url: "http://cam".to_string(),
            }),
        ]);
        assert_eq!(source.fetch_frame().unwrap(), vec![1, 2, 3]);
        assert!(matches!(source.fetch_frame(), Err(FetchError::Timeout { .. })));
        assert!(matches!(source.fetch_frame(), Err(FetchError::Exhausted)));
        assert_eq!(source.fetches(), 3);
    }
}
