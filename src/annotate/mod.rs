//! Frame annotation.
//!
//! Rendering is split in two: `Annotator::plan` turns one cycle's results into a list of
//! `Overlay` instructions (pure, testable without pixels), and `Annotator::render` rasterises
//! them onto the frame with `imageproc`. Text uses the bundled DejaVu Sans Mono Bold unless a
//! font file is configured.

mod overlay;
mod palette;

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

pub use overlay::{Overlay, OverlayRole, PixelRect};
pub use palette::ColorPalette;

use crate::filter::{CycleStatistics, ResolvedDetection};

const BOX_THICKNESS: u32 = 3;
const LABEL_PX: f32 = 21.0;
const ALERT_PX: f32 = 24.0;
const STATUS_PX: f32 = 21.0;
const CURRENT_PX: f32 = 18.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

pub const NO_DETECTIONS_TEXT: &str = "No animals detected";

static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono-Bold.ttf");

pub struct Annotator {
    palette: ColorPalette,
    font: Option<FontArc>,
}

impl Annotator {
    /// Annotator using the bundled font.
    pub fn new(palette: ColorPalette) -> Self {
        let font = match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                log::error!("bundled overlay font unusable ({}); text will not be drawn", e);
                None
            }
        };
        Self { palette, font }
    }

    /// Replace the bundled font.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TTF/OTF font for overlay text.
    pub fn load_font<P: AsRef<Path>>(path: P) -> Result<FontArc> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        FontArc::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Width and height of `text` at `px`. Falls back to a fixed-advance estimate.
    fn measure(&self, text: &str, px: f32) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(px), font, text),
            None => (
                (text.chars().count() as f32 * px * 0.55).ceil() as u32,
                px.ceil() as u32,
            ),
        }
    }

    /// Build the overlay instructions for one cycle.
    pub fn plan(&self, resolved: &[ResolvedDetection], stats: &CycleStatistics) -> Vec<Overlay> {
        let mut overlays = Vec::new();

        for det in resolved {
            let color = self.palette.color_for(&det.label);
            let bx = det.bbox.x;
            let by = det.bbox.y;

            overlays.push(Overlay::Outline {
                role: OverlayRole::DetectionBox,
                rect: PixelRect::new(
                    bx,
                    by,
                    det.bbox.width.max(0) as u32,
                    det.bbox.height.max(0) as u32,
                ),
                color,
                thickness: BOX_THICKNESS,
            });

            let label = format!("{} {:.2}", det.label.to_uppercase(), det.confidence);
            let (tw, th) = self.measure(&label, LABEL_PX);
            // Background sits above the box so the interior stays visible.
            overlays.push(Overlay::Fill {
                role: OverlayRole::LabelBackground,
                rect: PixelRect::new(bx, by.saturating_sub(th as i32 + 10), tw, th + 10),
                color,
            });
            overlays.push(Overlay::Text {
                role: OverlayRole::LabelText,
                x: bx,
                y: by.saturating_sub(th as i32 + 5),
                px: LABEL_PX,
                color: WHITE,
                text: label,
            });

            if det.is_alert_class {
                let marker = format!("{} ALERT!", det.label.to_uppercase());
                let (_, mh) = self.measure(&marker, ALERT_PX);
                overlays.push(Overlay::Text {
                    role: OverlayRole::AlertMarker,
                    x: bx.saturating_add(10),
                    y: by.saturating_sub(40 + mh as i32),
                    px: ALERT_PX,
                    color: RED,
                    text: marker,
                });
            }
        }

        let status = format!(
            "Animal Detection - Accuracy: {:.1}%",
            stats.accuracy_percent()
        );
        let (_, sh) = self.measure(&status, STATUS_PX);
        overlays.push(Overlay::Text {
            role: OverlayRole::StatusLine,
            x: 10,
            y: 30 - sh as i32,
            px: STATUS_PX,
            color: WHITE,
            text: status,
        });

        let (current, color) = if resolved.is_empty() {
            (NO_DETECTIONS_TEXT.to_string(), RED)
        } else {
            let entries: Vec<String> = resolved
                .iter()
                .map(|det| format!("{}({:.2})", det.label, det.confidence))
                .collect();
            (format!("Current: {}", entries.join(", ")), GREEN)
        };
        let (_, ch) = self.measure(&current, CURRENT_PX);
        overlays.push(Overlay::Text {
            role: OverlayRole::CurrentLine,
            x: 10,
            y: 60 - ch as i32,
            px: CURRENT_PX,
            color,
            text: current,
        });

        overlays
    }

    /// Draw one cycle's overlays onto the frame.
    pub fn render(
        &self,
        mut frame: RgbImage,
        resolved: &[ResolvedDetection],
        stats: &CycleStatistics,
    ) -> RgbImage {
        for overlay in self.plan(resolved, stats) {
            self.draw(&mut frame, &overlay);
        }
        frame
    }

    fn draw(&self, frame: &mut RgbImage, overlay: &Overlay) {
        match overlay {
            Overlay::Outline {
                rect,
                color,
                thickness,
                ..
            } => {
                if rect.is_empty() {
                    return;
                }
                for i in 0..*thickness {
                    let grown = Rect::at(
                        rect.x.saturating_sub(i as i32),
                        rect.y.saturating_sub(i as i32),
                    )
                    .of_size(
                        rect.width.saturating_add(2 * i),
                        rect.height.saturating_add(2 * i),
                    );
                    draw_hollow_rect_mut(frame, grown, *color);
                }
            }
            Overlay::Fill { rect, color, .. } => {
                if rect.is_empty() {
                    return;
                }
                let area = Rect::at(rect.x, rect.y).of_size(rect.width, rect.height);
                draw_filled_rect_mut(frame, area, *color);
            }
            Overlay::Text {
                x,
                y,
                px,
                color,
                text,
                ..
            } => {
                if let Some(font) = &self.font {
                    draw_text_mut(frame, *color, *x, *y, PxScale::from(*px), font, text);
                }
            }
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(ColorPalette::default())
    }
}
