use image::Rgb;

/// Integer rectangle in frame pixels. May extend past the frame edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Visual role of an overlay, so callers can find e.g. the alert marker without string
/// matching on colours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayRole {
    DetectionBox,
    LabelBackground,
    LabelText,
    AlertMarker,
    StatusLine,
    CurrentLine,
}

/// One drawing instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    /// Hollow rectangle `thickness` pixels wide, growing outward.
    Outline {
        role: OverlayRole,
        rect: PixelRect,
        color: Rgb<u8>,
        thickness: u32,
    },
    Fill {
        role: OverlayRole,
        rect: PixelRect,
        color: Rgb<u8>,
    },
    /// Text whose top-left corner sits at `(x, y)`.
    Text {
        role: OverlayRole,
        x: i32,
        y: i32,
        px: f32,
        color: Rgb<u8>,
        text: String,
    },
}

impl Overlay {
    pub fn role(&self) -> OverlayRole {
        match self {
            Overlay::Outline { role, .. } | Overlay::Fill { role, .. } | Overlay::Text { role, .. } => {
                *role
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Overlay::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}
