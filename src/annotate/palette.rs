use std::collections::HashMap;

use image::Rgb;

/// Label -> box colour, with a fallback for unmapped labels.
#[derive(Clone, Debug)]
pub struct ColorPalette {
    colors: HashMap<String, Rgb<u8>>,
    fallback: Rgb<u8>,
}

impl ColorPalette {
    pub fn new(fallback: Rgb<u8>) -> Self {
        Self {
            colors: HashMap::new(),
            fallback,
        }
    }

    pub fn with_color(mut self, label: impl Into<String>, color: Rgb<u8>) -> Self {
        self.colors.insert(label.into(), color);
        self
    }

    pub fn color_for(&self, label: &str) -> Rgb<u8> {
        self.colors.get(label).copied().unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> Rgb<u8> {
        self.fallback
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new(Rgb([0, 255, 0]))
            .with_color("cat", Rgb([0, 0, 255]))
            .with_color("dog", Rgb([255, 255, 0]))
            .with_color("bird", Rgb([0, 255, 255]))
            .with_color("turtle", Rgb([255, 165, 0]))
            .with_color("tortoise", Rgb([255, 140, 0]))
    }
}
