//! Text to monochrome bitmaps.

use embedded_graphics::mono_font::{iso_8859_15 as fonts, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use crate::config::FontSpec;
use crate::error::ClockError;

/// Rendered text, one bool per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl TextMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[(y * self.width + x) as usize]
    }

    /// Coordinates of every inked pixel.
    pub fn ink(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .map(move |(i, _)| (i as u32 % self.width, i as u32 / self.width))
    }

    /// Nearest-neighbour enlargement by a whole factor.
    pub fn scaled(&self, factor: u32) -> TextMask {
        if factor <= 1 {
            return self.clone();
        }
        let mut out = TextMask::new(self.width * factor, self.height * factor);
        for (x, y) in self.ink() {
            for dy in 0..factor {
                let row = ((y * factor + dy) * out.width) as usize;
                let start = row + (x * factor) as usize;
                out.bits[start..start + factor as usize].fill(true);
            }
        }
        out
    }
}

impl OriginDimensions for TextMask {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for TextMask {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if x < self.width && y < self.height {
                self.bits[(y * self.width + x) as usize] = color.is_on();
            }
        }
        Ok(())
    }
}

/// Turns a string into pixels for a configured font.
pub trait TextRasterizer {
    /// Pixel height of one line, or `None` if the face is unknown.
    fn line_height(&self, font: &FontSpec) -> Option<u32>;

    /// Draw `text`, dropping the glyphs that would start past `max_width`.
    fn rasterize(
        &self,
        text: &str,
        font: &FontSpec,
        max_width: u32,
    ) -> Result<TextMask, ClockError>;
}

/// Bitmap fonts bundled with embedded-graphics, enlarged by whole factors
/// to approach the configured size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoRasterizer;

impl MonoRasterizer {
    /// Face names understood in `[fonts.*] face`.
    pub const FACES: &'static [&'static str] = &[
        "4x6",
        "5x7",
        "5x8",
        "6x9",
        "6x10",
        "6x12",
        "6x13",
        "6x13_bold",
        "6x13_italic",
        "7x13",
        "7x13_bold",
        "7x13_italic",
        "7x14",
        "7x14_bold",
        "8x13",
        "8x13_bold",
        "8x13_italic",
        "9x15",
        "9x15_bold",
        "9x18",
        "9x18_bold",
        "10x20",
    ];

    fn face(name: &str) -> Option<&'static MonoFont<'static>> {
        let font = match name {
            "4x6" => &fonts::FONT_4X6,
            "5x7" => &fonts::FONT_5X7,
            "5x8" => &fonts::FONT_5X8,
            "6x9" => &fonts::FONT_6X9,
            "6x10" => &fonts::FONT_6X10,
            "6x12" => &fonts::FONT_6X12,
            "6x13" => &fonts::FONT_6X13,
            "6x13_bold" => &fonts::FONT_6X13_BOLD,
            "6x13_italic" => &fonts::FONT_6X13_ITALIC,
            "7x13" => &fonts::FONT_7X13,
            "7x13_bold" => &fonts::FONT_7X13_BOLD,
            "7x13_italic" => &fonts::FONT_7X13_ITALIC,
            "7x14" => &fonts::FONT_7X14,
            "7x14_bold" => &fonts::FONT_7X14_BOLD,
            "8x13" => &fonts::FONT_8X13,
            "8x13_bold" => &fonts::FONT_8X13_BOLD,
            "8x13_italic" => &fonts::FONT_8X13_ITALIC,
            "9x15" => &fonts::FONT_9X15,
            "9x15_bold" => &fonts::FONT_9X15_BOLD,
            "9x18" => &fonts::FONT_9X18,
            "9x18_bold" => &fonts::FONT_9X18_BOLD,
            "10x20" => &fonts::FONT_10X20,
            _ => return None,
        };
        Some(font)
    }

    fn scale(font: &MonoFont<'_>, spec: &FontSpec) -> u32 {
        (spec.size / font.character_size.height).max(1)
    }
}

impl TextRasterizer for MonoRasterizer {
    fn line_height(&self, spec: &FontSpec) -> Option<u32> {
        Self::face(&spec.face).map(|font| font.character_size.height * Self::scale(font, spec))
    }

    fn rasterize(
        &self,
        text: &str,
        spec: &FontSpec,
        max_width: u32,
    ) -> Result<TextMask, ClockError> {
        let font = Self::face(&spec.face)
            .ok_or_else(|| ClockError::config(format!("unknown font face '{}'", spec.face)))?;
        let scale = Self::scale(font, spec);
        let pitch = (font.character_size.width + font.character_spacing) * scale;
        let fit = max_width.div_ceil(pitch.max(1)) as usize;
        let end = text.char_indices().nth(fit).map_or(text.len(), |(i, _)| i);
        let text = &text[..end];

        let glyphs = text.chars().count() as u32;
        let height = font.character_size.height;
        let width = if glyphs == 0 {
            0
        } else {
            glyphs * font.character_size.width + (glyphs - 1) * font.character_spacing
        };

        let mut mask = TextMask::new(width, height);
        let style = MonoTextStyle::new(font, BinaryColor::On);
        Text::with_baseline(text, Point::zero(), style, Baseline::Top)
            .draw(&mut mask)
            .unwrap_or_else(|never| match never {});
        Ok(mask.scaled(scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_face_resolves() {
        for face in MonoRasterizer::FACES {
            assert!(MonoRasterizer::face(face).is_some(), "{}", face);
        }
        assert!(MonoRasterizer::face("comic_sans").is_none());
    }

    #[test]
    fn size_picks_a_whole_scale_factor() {
        let raster = MonoRasterizer;
        assert_eq!(raster.line_height(&FontSpec::new("10x20", 20)), Some(20));
        assert_eq!(raster.line_height(&FontSpec::new("10x20", 45)), Some(40));
        assert_eq!(raster.line_height(&FontSpec::new("10x20", 8)), Some(20));
        assert_eq!(raster.line_height(&FontSpec::new("nope", 8)), None);
    }

    #[test]
    fn rasterized_text_has_ink_and_the_expected_size() {
        let mask = MonoRasterizer
            .rasterize("12:34", &FontSpec::new("6x10", 20), 296)
            .unwrap();
        assert_eq!((mask.width(), mask.height()), (60, 20));
        assert!(mask.ink().count() > 0);

        let blank = MonoRasterizer.rasterize("   ", &FontSpec::new("6x10", 10), 296).unwrap();
        assert_eq!(blank.ink().count(), 0);
    }

    #[test]
    fn huge_lines_only_rasterize_the_glyphs_that_fit() {
        let title = "W".repeat(5_000_000);
        let mask = MonoRasterizer
            .rasterize(&title, &FontSpec::new("6x10", 20), 100)
            .unwrap();
        // 12px per glyph at double size: 9 glyphs reach past 100px
        assert_eq!((mask.width(), mask.height()), (108, 20));

        let short = MonoRasterizer
            .rasterize("ab", &FontSpec::new("6x10", 10), 100)
            .unwrap();
        assert_eq!(short.width(), 12);
    }

    #[test]
    fn scaling_doubles_each_pixel() {
        let mut mask = TextMask::new(2, 1);
        mask.bits[1] = true;
        let big = mask.scaled(2);
        assert_eq!((big.width(), big.height()), (4, 2));
        let ink: Vec<_> = big.ink().collect();
        assert_eq!(ink, vec![(2, 0), (3, 0), (2, 1), (3, 1)]);
    }
}
