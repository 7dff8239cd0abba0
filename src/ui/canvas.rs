//! In-memory bitmaps built before a commit

use image::{Rgb, RgbImage};

/// Logical edge length of the square panel
pub const SCREEN_SIZE: u32 = 240;

/// Opaque 8-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLUE: Color = Color::new(0, 0, 255);
    /// Flat dark-gray fill behind text and stats
    pub const BACKGROUND: Color = Color::new(51, 51, 51);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `RRGGBB`, with or without a leading `#`
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    fn to_pixel(self) -> Rgb<u8> {
        Rgb([self.r, self.g, self.b])
    }
}

impl From<Rgb<u8>> for Color {
    fn from(px: Rgb<u8>) -> Self {
        Self::new(px[0], px[1], px[2])
    }
}

/// A bitmap plus the screen position of its top-left corner.
///
/// Committing a canvas only touches the device pixels it covers.
#[derive(Debug, Clone)]
pub struct Canvas {
    origin: (u32, u32),
    pixels: RgbImage,
}

impl Canvas {
    /// Full-screen canvas filled with `color`
    pub fn filled(color: Color) -> Self {
        Self {
            origin: (0, 0),
            pixels: RgbImage::from_pixel(SCREEN_SIZE, SCREEN_SIZE, color.to_pixel()),
        }
    }

    /// Place an arbitrary bitmap at `origin` without scaling
    pub fn placed(origin: (u32, u32), pixels: RgbImage) -> Self {
        Self { origin, pixels }
    }

    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        (x < self.width() && y < self.height()).then(|| Color::from(*self.pixels.get_pixel(x, y)))
    }

    /// Copy `src` onto this canvas at its top-left; only the overlap changes
    pub fn copy_from(&mut self, src: &RgbImage) {
        let w = src.width().min(self.width());
        let h = src.height().min(self.height());
        for y in 0..h {
            for x in 0..w {
                self.pixels.put_pixel(x, y, *src.get_pixel(x, y));
            }
        }
    }

    /// Blend `color` over the pixel at (x, y) with 8-bit coverage
    pub fn blend(&mut self, x: i32, y: i32, color: Color, coverage: u8) {
        if x < 0 || y < 0 || coverage == 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.width() || y >= self.height() {
            return;
        }

        let px = self.pixels.get_pixel_mut(x, y);
        let a = coverage as u32;
        let mix = |bg: u8, fg: u8| ((bg as u32 * (255 - a) + fg as u32 * a + 127) / 255) as u8;
        *px = Rgb([mix(px[0], color.r), mix(px[1], color.g), mix(px[2], color.b)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_canvas_covers_whole_screen() {
        let canvas = Canvas::filled(Color::new(10, 20, 30));
        assert_eq!(canvas.origin(), (0, 0));
        assert_eq!((canvas.width(), canvas.height()), (SCREEN_SIZE, SCREEN_SIZE));
        assert!(canvas.pixels().pixels().all(|px| px.0 == [10, 20, 30]));
    }

    #[test]
    fn copy_from_only_touches_overlap() {
        let mut canvas = Canvas::filled(Color::BLACK);
        let src = RgbImage::from_pixel(10, 300, Rgb([255, 0, 0]));
        canvas.copy_from(&src);
        assert_eq!(canvas.pixel(9, 239), Some(Color::new(255, 0, 0)));
        assert_eq!(canvas.pixel(10, 0), Some(Color::BLACK));
    }

    #[test]
    fn blend_extremes() {
        let mut canvas = Canvas::filled(Color::BLACK);
        canvas.blend(0, 0, Color::WHITE, 255);
        canvas.blend(1, 0, Color::WHITE, 0);
        canvas.blend(-1, 0, Color::WHITE, 255);
        canvas.blend(500, 0, Color::WHITE, 255);
        assert_eq!(canvas.pixel(0, 0), Some(Color::WHITE));
        assert_eq!(canvas.pixel(1, 0), Some(Color::BLACK));
    }

    #[test]
    fn hex_colors() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::new(255, 128, 0)));
        assert_eq!(Color::from_hex("00FF00"), Some(Color::new(0, 255, 0)));
        assert_eq!(Color::from_hex("fff"), None);
        assert_eq!(Color::from_hex("gg0000"), None);
    }
}
