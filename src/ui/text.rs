//! Text layout and glyph rasterization
//!
//! Layout follows the usual 2D-context "draw string wrapped" model: the
//! block of wrapped lines is anchored by its centre at (x, y), each line is
//! aligned inside a box of the wrap width, and lines advance by a fixed
//! multiple of the nominal font height.

use fontdue::{Font, FontSettings};
use std::path::Path;
use std::str::FromStr;

use super::{Canvas, Color};
use crate::error::{RenderError, RenderResult};

/// Line advance as a multiple of the font height
pub const LINE_SPACING: f32 = 1.5;

/// A rasterized glyph: coverage bitmap plus its offset from the pen
#[derive(Debug, Clone, Default)]
pub struct Glyph {
    pub xmin: i32,
    pub ymin: i32,
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

/// Source of glyph metrics and bitmaps
pub trait Typeface: Send + Sync {
    fn advance(&self, ch: char, px: f32, bold: bool) -> f32;

    fn kern(&self, _left: char, _right: char, _px: f32, _bold: bool) -> f32 {
        0.0
    }

    fn glyph(&self, ch: char, px: f32, bold: bool) -> Glyph;
}

/// Regular and bold faces loaded from TTF/OTF data
pub struct FontSet {
    regular: Font,
    bold: Font,
}

impl FontSet {
    pub fn load(regular: &Path, bold: &Path) -> RenderResult<Self> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| RenderError::Font(format!("Failed to read {}: {e}", path.display())))
        };
        Self::from_bytes(&read(regular)?, &read(bold)?)
    }

    pub fn from_bytes(regular: &[u8], bold: &[u8]) -> RenderResult<Self> {
        let parse = |data: &[u8], name: &str| {
            Font::from_bytes(data, FontSettings::default())
                .map_err(|e| RenderError::Font(format!("Failed to parse {name} face: {e}")))
        };
        Ok(Self {
            regular: parse(regular, "regular")?,
            bold: parse(bold, "bold")?,
        })
    }

    fn face(&self, bold: bool) -> &Font {
        if bold {
            &self.bold
        } else {
            &self.regular
        }
    }
}

impl Typeface for FontSet {
    fn advance(&self, ch: char, px: f32, bold: bool) -> f32 {
        self.face(bold).metrics(ch, px).advance_width
    }

    fn kern(&self, left: char, right: char, px: f32, bold: bool) -> f32 {
        self.face(bold).horizontal_kern(left, right, px).unwrap_or(0.0)
    }

    fn glyph(&self, ch: char, px: f32, bold: bool) -> Glyph {
        let (metrics, coverage) = self.face(bold).rasterize(ch, px);
        Glyph {
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            width: metrics.width,
            height: metrics.height,
            coverage,
        }
    }
}

/// Horizontal alignment of each line inside the wrap box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl FromStr for Align {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Align::Left),
            "center" | "centre" => Ok(Align::Center),
            "right" => Ok(Align::Right),
            other => Err(RenderError::InvalidInput(format!(
                "align must be left, center or right (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub color: Color,
    pub bold: bool,
    pub align: Align,
}

impl TextStyle {
    pub fn new(size: f32, color: Color, bold: bool) -> Self {
        Self { size, color, bold, align: Align::Center }
    }

    /// Nominal line height for the point size at 72 dpi on a 96 dpi grid
    pub fn line_height(&self) -> f32 {
        self.size * 72.0 / 96.0
    }
}

/// Width of `s` on a single line
pub fn measure(face: &dyn Typeface, s: &str, style: &TextStyle) -> f32 {
    let mut width = 0.0;
    let mut prev: Option<char> = None;
    for ch in s.chars() {
        if let Some(p) = prev {
            width += face.kern(p, ch, style.size, style.bold);
        }
        width += face.advance(ch, style.size, style.bold);
        prev = Some(ch);
    }
    width
}

/// Break `text` into lines no wider than `width`.
///
/// Explicit newlines always break. A word that alone exceeds `width` gets a
/// line of its own. Lines are trimmed and blank source lines vanish.
pub fn wrap(face: &dyn Typeface, text: &str, style: &TextStyle, width: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for source_line in text.split('\n') {
        let mut fields = split_on_space(source_line);
        if fields.len() % 2 == 1 {
            fields.push("");
        }

        let mut current = String::new();
        for pair in fields.chunks(2) {
            let (word, gap) = (pair[0], pair[1]);
            let candidate = format!("{current}{word}");
            if measure(face, &candidate, style) > width {
                if current.is_empty() {
                    lines.push(word.to_string());
                    continue;
                }
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
            current.push_str(gap);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines.into_iter().map(|l| l.trim().to_string()).collect()
}

/// Split into alternating runs of non-space and space characters
fn split_on_space(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_space = false;
    for (i, ch) in s.char_indices() {
        let space = ch.is_whitespace();
        if space != prev_space && i > 0 {
            out.push(&s[start..i]);
            start = i;
        }
        prev_space = space;
    }
    out.push(&s[start..]);
    out
}

/// Draw word-wrapped `text` centred on (x, y)
pub fn draw_wrapped(
    canvas: &mut Canvas,
    face: &dyn Typeface,
    text: &str,
    x: f32,
    y: f32,
    width: f32,
    style: &TextStyle,
) {
    let lh = style.line_height();
    let lines = wrap(face, text, style, width);
    let block = lines.len() as f32 * lh * LINE_SPACING - (LINE_SPACING - 1.0) * lh;

    let mut left = x - 0.5 * width;
    let mut top = y - 0.5 * block;
    let anchor = match style.align {
        Align::Left => 0.0,
        Align::Center => {
            left += width / 2.0;
            0.5
        }
        Align::Right => {
            left += width;
            1.0
        }
    };

    for line in &lines {
        let w = measure(face, line, style);
        draw_line(canvas, face, line, left - anchor * w, top + lh, style);
        top += lh * LINE_SPACING;
    }
}

/// Draw one line with its baseline at `baseline`
fn draw_line(
    canvas: &mut Canvas,
    face: &dyn Typeface,
    line: &str,
    x: f32,
    baseline: f32,
    style: &TextStyle,
) {
    let mut pen = x;
    let mut prev: Option<char> = None;

    for ch in line.chars() {
        if let Some(p) = prev {
            pen += face.kern(p, ch, style.size, style.bold);
        }

        let glyph = face.glyph(ch, style.size, style.bold);
        let gx = (pen + glyph.xmin as f32).round() as i32;
        let gy = (baseline - glyph.ymin as f32 - glyph.height as f32).round() as i32;
        for row in 0..glyph.height {
            for col in 0..glyph.width {
                let coverage = glyph.coverage[row * glyph.width + col];
                canvas.blend(gx + col as i32, gy + row as i32, style.color, coverage);
            }
        }

        pen += face.advance(ch, style.size, style.bold);
        prev = Some(ch);
    }
}
