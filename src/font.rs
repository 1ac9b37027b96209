use std::path::Path;

use image::{GrayImage, Luma};
use rusttype::{Font, PositionedGlyph, Scale, point};
use tracing::debug;

use crate::error::{PrintError, PrintResult};

/// Rows kept below the last inked row so descenders are not clipped.
pub const TRIM_MARGIN: u32 = 10;

pub const DEFAULT_FONT: &str = "HackNerdFontMono-Regular.ttf";

/// Width of a run of text in pixels.
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> f32;
}

/// A loaded TTF/OTF face at a fixed pixel size.
pub struct TextFont {
    font: Font<'static>,
    scale: Scale,
}

impl TextFont {
    pub fn new(font: Font<'static>, size: f32) -> Self {
        Self {
            font,
            scale: Scale::uniform(size),
        }
    }

    /// Loads a font file from disk.
    pub fn load<P: AsRef<Path>>(path: P, size: f32) -> PrintResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            PrintError::Decode(format!("cannot read font {}: {}", path.display(), e))
        })?;
        let font = Font::try_from_vec(data)
            .ok_or_else(|| PrintError::Decode(format!("invalid font {}", path.display())))?;
        debug!(path = %path.display(), size, "font loaded");
        Ok(Self::new(font, size))
    }

    fn line_height(&self) -> u32 {
        let v = self.font.v_metrics(self.scale);
        (v.ascent - v.descent + v.line_gap).ceil().max(1.0) as u32
    }

    /// Wraps and draws `lines` onto a white canvas `width` pixels wide, then
    /// trims it to the inked area. Returns `None` when nothing was drawn.
    pub fn render_lines(&self, lines: &[String], width: u32) -> Option<GrayImage> {
        let wrapped = wrap_lines(lines, self, width as f32);
        let canvas = self.rasterize(&wrapped, width);
        trim(&canvas)
    }

    fn rasterize(&self, lines: &[String], width: u32) -> GrayImage {
        let line_height = self.line_height();
        let ascent = self.font.v_metrics(self.scale).ascent;
        let height = line_height * (lines.len().max(1) as u32) + TRIM_MARGIN;
        let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));

        for (idx, line) in lines.iter().enumerate() {
            let baseline = (idx as u32 * line_height) as f32 + ascent;
            let glyphs: Vec<PositionedGlyph> = self
                .font
                .layout(line, self.scale, point(0.0, baseline))
                .collect();
            for glyph in glyphs {
                let Some(bb) = glyph.pixel_bounding_box() else {
                    continue;
                };
                glyph.draw(|gx, gy, v| {
                    let px = bb.min.x + gx as i32;
                    let py = bb.min.y + gy as i32;
                    if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                        return;
                    }
                    let ink = 255 - (v.clamp(0.0, 1.0) * 255.0) as u8;
                    let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                    pixel[0] = pixel[0].min(ink);
                });
            }
        }
        canvas
    }
}

impl TextMeasure for TextFont {
    fn text_width(&self, text: &str) -> f32 {
        text.chars()
            .map(|ch| {
                self.font
                    .glyph(ch)
                    .scaled(self.scale)
                    .h_metrics()
                    .advance_width
            })
            .sum()
    }
}

/// Greedy word wrap of one line.
///
/// A line that already fits is returned untouched. Otherwise words are added
/// to the current line while it stays within `max_width`; a single word wider
/// than `max_width` gets a line of its own.
pub fn wrap_text<M: TextMeasure + ?Sized>(text: &str, measure: &M, max_width: f32) -> Vec<String> {
    if measure.text_width(text) <= max_width {
        return vec![text.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure.text_width(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    lines.push(current);
    lines
}

/// Wraps every input line, dropping line terminators. Blank lines stay.
pub fn wrap_lines<M: TextMeasure + ?Sized>(
    lines: &[String],
    measure: &M,
    max_width: f32,
) -> Vec<String> {
    lines
        .iter()
        .flat_map(|line| wrap_text(line.trim_end_matches(['\r', '\n']), measure, max_width))
        .collect()
}

/// Crops to the bounding box of non-white pixels plus [`TRIM_MARGIN`] rows
/// below it (clamped to the canvas). `None` for an all-white canvas.
pub fn trim(img: &GrayImage) -> Option<GrayImage> {
    let mut bbox: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p[0] == 255 {
            continue;
        }
        bbox = Some(match bbox {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bbox?;
    let bottom = (y1 + 1 + TRIM_MARGIN).min(img.height());
    Some(image::imageops::crop_imm(img, x0, y0, x1 + 1 - x0, bottom - y0).to_image())
}
