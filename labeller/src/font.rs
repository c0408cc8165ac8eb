//! `font`
//!
//! Lays text out with the font's real glyph metrics and draws it onto a grayscale canvas.

use std::path::Path;

use image::GrayImage;
use rusttype::{point, Font, PositionedGlyph, Scale};

use crate::{error::ConfigError, layout::Region};

/// DejaVu Sans Mono, used unless another font is configured.
static BUNDLED_FONT: &[u8] = include_bytes!("../fonts/DejaVuSansMono.ttf");

/// The typeface every text field is set in.
///
/// Cloning is cheap, the font data is shared.
#[derive(Clone, Debug)]
pub struct LabelFont {
    /// The parsed font.
    font: Font<'static>,
}

impl LabelFont {
    /// The font bundled with the crate.
    ///
    /// # Panics
    /// Never in practice, the bundled file is a valid font.
    pub fn bundled() -> Self {
        LabelFont {
            font: Font::try_from_bytes(BUNDLED_FONT).expect("The bundled font must be valid"),
        }
    }

    /// Loads a TrueType or OpenType font from disk.
    ///
    /// # Errors
    /// [`ConfigError::Read`] if the file cannot be read, [`ConfigError::InvalidFont`] if it is
    /// not a font.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let font = Font::try_from_vec(data).ok_or(ConfigError::InvalidFont { path: display })?;

        Ok(LabelFont { font })
    }

    /// Lays out a single line of text at `size` pixels.
    ///
    /// Kerning is applied, and the reported bounds are the union of the rasterised glyph
    /// boxes, so they match what [`TextRun::draw`] will touch exactly.
    pub fn layout(&self, text: &str, size: u32) -> TextRun {
        #[allow(clippy::cast_precision_loss)]
        let scale = Scale::uniform(size as f32);
        let ascent = self.font.v_metrics(scale).ascent;
        let glyphs: Vec<PositionedGlyph<'static>> =
            self.font.layout(text, scale, point(0.0, ascent)).collect();

        let bounds = glyphs
            .iter()
            .filter_map(PositionedGlyph::pixel_bounding_box)
            .fold(None, |acc: Option<InkBounds>, bb| {
                let bb = InkBounds {
                    min_x: bb.min.x,
                    min_y: bb.min.y,
                    max_x: bb.max.x,
                    max_y: bb.max.y,
                };
                Some(match acc {
                    Some(acc) => acc.union(bb),
                    None => bb,
                })
            });

        TextRun { glyphs, bounds }
    }
}

/// Pixel extents of the ink of a text run, relative to the layout origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InkBounds {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl InkBounds {
    fn union(self, other: InkBounds) -> InkBounds {
        InkBounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// A line of text laid out at one size, ready to measure and draw.
#[derive(Debug, Clone)]
pub struct TextRun {
    /// Glyphs positioned relative to the layout origin.
    glyphs: Vec<PositionedGlyph<'static>>,
    /// Ink extents; `None` when nothing would be drawn (empty or blank text).
    bounds: Option<InkBounds>,
}

impl TextRun {
    /// Width of the ink in pixels.
    pub fn width(&self) -> u32 {
        self.bounds
            .map_or(0, |b| (b.max_x - b.min_x).unsigned_abs())
    }

    /// Height of the ink in pixels.
    pub fn height(&self) -> u32 {
        self.bounds
            .map_or(0, |b| (b.max_y - b.min_y).unsigned_abs())
    }

    /// Draws the run in black so that the top-left of its ink lands on `(x, y)`.
    ///
    /// Coverage is blended onto the existing pixels. Nothing is drawn outside `clip`.
    ///
    /// # Arguments
    /// * `image`: Canvas to draw on.
    /// * `x`, `y`: Where the ink's top-left corner goes.
    /// * `clip`: The region the run may touch.
    pub fn draw(&self, image: &mut GrayImage, x: u32, y: u32, clip: Region) {
        let Some(bounds) = self.bounds else {
            return;
        };
        let dx = i64::from(x) - i64::from(bounds.min_x);
        let dy = i64::from(y) - i64::from(bounds.min_y);

        for glyph in &self.glyphs {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = i64::from(gx) + i64::from(bb.min.x) + dx;
                let py = i64::from(gy) + i64::from(bb.min.y) + dy;
                let (Ok(px), Ok(py)) = (u32::try_from(px), u32::try_from(py)) else {
                    return;
                };
                if !clip.contains(px, py) || px >= image.width() || py >= image.height() {
                    return;
                }

                let pixel = image.get_pixel_mut(px, py);
                let ink = coverage.clamp(0.0, 1.0);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let value = (f32::from(pixel.0[0]) * (1.0 - ink)).round() as u8;
                pixel.0[0] = value;
            });
        }
    }
}
