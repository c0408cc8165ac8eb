//! `layout`
//!
//! How the canvas is divided between the parts of a label. The division is a table of
//! weighted bands rather than per-field code, so it can be replaced from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, fit::FontSizes, label::Canvas, label::Role};

/// An axis-aligned rectangle of pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Region {
    /// Creates a new [`Region`].
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the right-most column.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom row.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the pixel at `(x, y)` lies inside the region.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Whether `other` lies entirely inside this region.
    pub fn encloses(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Shrinks the region by `dx` on the left and right and `dy` on the top and bottom.
    ///
    /// Never shrinks below zero size.
    #[must_use]
    pub fn inset(&self, dx: u32, dy: u32) -> Region {
        let dx = dx.min(self.width / 2);
        let dy = dy.min(self.height / 2);
        Region {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width - 2 * dx,
            height: self.height - 2 * dy,
        }
    }

    /// Splits the region into `count` columns of (nearly) equal width, left to right.
    pub fn columns(&self, count: u32) -> Vec<Region> {
        let count = count.max(1);
        (0..count)
            .map(|i| {
                let left = scale_u32(self.width, i, count);
                let right = scale_u32(self.width, i + 1, count);
                Region::new(self.x + left, self.y, right - left, self.height)
            })
            .collect()
    }

    /// Splits the region into a top part and a bottom part holding `bottom_ratio` of the height.
    pub fn split_bottom(&self, bottom_ratio: f32) -> (Region, Region) {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let bottom = ((self.height as f32) * bottom_ratio.clamp(0.0, 1.0)).round() as u32;
        let top = self.height - bottom.min(self.height);
        (
            Region::new(self.x, self.y, self.width, top),
            Region::new(self.x, self.y + top, self.width, self.height - top),
        )
    }

    /// Centres a `width` × `height` box inside the region, returning its top-left corner.
    pub fn centre(&self, width: u32, height: u32) -> (u32, u32) {
        (
            self.x + self.width.saturating_sub(width) / 2,
            self.y + self.height.saturating_sub(height) / 2,
        )
    }
}

/// `value * numerator / denominator` without overflow.
fn scale_u32(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(numerator) / u64::from(denominator);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// A horizontal band of the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Text fields with [`Role::Title`].
    Title,
    /// Text fields with [`Role::Subtitle`].
    Subtitle,
    /// Text fields with [`Role::Body`].
    Body,
    /// The barcode, and its human readable line if enabled.
    Barcode,
    /// Text fields with [`Role::Caption`].
    Caption,
    /// Text fields with [`Role::Footer`].
    Footer,
}

impl From<Role> for Slot {
    fn from(role: Role) -> Self {
        match role {
            Role::Title => Slot::Title,
            Role::Subtitle => Slot::Subtitle,
            Role::Body => Slot::Body,
            Role::Caption => Slot::Caption,
            Role::Footer => Slot::Footer,
        }
    }
}

/// One row of the layout table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// What goes in the band.
    pub slot: Slot,
    /// Share of the canvas height, relative to the other bands in use.
    pub weight: f32,
}

/// The layout table.
///
/// Bands are stacked top to bottom in table order. Only bands that have content take part:
/// the canvas height is shared between them in proportion to their weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Bands, top to bottom.
    pub bands: Vec<Band>,
    /// Blank margin at the left and right edges, as a fraction of the canvas width. Half the
    /// same fraction of the canvas height is kept clear above and below each band.
    pub margin: f32,
    /// Share of the barcode band given to the human readable line, when there is one.
    pub barcode_caption_ratio: f32,
    /// Font sizes to try when fitting text.
    pub font_sizes: FontSizes,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            bands: vec![
                Band {
                    slot: Slot::Title,
                    weight: 3.0,
                },
                Band {
                    slot: Slot::Subtitle,
                    weight: 2.0,
                },
                Band {
                    slot: Slot::Body,
                    weight: 2.0,
                },
                Band {
                    slot: Slot::Barcode,
                    weight: 4.0,
                },
                Band {
                    slot: Slot::Caption,
                    weight: 1.0,
                },
                Band {
                    slot: Slot::Footer,
                    weight: 1.0,
                },
            ],
            margin: 0.02,
            barcode_caption_ratio: 0.2,
            font_sizes: FontSizes::default(),
        }
    }
}

impl Layout {
    /// Reads a layout table from a JSON file. Missing keys take their default values.
    ///
    /// # Errors
    /// [`ConfigError`] if the file cannot be read or parsed, or describes an unusable layout.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let layout: Layout = serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        layout.validate()?;

        Ok(layout)
    }

    /// Checks the table for values that cannot produce a label.
    ///
    /// # Errors
    /// [`ConfigError::InvalidLayout`] describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_band(Slot::Barcode) {
            return Err(ConfigError::InvalidLayout(
                "there is no band for the barcode".to_string(),
            ));
        }
        if let Some(band) = self
            .bands
            .iter()
            .find(|band| !(band.weight.is_finite() && band.weight > 0.0))
        {
            return Err(ConfigError::InvalidLayout(format!(
                "band {:?} has weight {}, weights must be positive",
                band.slot, band.weight
            )));
        }
        for (index, band) in self.bands.iter().enumerate() {
            if self.bands[..index].iter().any(|b| b.slot == band.slot) {
                return Err(ConfigError::InvalidLayout(format!(
                    "band {:?} appears twice",
                    band.slot
                )));
            }
        }
        if !(0.0..0.25).contains(&self.margin) {
            return Err(ConfigError::InvalidLayout(format!(
                "margin {} is outside 0..0.25",
                self.margin
            )));
        }
        if !(self.barcode_caption_ratio > 0.0 && self.barcode_caption_ratio < 1.0) {
            return Err(ConfigError::InvalidLayout(format!(
                "barcode caption ratio {} is outside 0..1",
                self.barcode_caption_ratio
            )));
        }
        self.font_sizes.validate()
    }

    /// Whether the table has a band for `slot`.
    pub fn has_band(&self, slot: Slot) -> bool {
        self.bands.iter().any(|band| band.slot == slot)
    }

    /// Divides the canvas between the bands whose slot has content.
    ///
    /// # Arguments
    /// * `canvas`: The canvas to divide.
    /// * `in_use`: Whether a slot has anything to draw.
    ///
    /// # Returns
    /// The content box of every band in use, top to bottom, margins already removed.
    /// Adjacent bands share their boundary so the whole height is accounted for.
    pub fn partition(&self, canvas: Canvas, in_use: impl Fn(Slot) -> bool) -> Vec<(Slot, Region)> {
        let bands: Vec<&Band> = self.bands.iter().filter(|band| in_use(band.slot)).collect();
        let total: f64 = bands.iter().map(|band| f64::from(band.weight)).sum();
        if bands.is_empty() || total <= 0.0 {
            return Vec::new();
        }

        let pad_x = fraction_of(canvas.width, self.margin);
        let pad_y = fraction_of(canvas.height, self.margin / 2.0);

        let mut cumulative = 0.0;
        let mut top = 0;
        bands
            .into_iter()
            .map(|band| {
                cumulative += f64::from(band.weight);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let bottom = (f64::from(canvas.height) * cumulative / total).round() as u32;
                let bottom = bottom.min(canvas.height);
                let region = Region::new(0, top, canvas.width, bottom - top).inset(pad_x, pad_y);
                top = bottom;
                (band.slot, region)
            })
            .collect()
    }
}

/// `fraction` of `value`, rounded to whole pixels.
fn fraction_of(value: u32, fraction: f32) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pixels = (f64::from(value) * f64::from(fraction)).round().max(0.0) as u32;
    pixels
}
