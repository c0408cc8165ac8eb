//! `label`
//!
//! The description of a label as received from a caller.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest raster a label may have, in pixels. An 8x12in label at 600dpi is 34.56 million.
pub const MAX_CANVAS_PIXELS: u64 = 40_000_000;

/// The part of the label a text field belongs to.
///
/// Roles map onto horizontal bands of the canvas, see [`crate::layout::Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Largest text, top of the label.
    Title,
    /// Secondary heading under the title.
    Subtitle,
    /// Free text above the barcode.
    Body,
    /// Small text directly under the barcode.
    Caption,
    /// Bottom row, usually several short fields side by side.
    Footer,
}

/// A single line of text to place on the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    /// The text itself.
    pub content: String,
    /// Which band the text goes in.
    pub role: Role,
}

impl TextField {
    /// Creates a new [`TextField`].
    ///
    /// # Arguments
    /// * `content`: The text to print.
    /// * `role`: The band to print it in.
    pub fn new(content: impl Into<String>, role: Role) -> Self {
        TextField {
            content: content.into(),
            role,
        }
    }
}

/// The barcode to place on the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeField {
    /// Data to encode.
    pub payload: String,
    /// Whether to print the payload as text under the bars.
    #[serde(default)]
    pub human_readable: bool,
}

/// Canvas dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Creates a new [`Canvas`].
    pub const fn new(width: u32, height: u32) -> Self {
        Canvas { width, height }
    }

    /// Whether the canvas is taller than it is wide.
    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }

    /// Checks that a raster of this size can be allocated and drawn on.
    ///
    /// # Errors
    /// [`ValidationError::ZeroCanvas`] or [`ValidationError::CanvasTooLarge`].
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.width == 0 || self.height == 0 {
            return Err(ValidationError::ZeroCanvas {
                width: self.width,
                height: self.height,
            });
        }
        if u64::from(self.width) * u64::from(self.height) > MAX_CANVAS_PIXELS {
            return Err(ValidationError::CanvasTooLarge {
                width: self.width,
                height: self.height,
                max_pixels: MAX_CANVAS_PIXELS,
            });
        }
        Ok(())
    }

    /// The same canvas turned on its side so that it is at least as wide as it is tall.
    pub fn landscape(&self) -> Self {
        Canvas {
            width: self.width.max(self.height),
            height: self.width.min(self.height),
        }
    }
}

/// Everything needed to compose one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    /// Canvas size; when absent the printer's media size is used.
    #[serde(default)]
    pub canvas: Option<Canvas>,
    /// Text fields, in the order they should appear within their band.
    #[serde(default)]
    pub fields: Vec<TextField>,
    /// The barcode.
    pub barcode: BarcodeField,
}

impl LabelSpec {
    /// Creates a label with just a barcode and an explicit canvas.
    ///
    /// # Arguments
    /// * `payload`: Barcode data.
    /// * `canvas`: Canvas size in pixels.
    pub fn new(payload: impl Into<String>, canvas: Canvas) -> Self {
        LabelSpec {
            canvas: Some(canvas),
            fields: Vec::new(),
            barcode: BarcodeField {
                payload: payload.into(),
                human_readable: false,
            },
        }
    }

    /// Adds a text field, builder style.
    #[must_use]
    pub fn with_field(mut self, content: impl Into<String>, role: Role) -> Self {
        self.fields.push(TextField::new(content, role));
        self
    }

    /// Turns the human readable payload line on or off, builder style.
    #[must_use]
    pub fn with_human_readable(mut self, human_readable: bool) -> Self {
        self.barcode.human_readable = human_readable;
        self
    }

    /// Checks the structural invariants of the label.
    ///
    /// Whether the payload is encodable is left to [`crate::barcode::encode`].
    ///
    /// # Errors
    /// A [`ValidationError`] describing the first broken invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(canvas) = self.canvas {
            canvas.check()?;
        }

        if self.barcode.payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        Ok(())
    }
}
