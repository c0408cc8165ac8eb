//! `compose`
//!
//! Draws a [`LabelSpec`] onto a raster canvas.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use log::debug;

use crate::{
    barcode::{self, Symbol},
    error::LayoutError,
    fit::{fit_barcode, fit_text_run},
    font::LabelFont,
    label::{Canvas, LabelSpec, Role},
    layout::{Layout, Region, Slot},
    DEFAULT_CANVAS,
};

const WHITE: Luma<u8> = Luma([255]);
const BLACK: Luma<u8> = Luma([0]);

/// Media parameters handed to the spooler along with the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaParams {
    /// Raster width in pixels.
    pub width_px: u32,
    /// Raster height in pixels.
    pub height_px: u32,
    /// Resolution the raster was composed for.
    pub dpi: u32,
}

/// What was drawn in a [`PlacedField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A text field.
    Text {
        /// The field's role.
        role: Role,
        /// The chosen font size in pixels.
        font_size: u32,
    },
    /// The bars of the barcode.
    Barcode {
        /// The chosen module width in pixels.
        module_width: u32,
    },
    /// The payload printed under the bars.
    BarcodeText {
        /// The chosen font size in pixels.
        font_size: u32,
    },
}

/// A field as it ended up on the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedField {
    /// What the field is.
    pub kind: FieldKind,
    /// The box the field was given.
    pub allotted: Region,
    /// The box actually inked, always inside `allotted`.
    pub drawn: Region,
}

/// A finished label: the raster plus where everything went.
#[derive(Debug, Clone)]
pub struct ComposedLabel {
    /// The raster, white background and black ink.
    image: GrayImage,
    /// Every field drawn, in drawing order.
    fields: Vec<PlacedField>,
}

impl ComposedLabel {
    /// The raster.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// The fields drawn, in drawing order.
    pub fn fields(&self) -> &[PlacedField] {
        &self.fields
    }

    /// The placed barcode bars.
    pub fn barcode(&self) -> Option<&PlacedField> {
        self.fields
            .iter()
            .find(|field| matches!(field.kind, FieldKind::Barcode { .. }))
    }

    /// Canvas dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.image.width(), self.image.height())
    }

    /// Media parameters for submitting this raster at `dpi`.
    pub fn media(&self, dpi: u32) -> MediaParams {
        MediaParams {
            width_px: self.image.width(),
            height_px: self.image.height(),
            dpi,
        }
    }

    /// Turns the label a quarter turn clockwise, for media loaded in portrait.
    ///
    /// Field boxes are carried along so they still describe the rotated raster.
    #[must_use]
    pub fn rotate_quarter(self) -> Self {
        let height = self.image.height();
        let turn = |r: Region| Region::new(height - r.y - r.height, r.x, r.height, r.width);

        ComposedLabel {
            image: image::imageops::rotate90(&self.image),
            fields: self
                .fields
                .into_iter()
                .map(|field| PlacedField {
                    kind: field.kind,
                    allotted: turn(field.allotted),
                    drawn: turn(field.drawn),
                })
                .collect(),
        }
    }

    /// Encodes the raster as PNG.
    ///
    /// # Errors
    /// Whatever the PNG encoder reports.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Lays labels out and draws them. Holds no per-label state, so one composer can serve any
/// number of threads.
#[derive(Debug, Clone)]
pub struct Composer {
    /// Typeface for every text field.
    font: LabelFont,
    /// How the canvas is divided.
    layout: Layout,
    /// Canvas used when a spec does not name one.
    default_canvas: Canvas,
}

impl Composer {
    /// Creates a new [`Composer`].
    ///
    /// # Arguments
    /// * `font`: The typeface to set text in.
    /// * `layout`: How to divide the canvas.
    pub fn new(font: LabelFont, layout: Layout) -> Self {
        Composer {
            font,
            layout,
            default_canvas: DEFAULT_CANVAS,
        }
    }

    /// Replaces the canvas used for specs that do not carry one.
    #[must_use]
    pub fn with_default_canvas(mut self, canvas: Canvas) -> Self {
        self.default_canvas = canvas;
        self
    }

    /// The canvas used for specs that do not carry one.
    pub fn default_canvas(&self) -> Canvas {
        self.default_canvas
    }

    /// The layout table in use.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Composes `spec` on its own canvas, or the default canvas if it has none.
    ///
    /// # Errors
    /// See [`Composer::compose_on`].
    pub fn compose(&self, spec: &LabelSpec) -> Result<ComposedLabel, LayoutError> {
        self.compose_on(spec, spec.canvas.unwrap_or(self.default_canvas))
    }

    /// Composes `spec` on a canvas of the given size.
    ///
    /// Text fields are fitted and centred in their band, fields sharing a role split the band
    /// into equal columns. The barcode is scaled to whole-pixel modules and centred.
    ///
    /// # Arguments
    /// * `spec`: The label.
    /// * `canvas`: Canvas size, overriding any in `spec`.
    ///
    /// # Errors
    /// [`LayoutError::Canvas`] for a canvas that cannot be allocated,
    /// [`LayoutError::MissingBand`] if the layout has nowhere to put a field, otherwise
    /// [`LayoutError`] from fitting or encoding, passed through untouched.
    pub fn compose_on(
        &self,
        spec: &LabelSpec,
        canvas: Canvas,
    ) -> Result<ComposedLabel, LayoutError> {
        canvas.check()?;
        let needed = std::iter::once(Slot::Barcode)
            .chain(spec.fields.iter().map(|field| Slot::from(field.role)));
        for slot in needed {
            if !self.layout.has_band(slot) {
                return Err(LayoutError::MissingBand { slot });
            }
        }

        let symbol = barcode::encode(&spec.barcode.payload)?;
        let mut label = ComposedLabel {
            image: GrayImage::from_pixel(canvas.width, canvas.height, WHITE),
            fields: Vec::with_capacity(spec.fields.len() + 2),
        };

        let bands = self.layout.partition(canvas, |slot| {
            slot == Slot::Barcode || spec.fields.iter().any(|f| Slot::from(f.role) == slot)
        });

        for (slot, region) in bands {
            if slot == Slot::Barcode {
                self.draw_barcode(&mut label, &symbol, spec, region)?;
                continue;
            }

            let fields: Vec<_> = spec
                .fields
                .iter()
                .filter(|field| Slot::from(field.role) == slot)
                .collect();
            #[allow(clippy::cast_possible_truncation)]
            let columns = region.columns(fields.len() as u32);
            let gutter = columns.len() > 1;
            for (field, column) in fields.into_iter().zip(columns) {
                let column = if gutter {
                    column.inset(column.width / 40, 0)
                } else {
                    column
                };
                let (font_size, drawn) = self.draw_text(&mut label.image, &field.content, column)?;
                label.fields.push(PlacedField {
                    kind: FieldKind::Text {
                        role: field.role,
                        font_size,
                    },
                    allotted: column,
                    drawn,
                });
            }
        }

        debug!(
            "composed {}x{} label with {} fields",
            canvas.width,
            canvas.height,
            label.fields.len()
        );
        Ok(label)
    }

    /// Fits `text` into `region` and draws it centred.
    ///
    /// # Returns
    /// The font size used and the inked box.
    fn draw_text(
        &self,
        image: &mut GrayImage,
        text: &str,
        region: Region,
    ) -> Result<(u32, Region), LayoutError> {
        let candidates = self.layout.font_sizes.candidates();
        let (fit, run) = fit_text_run(&self.font, text, region.width, region.height, &candidates)?;
        let (x, y) = region.centre(fit.width, fit.height);
        run.draw(image, x, y, region);

        Ok((fit.font_size, Region::new(x, y, fit.width, fit.height)))
    }

    /// Draws the bars, and the human readable line if asked for, into the barcode band.
    fn draw_barcode(
        &self,
        label: &mut ComposedLabel,
        symbol: &Symbol,
        spec: &LabelSpec,
        region: Region,
    ) -> Result<(), LayoutError> {
        let (bars, caption) = if spec.barcode.human_readable {
            let (bars, caption) = region.split_bottom(self.layout.barcode_caption_ratio);
            (bars, Some(caption))
        } else {
            (region, None)
        };

        let fit = fit_barcode(symbol.total_modules(), bars.width, bars.height)?;
        let (left, top) = bars.centre(fit.width, fit.bar_height);

        let mut x = left;
        for run in symbol.runs() {
            let width = run.modules * fit.module_width;
            if run.is_bar {
                fill(&mut label.image, Region::new(x, top, width, fit.bar_height));
            }
            x += width;
        }
        label.fields.push(PlacedField {
            kind: FieldKind::Barcode {
                module_width: fit.module_width,
            },
            allotted: bars,
            drawn: Region::new(left, top, fit.width, fit.bar_height),
        });

        if let Some(caption) = caption {
            let (font_size, drawn) =
                self.draw_text(&mut label.image, &spec.barcode.payload, caption)?;
            label.fields.push(PlacedField {
                kind: FieldKind::BarcodeText { font_size },
                allotted: caption,
                drawn,
            });
        }

        Ok(())
    }
}

/// Paints `region` black.
fn fill(image: &mut GrayImage, region: Region) {
    for y in region.y..region.bottom().min(image.height()) {
        for x in region.x..region.right().min(image.width()) {
            image.put_pixel(x, y, BLACK);
        }
    }
}
