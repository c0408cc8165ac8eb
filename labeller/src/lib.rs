//! `labeller`
//!
//! Composes barcode labels and prints them on whichever label printer is plugged in.
//!
//! A [`LabelSpec`] describes the text and barcode payload. The [`Composer`] fits it onto a
//! canvas, the resolver picks a printer from what the spooler knows and what is on the USB bus,
//! and a [`PrintBackend`] sends the raster off. [`Pipeline`] ties the steps together.

pub mod backend;
pub mod barcode;
pub mod compose;
pub mod config;
pub mod error;
pub mod fit;
pub mod font;
pub mod label;
pub mod layout;
pub mod pipeline;
pub mod resolve;

pub use backend::{CupsBackend, PrintBackend, StaticBackend, UsbBus};
pub use compose::{ComposedLabel, Composer, MediaParams};
pub use error::{
    BackendError, ConfigError, LayoutError, PipelineError, PipelineResult, ResolveError,
    ValidationError,
};
pub use font::LabelFont;
pub use label::{BarcodeField, Canvas, LabelSpec, Role, TextField};
pub use layout::Layout;
pub use pipeline::{Pipeline, Printed};
pub use resolve::{resolve_printer, BusId, PrinterDescriptor};

/// Canvas used when neither the label nor the printer says otherwise, in pixels.
pub const DEFAULT_CANVAS: Canvas = Canvas::new(1050, 420);

/// Resolution labels are composed for unless configured otherwise.
pub const DEFAULT_DPI: u32 = 300;
