//! Error types for the label pipeline.
//!
//! Each stage owns a small enum; [`PipelineError`] wraps them unchanged so callers can still
//! match on the stage that failed.

use thiserror::Error;

use crate::layout::Slot;

/// A label description that is malformed before any layout is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The canvas has a zero dimension.
    #[error("canvas must be at least 1x1 pixels, got {width}x{height}")]
    ZeroCanvas {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },
    /// The canvas holds more pixels than a label raster may.
    #[error("canvas {width}x{height} exceeds the limit of {max_pixels} pixels")]
    CanvasTooLarge {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
        /// The limit, see [`crate::label::MAX_CANVAS_PIXELS`].
        max_pixels: u64,
    },
    /// There is nothing to encode in the barcode.
    #[error("barcode payload is empty")]
    EmptyPayload,
}

/// The label cannot be laid out on the canvas it was given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Even the smallest candidate font size overflows the box.
    #[error("no font size fits {text:?} into a {width}x{height} box")]
    NoFittingSize {
        /// The text that did not fit.
        text: String,
        /// Width of the box in pixels.
        width: u32,
        /// Height of the box in pixels.
        height: u32,
    },
    /// One pixel per module is already wider than the box.
    #[error("barcode needs {modules} modules but only {max_width}x{max_height} pixels are available")]
    BarcodeTooWide {
        /// Total module count of the symbol.
        modules: u32,
        /// Width of the box in pixels.
        max_width: u32,
        /// Height of the box in pixels.
        max_height: u32,
    },
    /// The payload holds a character that Code 128 set B/C cannot express.
    #[error("unsupported barcode character {character:?} at position {position}")]
    UnsupportedCharacter {
        /// The offending character.
        character: char,
        /// Its index, in characters, within the payload.
        position: usize,
    },
    /// The label has content for a band the layout table does not have.
    #[error("layout has no {slot:?} band")]
    MissingBand {
        /// The band that is needed.
        slot: Slot,
    },
    /// The canvas cannot be drawn on.
    #[error("unusable canvas: {0}")]
    Canvas(#[from] ValidationError),
}

/// No printer could be chosen from the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// None of the configured printers is attached.
    #[error("no configured printer is attached")]
    NoPrinterPresent,
    /// The requested printer is unknown or not attached.
    #[error("preferred printer {name:?} is not configured or not attached")]
    PreferredPrinterNotPresent {
        /// The name that was asked for.
        name: String,
    },
}

/// Failures reported by a [`crate::backend::PrintBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// A spooler tool could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The program that was run.
        command: String,
        /// Why it could not be started.
        #[source]
        source: std::io::Error,
    },
    /// A spooler tool exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// The program that was run.
        command: String,
        /// What it wrote to stderr.
        stderr: String,
    },
    /// A spooler tool printed something we could not make sense of.
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput {
        /// The program that was run.
        command: String,
        /// Its stdout.
        output: String,
    },
    /// The print job was accepted but did not complete.
    #[error("print job {job} {state}")]
    Job {
        /// Spooler job id.
        job: String,
        /// What happened to it.
        state: String,
    },
    /// A submission was rejected, reason given by the backend.
    #[error("{0}")]
    Rejected(String),
    /// Filesystem error while spooling.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The spooler's IPP service could not be asked about a job.
    #[error("IPP request failed: {0}")]
    Ipp(String),
    /// The raster could not be encoded for the spooler.
    #[error("failed to encode label image: {0}")]
    Image(#[from] image::ImageError),
}

/// A font or layout file that cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that was asked for.
        path: String,
        /// Why it could not be read.
        #[source]
        source: std::io::Error,
    },
    /// The layout file is not valid JSON for a layout.
    #[error("failed to parse layout {path}: {source}")]
    Parse {
        /// The file that was asked for.
        path: String,
        /// What the parser objected to.
        #[source]
        source: serde_json::Error,
    },
    /// The file is not a font `rusttype` can load.
    #[error("{path} is not a usable TrueType/OpenType font")]
    InvalidFont {
        /// The file that was asked for.
        path: String,
    },
    /// The layout parses but makes no sense.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

/// Everything that can stop a label from being printed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The label description is malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The label does not fit its canvas.
    #[error(transparent)]
    Layout(#[from] LayoutError),
    /// No printer could be selected.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The printer or device lists could not be read.
    #[error("could not enumerate printers: {reason}")]
    Discovery {
        /// The backend's explanation.
        reason: String,
    },
    /// The spooler did not accept or complete the job.
    #[error("submission failed: {reason}")]
    SubmissionFailed {
        /// The backend's explanation.
        reason: String,
    },
}

impl PipelineError {
    /// Process exit code for this error, distinct per kind.
    ///
    /// `1` is left for failures outside the pipeline (unreadable input and the like).
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Validation(_) => 2,
            PipelineError::Layout(_) => 3,
            PipelineError::Resolve(_) => 4,
            PipelineError::Discovery { .. } => 5,
            PipelineError::SubmissionFailed { .. } => 6,
        }
    }

    /// Whether trying the same job again later could succeed.
    ///
    /// Presence is dynamic so resolution failures qualify, as do spooler failures. Layout
    /// and validation failures never will.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Resolve(_)
                | PipelineError::Discovery { .. }
                | PipelineError::SubmissionFailed { .. }
        )
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
