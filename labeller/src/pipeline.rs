//! `pipeline`
//!
//! Takes a label from description to paper: validate, find a printer, compose, submit.

use std::collections::HashSet;

use log::{error, info};
use serde::Serialize;

use crate::{
    backend::PrintBackend,
    barcode,
    compose::{ComposedLabel, Composer},
    error::{BackendError, PipelineError, PipelineResult},
    label::{Canvas, LabelSpec},
    resolve::{present_printers, resolve_printer, BusId, PrinterDescriptor},
    DEFAULT_DPI,
};

/// A label that made it to a printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Printed {
    /// The printer it was printed on.
    pub printer: String,
}

/// Prints labels on whichever configured printer is attached.
///
/// Every call takes a fresh snapshot of printers and devices; nothing is remembered between
/// jobs, so a pipeline can be shared by any number of threads.
pub struct Pipeline {
    /// Where printers come from and jobs go.
    backend: Box<dyn PrintBackend>,
    /// Draws the labels.
    composer: Composer,
    /// Resolution labels are composed for.
    dpi: u32,
}

impl Pipeline {
    /// Creates a new [`Pipeline`].
    ///
    /// # Arguments
    /// * `backend`: The printing subsystem.
    /// * `composer`: How labels are drawn.
    pub fn new(backend: Box<dyn PrintBackend>, composer: Composer) -> Self {
        Pipeline {
            backend,
            composer,
            dpi: DEFAULT_DPI,
        }
    }

    /// Composes for `dpi` instead of [`DEFAULT_DPI`].
    #[must_use]
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// The composer labels are drawn with.
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Composes `spec` without printing it, on its own canvas or the default one.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] or [`PipelineError::Layout`].
    pub fn render(&self, spec: &LabelSpec) -> PipelineResult<ComposedLabel> {
        spec.validate()?;
        Ok(self.composer.compose(spec)?)
    }

    /// The configured printers that are attached right now, sorted by name.
    ///
    /// # Errors
    /// [`PipelineError::Discovery`] if the backend cannot list printers or devices.
    pub fn available_printers(&self) -> PipelineResult<Vec<PrinterDescriptor>> {
        let (configured, attached) = self.snapshot()?;
        Ok(present_printers(&configured, &attached)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Prints one label.
    ///
    /// # Arguments
    /// * `spec`: The label.
    /// * `preferred`: A printer to insist on; without it the attached printers are chosen from.
    ///
    /// # Returns
    /// The printer the label went to.
    ///
    /// # Errors
    /// The first failure met, in pipeline order: [`PipelineError::Validation`],
    /// [`PipelineError::Layout`] for unencodable payloads, [`PipelineError::Discovery`],
    /// [`PipelineError::Resolve`], [`PipelineError::Layout`] for labels that do not fit, then
    /// [`PipelineError::SubmissionFailed`]. Nothing is retried.
    pub fn print_label(
        &self,
        spec: &LabelSpec,
        preferred: Option<&str>,
    ) -> PipelineResult<Printed> {
        spec.validate()?;
        // Fail on bad payloads before touching any hardware.
        barcode::check_payload(&spec.barcode.payload)?;

        let (configured, attached) = self.snapshot()?;
        let printer = resolve_printer(&configured, &attached, preferred)?;
        info!("printing {:?} on {}", spec.barcode.payload, printer.name);

        let label = match spec.canvas {
            Some(canvas) => self.composer.compose_on(spec, canvas)?,
            None => {
                let media = self.media_canvas(&printer.name)?;
                if media.is_portrait() {
                    self.composer
                        .compose_on(spec, media.landscape())?
                        .rotate_quarter()
                } else {
                    self.composer.compose_on(spec, media)?
                }
            }
        };

        let media = label.media(self.dpi);
        self.backend
            .submit(&printer.name, label.image(), &media)
            .map_err(|err| {
                error!("printing on {} failed: {err}", printer.name);
                PipelineError::SubmissionFailed {
                    reason: err.to_string(),
                }
            })?;

        Ok(Printed {
            printer: printer.name,
        })
    }

    /// The canvas matching the media loaded in `printer`, or the composer's default.
    ///
    /// Media sizes are checked like a requested canvas would be.
    fn media_canvas(&self, printer: &str) -> PipelineResult<Canvas> {
        let media = self
            .backend
            .media_size(printer, self.dpi)
            .map_err(|err| PipelineError::Discovery {
                reason: format!("media size of {printer}: {err}"),
            })?;
        let canvas = media.unwrap_or_else(|| self.composer.default_canvas());
        canvas.check()?;
        Ok(canvas)
    }

    /// Configured printers and attached devices, as of now.
    fn snapshot(&self) -> PipelineResult<(Vec<PrinterDescriptor>, HashSet<BusId>)> {
        let discovery = |err: BackendError| PipelineError::Discovery {
            reason: err.to_string(),
        };
        let configured = self.backend.list_configured_printers().map_err(discovery)?;
        let attached = self.backend.list_attached_devices().map_err(discovery)?;
        Ok((configured, attached))
    }
}
