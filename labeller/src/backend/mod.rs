//! `backend`
//!
//! The printing subsystem and hardware bus, as seen by the pipeline.

mod cups;
mod usb;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use image::GrayImage;

pub use cups::{CupsBackend, DEFAULT_CUPS_SERVER};
pub use usb::UsbBus;

use crate::{
    compose::MediaParams,
    error::BackendError,
    label::Canvas,
    resolve::{BusId, PrinterDescriptor},
};

/// What the pipeline needs from the platform: the spooler's printers, the devices on the bus,
/// and a way to print.
///
/// Implementations are queried afresh on every job and must not cache device presence.
pub trait PrintBackend: Send + Sync {
    /// Lists every printer the spooler knows about.
    ///
    /// # Errors
    /// [`BackendError`] if the spooler cannot be queried.
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError>;

    /// Lists the vendor/product ids of every device currently on the bus.
    ///
    /// # Errors
    /// [`BackendError`] if the bus cannot be enumerated.
    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError>;

    /// The size of the media loaded in `printer`, in pixels at `dpi`, if the spooler knows it.
    ///
    /// # Errors
    /// [`BackendError`] if the spooler cannot be queried.
    fn media_size(&self, _printer: &str, _dpi: u32) -> Result<Option<Canvas>, BackendError> {
        Ok(None)
    }

    /// Prints `image` on `printer` and waits for the spooler's verdict.
    ///
    /// # Errors
    /// [`BackendError`] if the job could not be submitted or did not complete.
    fn submit(
        &self,
        printer: &str,
        image: &GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError>;
}

impl<B: PrintBackend + ?Sized> PrintBackend for Arc<B> {
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError> {
        (**self).list_configured_printers()
    }

    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError> {
        (**self).list_attached_devices()
    }

    fn media_size(&self, printer: &str, dpi: u32) -> Result<Option<Canvas>, BackendError> {
        (**self).media_size(printer, dpi)
    }

    fn submit(
        &self,
        printer: &str,
        image: &GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError> {
        (**self).submit(printer, image, media)
    }
}

/// A job accepted by a [`StaticBackend`].
#[derive(Debug, Clone)]
pub struct Submission {
    /// The printer it was sent to.
    pub printer: String,
    /// The media parameters it was sent with.
    pub media: MediaParams,
    /// The raster.
    pub image: GrayImage,
}

/// A backend with a fixed set of printers and devices that keeps what it is sent.
///
/// Useful for dry runs and tests; nothing reaches a real printer.
#[derive(Debug, Default)]
pub struct StaticBackend {
    /// Spooler queue names.
    printers: Vec<String>,
    /// Devices on the bus.
    devices: HashSet<BusId>,
    /// Media size reported for every printer.
    media: Option<Canvas>,
    /// When set, enumeration fails with this reason.
    discovery_failure: Option<String>,
    /// When set, every submission fails with this reason.
    submit_failure: Option<String>,
    /// Jobs accepted so far.
    submissions: Mutex<Vec<Submission>>,
}

impl StaticBackend {
    /// Creates a backend with the given queue names and attached devices.
    pub fn new<S: Into<String>>(
        printers: impl IntoIterator<Item = S>,
        devices: impl IntoIterator<Item = BusId>,
    ) -> Self {
        StaticBackend {
            printers: printers.into_iter().map(Into::into).collect(),
            devices: devices.into_iter().collect(),
            ..StaticBackend::default()
        }
    }

    /// Reports `canvas` as the loaded media of every printer.
    #[must_use]
    pub fn with_media(mut self, canvas: Canvas) -> Self {
        self.media = Some(canvas);
        self
    }

    /// Makes printer and device enumeration fail.
    #[must_use]
    pub fn failing_discovery(mut self, reason: impl Into<String>) -> Self {
        self.discovery_failure = Some(reason.into());
        self
    }

    /// Makes every submission fail.
    #[must_use]
    pub fn failing_submissions(mut self, reason: impl Into<String>) -> Self {
        self.submit_failure = Some(reason.into());
        self
    }

    /// The jobs accepted so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_discovery(&self) -> Result<(), BackendError> {
        match &self.discovery_failure {
            Some(reason) => Err(BackendError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

impl PrintBackend for StaticBackend {
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError> {
        self.check_discovery()?;
        Ok(self
            .printers
            .iter()
            .map(|name| PrinterDescriptor::from_name(name.as_str()))
            .collect())
    }

    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError> {
        self.check_discovery()?;
        Ok(self.devices.clone())
    }

    fn media_size(&self, _printer: &str, _dpi: u32) -> Result<Option<Canvas>, BackendError> {
        Ok(self.media)
    }

    fn submit(
        &self,
        printer: &str,
        image: &GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError> {
        if let Some(reason) = &self.submit_failure {
            return Err(BackendError::Rejected(reason.clone()));
        }

        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Submission {
                printer: printer.to_string(),
                media: *media,
                image: image.clone(),
            });
        Ok(())
    }
}
