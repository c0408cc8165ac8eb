//! `config`
//!
//! Command line and environment options shared by every front end.

use std::{path::PathBuf, time::Duration};

use crate::{
    backend::{CupsBackend, DEFAULT_CUPS_SERVER},
    compose::Composer,
    error::ConfigError,
    font::LabelFont,
    layout::Layout,
    pipeline::Pipeline,
    DEFAULT_DPI,
};

/// How labels are drawn and which printer they go to.
#[derive(Debug, Clone, clap::Args)]
pub struct EngineOptions {
    /// Printer to insist on, instead of picking among those attached.
    #[arg(long, env = "LABELLER_PRINTER", global = true)]
    pub printer: Option<String>,

    /// Resolution to compose labels for, in dots per inch.
    #[arg(
        long,
        env = "LABELLER_DPI",
        default_value_t = DEFAULT_DPI,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub dpi: u32,

    /// JSON layout table; the built-in layout is used otherwise.
    #[arg(long, env = "LABELLER_LAYOUT", global = true)]
    pub layout: Option<PathBuf>,

    /// TrueType or OpenType font; the bundled DejaVu Sans Mono is used otherwise.
    #[arg(long, env = "LABELLER_FONT", global = true)]
    pub font: Option<PathBuf>,

    /// Seconds to wait for the spooler to finish a job.
    #[arg(long, env = "LABELLER_SPOOL_TIMEOUT", default_value_t = 60, global = true)]
    pub spool_timeout: u64,

    /// `host:port` of the CUPS scheduler, asked whether a finished job printed.
    #[arg(long, env = "LABELLER_CUPS_SERVER", default_value = DEFAULT_CUPS_SERVER, global = true)]
    pub cups_server: String,
}

impl EngineOptions {
    /// Loads the font and layout.
    ///
    /// # Errors
    /// [`ConfigError`] if either file is unreadable or unusable.
    pub fn composer(&self) -> Result<Composer, ConfigError> {
        let font = match &self.font {
            Some(path) => LabelFont::from_file(path)?,
            None => LabelFont::bundled(),
        };
        let layout = match &self.layout {
            Some(path) => Layout::from_file(path)?,
            None => Layout::default(),
        };
        Ok(Composer::new(font, layout))
    }

    /// A pipeline printing through the local CUPS spooler.
    ///
    /// # Errors
    /// See [`EngineOptions::composer`].
    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        let backend = CupsBackend::new()
            .with_job_timeout(Duration::from_secs(self.spool_timeout))
            .with_server(self.cups_server.clone());
        Ok(Pipeline::new(Box::new(backend), self.composer()?).with_dpi(self.dpi))
    }
}
