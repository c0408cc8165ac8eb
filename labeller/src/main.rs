//! `labeller`
//!
//! Prints a label described in a JSON file, renders it to a PNG instead, or lists the printers
//! that are plugged in.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use image::ImageFormat;
use labeller::{config::EngineOptions, ConfigError, LabelSpec, PipelineError};
use log::{error, info};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "labeller", version, about)]
struct Cli {
    #[command(flatten)]
    engine: EngineOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the label described in FILE.
    Print {
        /// JSON label description.
        file: PathBuf,
    },
    /// Draw the label described in FILE into a PNG without printing it.
    Render {
        /// JSON label description.
        file: PathBuf,
        /// Where to write the PNG.
        #[arg(long, short)]
        output: PathBuf,
    },
    /// List the configured printers that are attached.
    List,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{path} is not a valid label description: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Save {
        path: String,
        source: image::ImageError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    /// Input problems share `1`; pipeline failures keep their own codes.
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Pipeline(err) => u8::try_from(err.exit_code()).unwrap_or(1),
            _ => 1,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let pipeline = cli.engine.pipeline()?;

    match &cli.command {
        Command::Print { file } => {
            let spec = read_spec(file)?;
            let printed = pipeline.print_label(&spec, cli.engine.printer.as_deref())?;
            info!("printed on {}", printed.printer);
        }
        Command::Render { file, output } => {
            let spec = read_spec(file)?;
            let label = pipeline.render(&spec)?;
            label
                .image()
                .save_with_format(output, ImageFormat::Png)
                .map_err(|source| CliError::Save {
                    path: output.display().to_string(),
                    source,
                })?;
            let canvas = label.canvas();
            info!(
                "wrote {}x{} label to {}",
                canvas.width,
                canvas.height,
                output.display()
            );
        }
        Command::List => {
            let printers = pipeline.available_printers()?;
            if printers.is_empty() {
                info!("no configured printer is attached");
            }
            for printer in printers {
                println!("{}", printer.name);
            }
        }
    }

    Ok(())
}

fn read_spec(path: &Path) -> Result<LabelSpec, CliError> {
    let display = path.display().to_string();
    let data = fs::read(path).map_err(|source| CliError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| CliError::Parse {
        path: display,
        source,
    })
}
