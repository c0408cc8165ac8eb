//! # courier
//!
//! Serves the label printing API until interrupted.

use std::{net::IpAddr, process::ExitCode, time::Duration};

use axum::http::HeaderValue;
use clap::Parser;
use courier::{router, AppState, Settings};
use labeller::config::EngineOptions;
use log::{error, info};

/// Label printing over HTTP.
#[derive(Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    #[command(flatten)]
    engine: EngineOptions,

    /// Port to listen on.
    #[arg(long, env = "COURIER_PORT", default_value_t = 40121)]
    port: u16,

    /// Address to listen on.
    #[arg(long, env = "COURIER_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Origin allowed to call the API from a browser; repeat for more. Defaults to
    /// http(s)://ibp-server.local.
    #[arg(long = "allowed-origin", env = "COURIER_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<HeaderValue>,

    /// How many more times a failed submission is attempted.
    #[arg(long, env = "COURIER_RETRIES", default_value_t = 3)]
    retries: u32,

    /// Milliseconds to wait between attempts.
    #[arg(long, env = "COURIER_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Seconds a request may take in total before it is answered with a timeout. The attempt
    /// in flight is abandoned, not cancelled.
    #[arg(long, env = "COURIER_JOB_TIMEOUT", default_value_t = 90)]
    job_timeout: u64,
}

impl Cli {
    fn settings(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            preferred_printer: self.engine.printer.clone(),
            retries: self.retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            job_timeout: Duration::from_secs(self.job_timeout),
            allowed_origins: if self.allowed_origins.is_empty() {
                defaults.allowed_origins
            } else {
                self.allowed_origins.clone()
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let pipeline = match cli.engine.pipeline() {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let app = router(AppState::new(pipeline, cli.settings()));

    let listener = match tokio::net::TcpListener::bind((cli.bind, cli.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to listen on {}:{}: {err}", cli.bind, cli.port);
            return ExitCode::FAILURE;
        }
    };
    info!("listening on {}:{}", cli.bind, cli.port);

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server failed: {err}");
        return ExitCode::FAILURE;
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
