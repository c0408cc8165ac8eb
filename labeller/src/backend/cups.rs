//! `cups`
//!
//! Talks to the CUPS spooler through its command line tools, and to its IPP service for the
//! final state of a job.

use std::{
    collections::HashSet,
    process::{Command, Output},
    thread,
    time::{Duration, Instant},
};

use image::{GrayImage, ImageFormat};
use ipp::prelude::{
    DelimiterTag, IppAttribute, IppClient, IppRequestResponse, IppValue, IppVersion, Operation,
    Uri,
};
use log::{debug, info, warn};

use super::{usb::UsbBus, PrintBackend};
use crate::{
    compose::MediaParams,
    error::BackendError,
    label::Canvas,
    resolve::{BusId, PrinterDescriptor},
};

/// How long a job may take before it is given up on.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// How often a job's progress is checked.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(250);

/// Where the CUPS scheduler answers IPP requests.
pub const DEFAULT_CUPS_SERVER: &str = "localhost:631";

/// IPP `job-state` values, RFC 8011 section 5.3.7.
const JOB_PENDING: i32 = 3;
const JOB_PENDING_HELD: i32 = 4;
const JOB_PROCESSING: i32 = 5;
const JOB_PROCESSING_STOPPED: i32 = 6;
const JOB_CANCELED: i32 = 7;
const JOB_ABORTED: i32 = 8;
const JOB_COMPLETED: i32 = 9;

/// Printer queues managed by the local CUPS daemon, with devices on the local USB bus.
#[derive(Debug, Clone)]
pub struct CupsBackend {
    /// Where attached devices are enumerated.
    usb: UsbBus,
    /// How long a job may take.
    job_timeout: Duration,
    /// How often a job's progress is checked.
    poll_period: Duration,
    /// `host:port` of the scheduler's IPP service.
    server: String,
}

impl Default for CupsBackend {
    fn default() -> Self {
        CupsBackend {
            usb: UsbBus::default(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_period: DEFAULT_POLL_PERIOD,
            server: DEFAULT_CUPS_SERVER.to_string(),
        }
    }
}

impl CupsBackend {
    /// Creates a backend with the default job timeout.
    pub fn new() -> Self {
        CupsBackend::default()
    }

    /// Changes how long a job may take.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Asks the scheduler at `server` (`host:port`) about jobs.
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Waits for `job` to leave the queue, then checks that it actually printed.
    fn await_job(&self, printer: &str, job: &str) -> Result<(), BackendError> {
        let waited = wait_for_job(job, self.job_timeout, self.poll_period, || {
            let output = run_checked("lpstat", &["-W", "not-completed", "-o", printer])?;
            Ok(lists_job(&output, job))
        });

        if let Err(err) = waited {
            // Leaving a stuck job queued would print it whenever the printer recovers.
            if let Err(cancel_err) = run_checked("cancel", &[job]) {
                warn!("failed to cancel job {job}: {cancel_err}");
            }
            return Err(err);
        }

        let (state, reasons) = self.job_state(printer, job)?;
        debug!("job {job} finished in state {state} ({reasons})");
        job_outcome(job, state, &reasons)
    }

    /// The IPP `job-state` and `job-state-reasons` of `job`, via Get-Job-Attributes.
    fn job_state(&self, printer: &str, job: &str) -> Result<(i32, String), BackendError> {
        let job_id = job_number(job).ok_or_else(|| BackendError::UnexpectedOutput {
            command: "lp".to_string(),
            output: job.to_string(),
        })?;
        let uri: Uri = format!("ipp://{}/printers/{printer}", self.server)
            .parse()
            .map_err(|err| BackendError::Ipp(format!("bad printer URI for {printer}: {err}")))?;

        let mut request = IppRequestResponse::new(
            IppVersion::v1_1(),
            Operation::GetJobAttributes,
            Some(uri.clone()),
        );
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new("job-id", IppValue::Integer(job_id)),
        );

        let response = IppClient::new(uri)
            .send(request)
            .map_err(|err| BackendError::Ipp(err.to_string()))?;
        let status = response.header().status_code();
        if !status.is_success() {
            return Err(BackendError::Job {
                job: job.to_string(),
                state: format!("could not be looked up: {status:?}"),
            });
        }

        let attributes = response
            .attributes()
            .groups_of(DelimiterTag::JobAttributes)
            .next()
            .map(|group| group.attributes());
        let state = attributes
            .and_then(|attributes| attributes.get("job-state"))
            .and_then(|attribute| match attribute.value() {
                IppValue::Enum(state) | IppValue::Integer(state) => Some(*state),
                _ => None,
            })
            .ok_or_else(|| BackendError::Job {
                job: job.to_string(),
                state: "has no job-state".to_string(),
            })?;
        let reasons = attributes
            .and_then(|attributes| attributes.get("job-state-reasons"))
            .map(|attribute| attribute.value().to_string())
            .unwrap_or_default();

        Ok((state, reasons))
    }
}

impl PrintBackend for CupsBackend {
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError> {
        let output = run("lpstat", &["-p"])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stdout.contains("No destinations added") || stderr.contains("No destinations added") {
            return Ok(Vec::new());
        }
        if !output.status.success() {
            return Err(BackendError::Command {
                command: "lpstat -p".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let printers: Vec<PrinterDescriptor> = parse_printer_names(&stdout)
            .into_iter()
            .map(PrinterDescriptor::from_name)
            .collect();
        debug!("CUPS knows {} printers", printers.len());
        Ok(printers)
    }

    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError> {
        self.usb.attached()
    }

    fn media_size(&self, printer: &str, dpi: u32) -> Result<Option<Canvas>, BackendError> {
        let options = run_checked("lpoptions", &["-p", printer, "-l"])?;
        let Some(choice) = default_page_size(&options) else {
            debug!("{printer} has no default PageSize");
            return Ok(None);
        };

        let size = page_size_pixels(choice, dpi);
        match size {
            Some(canvas) => info!(
                "label size for {printer}: {choice} -> {}x{}px",
                canvas.width, canvas.height
            ),
            None => warn!("cannot interpret PageSize {choice:?} of {printer}"),
        }
        Ok(size)
    }

    fn submit(
        &self,
        printer: &str,
        image: &GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError> {
        let mut spool = tempfile::Builder::new()
            .prefix("label-")
            .suffix(".png")
            .tempfile()?;
        image.write_to(spool.as_file_mut(), ImageFormat::Png)?;

        let path = spool.path().to_string_lossy().into_owned();
        let ppi = format!("ppi={}", media.dpi);
        info!("submitting {path} to {printer}");
        let output = run_checked("lp", &["-d", printer, "-t", "label", "-o", &ppi, &path])?;

        let job = parse_request_id(&output).ok_or_else(|| BackendError::UnexpectedOutput {
            command: "lp".to_string(),
            output: output.trim().to_string(),
        })?;
        info!("job submitted: {job}");

        self.await_job(printer, &job)?;
        info!("job {job} completed");
        Ok(())
    }
}

/// Runs a spooler tool with a fixed locale so its output can be parsed.
fn run(program: &str, args: &[&str]) -> Result<Output, BackendError> {
    Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .output()
        .map_err(|source| BackendError::Spawn {
            command: program.to_string(),
            source,
        })
}

/// Runs a spooler tool and returns its stdout, failing if it exits unsuccessfully.
fn run_checked(program: &str, args: &[&str]) -> Result<String, BackendError> {
    let output = run(program, args)?;
    if !output.status.success() {
        return Err(BackendError::Command {
            command: format!("{program} {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Polls `pending` until it reports the job gone.
///
/// # Errors
/// [`BackendError::Job`] if the job is still pending after `timeout`, or whatever `pending`
/// fails with.
fn wait_for_job(
    job: &str,
    timeout: Duration,
    poll_period: Duration,
    mut pending: impl FnMut() -> Result<bool, BackendError>,
) -> Result<(), BackendError> {
    let start = Instant::now();
    while pending()? {
        if start.elapsed() > timeout {
            warn!("print job {job} timed out");
            return Err(BackendError::Job {
                job: job.to_string(),
                state: format!("timed out after {}s", timeout.as_secs_f32()),
            });
        }
        thread::sleep(poll_period);
    }
    Ok(())
}

/// Queue names from `lpstat -p`.
fn parse_printer_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("printer "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Job id from `lp`, which answers `request id is NAME-42 (1 file(s))`.
fn parse_request_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("request id is "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
}

/// Whether `job` is one of the jobs listed by `lpstat -o`.
fn lists_job(output: &str, job: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|listed| listed == job)
}

/// The numeric IPP job id in a CUPS request id such as `NAME-42`.
fn job_number(job: &str) -> Option<i32> {
    job.rsplit_once('-')
        .and_then(|(_, number)| number.parse().ok())
}

/// Whether a job that left the queue in `state` printed.
///
/// Only `completed` counts; canceled and aborted jobs are failures, with `reasons` attached.
fn job_outcome(job: &str, state: i32, reasons: &str) -> Result<(), BackendError> {
    let what = match state {
        JOB_COMPLETED => return Ok(()),
        JOB_CANCELED => "was canceled",
        JOB_ABORTED => "was aborted",
        JOB_PENDING | JOB_PENDING_HELD => "is still pending",
        JOB_PROCESSING | JOB_PROCESSING_STOPPED => "is still processing",
        _ => "is in an unknown state",
    };
    let state = if reasons.is_empty() {
        what.to_string()
    } else {
        format!("{what} ({reasons})")
    };
    Err(BackendError::Job {
        job: job.to_string(),
        state,
    })
}

/// The default choice of the `PageSize` option in `lpoptions -l` output.
fn default_page_size(output: &str) -> Option<&str> {
    output
        .lines()
        .find(|line| line.starts_with("PageSize/") || line.starts_with("PageSize:"))
        .and_then(|line| line.split_once(':'))
        .and_then(|(_, choices)| {
            choices
                .split_whitespace()
                .find_map(|choice| choice.strip_prefix('*'))
        })
}

/// Converts a page size choice to pixels at `dpi`.
///
/// Understands `wNNNhNNN` (points) and `Custom.WxH` with an optional `in`, `mm`, `cm` or `pt`
/// unit. Dimensions are truncated to whole pixels.
fn page_size_pixels(choice: &str, dpi: u32) -> Option<Canvas> {
    let (width_pt, height_pt) = if let Some(rest) = choice.strip_prefix('w') {
        let (width, height) = rest.split_once('h')?;
        (width.parse::<f64>().ok()?, height.parse::<f64>().ok()?)
    } else {
        let dimensions = choice.strip_prefix("Custom.")?;
        let (dimensions, points_per_unit) = [
            ("in", 72.0),
            ("mm", 72.0 / 25.4),
            ("cm", 72.0 / 2.54),
            ("pt", 1.0),
        ]
        .into_iter()
        .find_map(|(unit, scale)| dimensions.strip_suffix(unit).map(|d| (d, scale)))
        .unwrap_or((dimensions, 1.0));
        let (width, height) = dimensions.split_once('x')?;
        (
            width.parse::<f64>().ok()? * points_per_unit,
            height.parse::<f64>().ok()? * points_per_unit,
        )
    };

    let to_pixels = |points: f64| -> Option<u32> {
        let pixels = (points / 72.0 * f64::from(dpi)).floor();
        // Truncation is intended and the range is checked.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        (1.0..=f64::from(u32::MAX))
            .contains(&pixels)
            .then(|| pixels as u32)
    };
    Some(Canvas::new(to_pixels(width_pt)?, to_pixels(height_pt)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_printer_names() {
        let output = "printer iDPRT_SP310_0a5f:0001 is idle.  enabled since Tue 01 Oct 2024\n\
                      printer Office disabled since Mon 30 Sep 2024 -\n\
                      \treason unknown\n";
        assert_eq!(
            parse_printer_names(output),
            vec!["iDPRT_SP310_0a5f:0001", "Office"]
        );
        assert!(parse_printer_names("").is_empty(), "no printers without output");
    }

    #[test]
    fn test_parse_request_id() {
        assert_eq!(
            parse_request_id("request id is Zebra_0a5f:0001-42 (1 file(s))\n").as_deref(),
            Some("Zebra_0a5f:0001-42")
        );
        assert_eq!(parse_request_id("lp: error - no such printer"), None);
    }

    #[test]
    fn test_lists_job() {
        let output = "Zebra-41  alice  1024  Tue 01 Oct 2024\nZebra-42  bob  2048  Tue 01 Oct 2024\n";
        assert!(lists_job(output, "Zebra-42"), "job still queued");
        assert!(!lists_job(output, "Zebra-4"), "ids match whole words only");
        assert!(!lists_job("", "Zebra-42"), "nothing queued");
    }

    #[test]
    fn test_job_number() {
        assert_eq!(job_number("Zebra_0a5f:0001-42"), Some(42));
        assert_eq!(job_number("Office-7"), Some(7));
        assert_eq!(job_number("Office"), None);
        assert_eq!(job_number("Office-x"), None);
    }

    #[test]
    fn test_only_completed_jobs_printed() {
        assert!(
            job_outcome("Zebra-42", JOB_COMPLETED, "job-completed-successfully").is_ok(),
            "completed is success"
        );

        let err = job_outcome("Zebra-42", JOB_ABORTED, "aborted-by-system").unwrap_err();
        assert_eq!(
            err.to_string(),
            "print job Zebra-42 was aborted (aborted-by-system)"
        );

        let err = job_outcome("Zebra-42", JOB_CANCELED, "").unwrap_err();
        assert_eq!(err.to_string(), "print job Zebra-42 was canceled");

        let unfinished = [
            JOB_PENDING,
            JOB_PENDING_HELD,
            JOB_PROCESSING,
            JOB_PROCESSING_STOPPED,
            42,
        ];
        for state in unfinished {
            assert!(
                matches!(
                    job_outcome("Zebra-42", state, "none"),
                    Err(BackendError::Job { .. })
                ),
                "state {state} is not a finished print"
            );
        }
    }

    #[test]
    fn test_default_page_size() {
        let output = "PageSize/Media Size: w162h90 *w288h432 Custom.WIDTHxHEIGHT\n\
                      Resolution/Resolution: *203dpi 300dpi\n";
        assert_eq!(default_page_size(output), Some("w288h432"));
        assert_eq!(default_page_size("PageSize/Media Size: w162h90\n"), None);
        assert_eq!(default_page_size("Resolution/Resolution: *203dpi\n"), None);
    }

    #[test]
    fn test_page_size_pixels() {
        // 4x6in at 300dpi
        assert_eq!(
            page_size_pixels("w288h432", 300),
            Some(Canvas::new(1200, 1800))
        );
        assert_eq!(
            page_size_pixels("Custom.4x6in", 300),
            Some(Canvas::new(1200, 1800))
        );
        assert_eq!(
            page_size_pixels("Custom.50.8x25.4mm", 300),
            Some(Canvas::new(600, 300))
        );
        assert_eq!(
            page_size_pixels("Custom.5.08x2.54cm", 300),
            Some(Canvas::new(600, 300))
        );
        assert_eq!(
            page_size_pixels("Custom.144x72", 300),
            Some(Canvas::new(600, 300))
        );
        assert_eq!(page_size_pixels("Letter", 300), None);
        assert_eq!(page_size_pixels("w0h90", 300), None);
    }

    #[test]
    fn test_wait_for_job_completes() {
        let mut states = vec![true, true, false].into_iter();
        let result = wait_for_job("job-1", Duration::from_secs(1), Duration::from_millis(1), || {
            Ok(states.next().unwrap_or(false))
        });
        assert!(result.is_ok(), "job left the queue");
        assert_eq!(states.next(), None, "polled until the job left the queue");
    }

    #[test]
    fn test_wait_for_job_times_out() {
        let start = Instant::now();
        let result = wait_for_job(
            "job-1",
            Duration::from_millis(100),
            Duration::from_millis(10),
            || Ok(true),
        );
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(BackendError::Job { .. })), "still queued at the deadline");
        assert!(elapsed >= Duration::from_millis(100), "waited the full timeout");
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    }

    #[test]
    fn test_wait_for_job_propagates_poll_errors() {
        let result = wait_for_job("job-1", Duration::from_secs(1), Duration::from_millis(1), || {
            Err(BackendError::Rejected("lpstat went away".to_string()))
        });
        assert!(matches!(result, Err(BackendError::Rejected(_))), "poll error is returned");
    }
}
