//! # courier
//!
//! Receives label jobs over HTTP and prints them on whichever label printer is attached.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use labeller::{LabelSpec, Pipeline, PipelineError, Printed};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origins allowed to call the API from a browser unless configured otherwise.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] =
    ["http://ibp-server.local", "https://ibp-server.local"];

/// How jobs are run on behalf of HTTP callers.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Printer used when a request does not name one.
    pub preferred_printer: Option<String>,
    /// How many more times a failed submission is attempted.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// How long a request may take in total, retries included.
    ///
    /// A request past the deadline is answered with a timeout, but the attempt already
    /// running is abandoned rather than stopped: its label may still print afterwards, so a
    /// caller retrying on a timeout can get the label twice.
    pub job_timeout: Duration,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            preferred_printer: None,
            retries: 3,
            retry_delay: Duration::from_secs(1),
            job_timeout: Duration::from_secs(90),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| HeaderValue::from_static(origin))
                .collect(),
        }
    }
}

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// The print pipeline, run on blocking threads.
    pipeline: Arc<Pipeline>,
    /// Retry and deadline policy.
    settings: Arc<Settings>,
}

impl AppState {
    /// Creates a new [`AppState`].
    pub fn new(pipeline: Pipeline, settings: Settings) -> Self {
        AppState {
            pipeline: Arc::new(pipeline),
            settings: Arc::new(settings),
        }
    }
}

/// Query string of the print endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PrintParams {
    /// Printer to insist on.
    pub printer: Option<String>,
}

/// Form body of `POST /`: the label as JSON in a `data` field.
#[derive(Debug, Deserialize)]
pub struct FormJob {
    /// The label description, JSON encoded.
    pub data: String,
}

/// Body of a successful print.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintResponse {
    /// Always `printed`.
    pub status: String,
    /// The printer the label went to.
    pub printer: String,
}

/// Why a request failed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The pipeline refused or failed the job.
    #[error(transparent)]
    Pipeline(PipelineError),
    /// The request body could not be understood.
    #[error("{0}")]
    BadRequest(String),
    /// The job did not finish in time.
    #[error("print job did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
    /// The worker running the job died.
    #[error("{0}")]
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl ApiError {
    /// The status code reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(
                PipelineError::Validation(_) | PipelineError::Layout(_),
            )
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(PipelineError::Resolve(_)) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(PipelineError::SubmissionFailed { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Pipeline(PipelineError::Discovery { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        } else {
            warn!("request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the application: routes, state and CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.settings.allowed_origins.clone()))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route(
            "/",
            get("Nothing to see here. POST labels to /print.").post(print_form),
        )
        .route("/print", post(print_json))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// Handles `POST /print` with a JSON label.
async fn print_json(
    State(state): State<AppState>,
    Query(params): Query<PrintParams>,
    payload: Result<Json<LabelSpec>, JsonRejection>,
) -> Result<Json<PrintResponse>, ApiError> {
    let Json(spec) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    print(state, spec, params.printer).await
}

/// Handles `POST /` with a form carrying the label JSON in `data`.
async fn print_form(
    State(state): State<AppState>,
    Query(params): Query<PrintParams>,
    payload: Result<Form<FormJob>, FormRejection>,
) -> Result<Json<PrintResponse>, ApiError> {
    let Form(job) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let spec: LabelSpec = serde_json::from_str(&job.data)
        .map_err(|err| ApiError::BadRequest(format!("invalid label JSON: {err}")))?;
    print(state, spec, params.printer).await
}

/// Runs the job off the async runtime, retrying failed submissions, within the deadline.
async fn print(
    state: AppState,
    spec: LabelSpec,
    printer: Option<String>,
) -> Result<Json<PrintResponse>, ApiError> {
    let preferred = printer.or_else(|| state.settings.preferred_printer.clone());
    let deadline = state.settings.job_timeout;
    info!("received print job for {:?}", spec.barcode.payload);

    let printed = tokio::time::timeout(deadline, print_with_retries(&state, &spec, preferred))
        .await
        .map_err(|_| ApiError::Timeout(deadline))??;

    info!("printed on {}", printed.printer);
    Ok(Json(PrintResponse {
        status: "printed".to_string(),
        printer: printed.printer,
    }))
}

/// Prints `spec`, trying again after each failed submission until the retries run out.
async fn print_with_retries(
    state: &AppState,
    spec: &LabelSpec,
    preferred: Option<String>,
) -> Result<Printed, ApiError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let pipeline = Arc::clone(&state.pipeline);
        let spec = spec.clone();
        let preferred = preferred.clone();
        let result =
            tokio::task::spawn_blocking(move || pipeline.print_label(&spec, preferred.as_deref()))
                .await
                .map_err(|err| ApiError::Internal(format!("print worker failed: {err}")))?;

        match result {
            Err(PipelineError::SubmissionFailed { reason }) if attempt <= state.settings.retries => {
                warn!(
                    "print failed ({reason}), retrying {attempt}/{}",
                    state.settings.retries
                );
                tokio::time::sleep(state.settings.retry_delay).await;
            }
            other => return other.map_err(ApiError::Pipeline),
        }
    }
}

/// Handles `GET /health`: reports the attached printers, or why they cannot be listed.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pipeline = Arc::clone(&state.pipeline);
    let printers = tokio::task::spawn_blocking(move || pipeline.available_printers())
        .await
        .map_err(|err| err.to_string())
        .and_then(|result| result.map_err(|err| err.to_string()));

    Json(match printers {
        Ok(printers) => {
            let names: Vec<String> = printers.into_iter().map(|printer| printer.name).collect();
            json!({
                "status": "ok",
                "service": "courier",
                "printers": { "count": names.len(), "names": names },
            })
        }
        Err(err) => {
            error!("health check failed to list printers: {err}");
            json!({
                "status": "degraded",
                "service": "courier",
                "error": err,
            })
        }
    })
}
