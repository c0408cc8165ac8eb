//! Integration tests for the courier HTTP API.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use courier::{router, AppState, Settings};
use labeller::{
    BackendError, BusId, Canvas, Composer, LabelFont, Layout, MediaParams, Pipeline,
    PrintBackend, PrinterDescriptor, StaticBackend,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const PRINTER: &str = "Shipping_0a5f:0001";

fn settings() -> Settings {
    Settings {
        retry_delay: Duration::from_millis(1),
        ..Settings::default()
    }
}

fn app_with(backend: impl PrintBackend + 'static, settings: Settings) -> Router {
    let composer = Composer::new(LabelFont::bundled(), Layout::default());
    router(AppState::new(Pipeline::new(Box::new(backend), composer), settings))
}

fn attached() -> StaticBackend {
    StaticBackend::new([PRINTER, "Office"], [BusId::new(0x0a5f, 0x0001)])
}

fn label() -> Value {
    json!({
        "canvas": {"width": 400, "height": 200},
        "fields": [{"content": "CELL BLOCK A", "role": "title"}],
        "barcode": {"payload": "12345"}
    })
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Fails the first `failures` submissions, then prints.
struct Flaky {
    inner: StaticBackend,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl PrintBackend for Flaky {
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError> {
        self.inner.list_configured_printers()
    }

    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError> {
        self.inner.list_attached_devices()
    }

    fn submit(
        &self,
        printer: &str,
        image: &image::GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(BackendError::Rejected("paper jam".to_string()));
        }
        self.inner.submit(printer, image, media)
    }
}

/// Counts pipeline runs; each one lists the configured printers exactly once.
struct Counting {
    inner: StaticBackend,
    runs: Arc<AtomicUsize>,
}

impl PrintBackend for Counting {
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.list_configured_printers()
    }

    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError> {
        self.inner.list_attached_devices()
    }

    fn submit(
        &self,
        printer: &str,
        image: &image::GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError> {
        self.inner.submit(printer, image, media)
    }
}

/// Takes far longer than any request should.
struct Slow(StaticBackend);

impl PrintBackend for Slow {
    fn list_configured_printers(&self) -> Result<Vec<PrinterDescriptor>, BackendError> {
        self.0.list_configured_printers()
    }

    fn list_attached_devices(&self) -> Result<HashSet<BusId>, BackendError> {
        self.0.list_attached_devices()
    }

    fn submit(
        &self,
        printer: &str,
        image: &image::GrayImage,
        media: &MediaParams,
    ) -> Result<(), BackendError> {
        thread::sleep(Duration::from_millis(500));
        self.0.submit(printer, image, media)
    }
}

#[tokio::test]
async fn greeting() {
    let app = app_with(attached(), settings());
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn prints_json_label() {
    let backend = Arc::new(attached());
    let app = app_with(Arc::clone(&backend), settings());

    let (status, body) = send(app, post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "printed", "printer": PRINTER}));
    assert_eq!(backend.submissions().len(), 1);
}

#[tokio::test]
async fn prints_form_label() {
    let backend = Arc::new(attached());
    let app = app_with(Arc::clone(&backend), settings());
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("data={}", form_encode(&label().to_string()))))
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["printer"], PRINTER);
    assert_eq!(backend.submissions().len(), 1);
}

#[tokio::test]
async fn rejects_malformed_input() {
    let app = app_with(attached(), settings());
    let (status, body) = send(app.clone(), post_json("/print", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "errors carry a message");

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("data=%7Bnope"))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid label JSON"),
        "form data is parsed as JSON"
    );
}

#[tokio::test]
async fn validation_and_layout_errors_are_bad_requests() {
    let app = app_with(attached(), settings());

    let mut empty = label();
    empty["barcode"]["payload"] = json!("");
    let (status, _) = send(app.clone(), post_json("/print", &empty.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut cramped = label();
    cramped["canvas"] = json!({"width": 40, "height": 20});
    cramped["fields"] = json!([]);
    let (status, body) = send(app.clone(), post_json("/print", &cramped.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("barcode"), "error names the barcode");

    let mut accented = label();
    accented["barcode"]["payload"] = json!("CAFÉ");
    let (status, _) = send(app, post_json("/print", &accented.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_printers_are_not_found() {
    let app = app_with(StaticBackend::new([PRINTER], []), settings());
    let (status, _) = send(app, post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let app = app_with(attached(), settings());
    let (status, body) = send(
        app,
        post_json("/print?printer=Missing_1234:5678", &label().to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(
        body["error"].as_str().unwrap().contains("Missing_1234:5678"),
        "error names the printer"
    );
}

#[tokio::test]
async fn retries_failed_submissions() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let backend = Flaky {
        inner: attached(),
        failures: 2,
        attempts: Arc::clone(&attempts),
    };
    let app = app_with(backend, settings());

    let (status, _) = send(app, post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_retries() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let backend = Flaky {
        inner: attached(),
        failures: usize::MAX,
        attempts: Arc::clone(&attempts),
    };
    let app = app_with(
        backend,
        Settings {
            retries: 2,
            ..settings()
        },
    );

    let (status, body) = send(app, post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(
        body["error"].as_str().unwrap().contains("paper jam"),
        "error carries the spooler's reason"
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "one try and two retries");
}

#[tokio::test]
async fn only_submission_failures_are_retried() {
    let runs = Arc::new(AtomicUsize::new(0));
    let app = app_with(
        Counting {
            inner: StaticBackend::new([PRINTER], []),
            runs: Arc::clone(&runs),
        },
        settings(),
    );
    let (status, _) = send(app, post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(runs.load(Ordering::SeqCst), 1, "missing printer is not retried");

    let runs = Arc::new(AtomicUsize::new(0));
    let app = app_with(
        Counting {
            inner: attached(),
            runs: Arc::clone(&runs),
        },
        settings(),
    );
    let mut cramped = label();
    cramped["canvas"] = json!({"width": 40, "height": 20});
    let (status, _) = send(app, post_json("/print", &cramped.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(runs.load(Ordering::SeqCst), 1, "layout failure is not retried");
}

#[tokio::test]
async fn slow_jobs_time_out() {
    let app = app_with(
        Slow(attached()),
        Settings {
            job_timeout: Duration::from_millis(50),
            ..settings()
        },
    );
    let (status, _) = send(app, post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn discovery_failure_is_unavailable() {
    let app = app_with(
        StaticBackend::default().failing_discovery("cupsd is not running"),
        settings(),
    );
    let (status, _) = send(app.clone(), post_json("/print", &label().to_string())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(
        body["error"].as_str().unwrap().contains("cupsd is not running"),
        "error carries the discovery failure"
    );
}

#[tokio::test]
async fn health_lists_attached_printers() {
    let app = app_with(
        StaticBackend::new(
            ["b_0a5f:0001", "a_0a5f:0001", "Office"],
            [BusId::new(0x0a5f, 0x0001)],
        )
        .with_media(Canvas::new(1200, 1800)),
        settings(),
    );
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "ok",
            "service": "courier",
            "printers": {"count": 2, "names": ["a_0a5f:0001", "b_0a5f:0001"]}
        })
    );
}

#[tokio::test]
async fn cors_allows_known_origins_only() {
    let preflight = |origin: &str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/print")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap()
    };
    let app = app_with(attached(), settings());

    let response = app
        .clone()
        .oneshot(preflight("http://ibp-server.local"))
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://ibp-server.local"
    );

    let response = app.oneshot(preflight("http://elsewhere.example")).await.unwrap();
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none(),
        "unknown origins get no CORS grant"
    );
}
