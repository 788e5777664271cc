use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use reqlog::{Environment, HttpError, JsonLogLayer, LogOptions, Sink};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Counts failed requests as an example `on_log` observer
#[derive(Debug, Default)]
struct FailureCounter {
    failures: AtomicU64,
}

// Demo server handlers
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: String) -> impl IntoResponse {
    sleep(Duration::from_millis(50)).await;
    format!("Echo: {body}")
}

async fn missing_handler() -> Result<String, HttpError> {
    Err(HttpError::new(StatusCode::NOT_FOUND, "not found"))
}

async fn validate_handler(body: String) -> Result<String, HttpError> {
    if body.trim().is_empty() {
        return Err(HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, "body must not be empty")
            .with_data(serde_json::json!({ "field": "body" })));
    }
    Ok(format!("Accepted {} bytes", body.len()))
}

async fn crash_handler() -> Result<String, HttpError> {
    let err = std::io::Error::other("backing store unavailable");
    Err(HttpError::from_error(&err))
}

async fn panic_handler() -> &'static str {
    panic!("demo handler bug")
}

async fn stats_handler(counter: Arc<FailureCounter>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "failed_requests": counter.failures.load(Ordering::Relaxed),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let environment = Environment::from_env();
    info!(?environment, "Starting request logging demo server");

    let counter = Arc::new(FailureCounter::default());
    let observer = counter.clone();

    let options = LogOptions::new()
        .with_error_sink(Sink::Tracing(Level::ERROR))
        .with_on_log(move |record| {
            if record.is_error() {
                observer.failures.fetch_add(1, Ordering::Relaxed);
                warn!(status = record.status_code, url = %record.url, "Request failed");
            }
        });

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/missing", get(missing_handler))
        .route("/validate", post(validate_handler))
        .route("/crash", get(crash_handler))
        .route("/panic", get(panic_handler))
        .route("/stats", get(move || stats_handler(counter.clone())))
        .layer(
            ServiceBuilder::new()
                .layer(JsonLogLayer::new(options, environment))
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello     - Simple greeting");
    info!("  POST /echo      - Echo request body");
    info!("  GET  /missing   - 404 with an exposed message");
    info!("  POST /validate  - 422 with a data payload when the body is empty");
    info!("  GET  /crash     - Unclassified error, logged as 500");
    info!("  GET  /panic     - Handler panic, logged as 500");
    info!("  GET  /stats     - Failed request count seen by on_log");
    info!("");
    info!("Run with APP_ENV=development for plain-text lines");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
