//! # reqlog
//!
//! An Axum middleware that times every request and writes one log entry for it, either as
//! a human-readable line or as a JSON document.
//!
//! ## Features
//!
//! - **End-to-end timing**: monotonic response time in milliseconds
//! - **Outcome classification**: handler errors are caught, logged, and turned into the final
//!   response; nothing propagates past the layer
//! - **Two output formats**: plain text for development, one JSON line per request otherwise
//! - **Pluggable sinks**: stdout/stderr by default, `tracing` events, or any closure
//! - **Observer hook**: `on_log` receives every completed [`LogRecord`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{http::StatusCode, routing::get, Router};
//! use reqlog::{HttpError, JsonLogLayer, LogOptions};
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! async fn missing() -> Result<String, HttpError> {
//!     Err(HttpError::new(StatusCode::NOT_FOUND, "not found"))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // Plain text when APP_ENV=development, JSON otherwise
//!     let layer = JsonLogLayer::from_env(LogOptions::default());
//!
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .route("/missing", get(missing))
//!         .layer(layer);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Capturing log output
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use reqlog::{Environment, JsonLogLayer, LogOptions};
//!
//! let lines = Arc::new(Mutex::new(Vec::new()));
//! let captured = lines.clone();
//!
//! let layer = JsonLogLayer::new(
//!     LogOptions::new()
//!         .with_json_log(true)
//!         .with_log_fn(move |line| {
//!             captured.lock().unwrap().push(line.to_owned());
//!             true
//!         })
//!         .with_on_log(|record| {
//!             if record.is_error() {
//!                 eprintln!("{} {} failed", record.method, record.url);
//!             }
//!         }),
//!     Environment::Production,
//! );
//! # let _ = layer;
//! ```

use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::Request,
    http,
    response::Response,
    BoxError,
};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{debug, instrument};

pub mod error;
pub use error::{HttpError, LogError};

pub mod logger;
pub use logger::JsonLogger;

pub mod options;
pub use options::{get_options, Environment, LogConfig, LogOptions, OnLog};

pub mod sink;
pub use sink::Sink;

pub mod types;
pub use types::{LogRecord, QueryValue, RequestMeta};

/// Tower layer for the request logging middleware.
///
/// Options are resolved once, when the layer is built; every service the
/// layer produces shares the resolved [`LogConfig`]. Add it as the outermost
/// layer so the measured time covers the whole pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use reqlog::{Environment, JsonLogLayer, LogOptions};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// let layer = JsonLogLayer::new(LogOptions::default(), Environment::Development);
///
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
/// ```
#[derive(Clone, Debug)]
pub struct JsonLogLayer {
    logger: JsonLogger,
}

impl JsonLogLayer {
    /// Resolve `options` for `environment` and build the layer.
    pub fn new(options: LogOptions, environment: Environment) -> Self {
        Self::from_config(options.resolve(environment))
    }

    /// Like [`JsonLogLayer::new`], reading the environment from `APP_ENV`.
    pub fn from_env(options: LogOptions) -> Self {
        Self::new(options, Environment::from_env())
    }

    pub fn from_config(config: LogConfig) -> Self {
        Self {
            logger: JsonLogger::new(config),
        }
    }

    pub fn logger(&self) -> &JsonLogger {
        &self.logger
    }
}

impl<S> Layer<S> for JsonLogLayer {
    type Service = JsonLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JsonLogService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service implementation for the request logging middleware.
///
/// Errors returned by the inner service are converted into [`HttpError`]
/// responses, so the future returned by `call` always resolves to `Ok`. Any
/// response body type is accepted and boxed into an axum [`Body`], which lets
/// the layer sit outside other middleware such as `tower_http::trace`.
///
/// Readiness errors from `poll_ready` are forwarded unchanged and are not
/// logged: no request exists yet at that point. Services built by an axum
/// `Router` are always ready, so this only concerns custom inner services.
///
/// Users typically don't interact with this type directly - it's created by
/// [`JsonLogLayer`].
#[derive(Clone, Debug)]
pub struct JsonLogService<S> {
    inner: S,
    logger: JsonLogger,
}

impl<S, ResBody> Service<Request> for JsonLogService<S>
where
    S: Service<Request, Response = http::Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<HttpError> + Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        let meta = RequestMeta::from_request(&request);
        debug!(method = %meta.method, url = %meta.url, "Extracted request metadata");

        let future = self.inner.call(request);
        let logger = self.logger.clone();

        Box::pin(async move {
            let response = logger
                .intercept(meta, async move {
                    future
                        .await
                        .map(|response| response.map(Body::new))
                        .map_err(Into::into)
                })
                .await;
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use futures::task::noop_waker_ref;
    use std::sync::{Arc, Mutex};

    /// Inner service with a configurable readiness and call outcome
    #[derive(Clone)]
    struct Flaky {
        ready: Result<(), HttpError>,
        outcome: Result<StatusCode, HttpError>,
    }

    impl Service<Request> for Flaky {
        type Response = http::Response<String>;
        type Error = HttpError;
        type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(self.ready.clone())
        }

        fn call(&mut self, _request: Request) -> Self::Future {
            let outcome = self.outcome.clone();
            Box::pin(async move {
                outcome.map(|status| {
                    let mut response = http::Response::new("done".to_owned());
                    *response.status_mut() = status;
                    response
                })
            })
        }
    }

    fn capturing_layer() -> (JsonLogLayer, Arc<Mutex<Vec<LogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let observer = records.clone();
        let layer = JsonLogLayer::new(
            LogOptions::new()
                .with_log_fn(|_| true)
                .with_on_log(move |record| observer.lock().unwrap().push(record.clone())),
            Environment::Production,
        );
        (layer, records)
    }

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn inner_error_resolves_to_logged_response() {
        let (layer, records) = capturing_layer();
        let mut service = layer.layer(Flaky {
            ready: Ok(()),
            outcome: Err(HttpError::new(StatusCode::TOO_MANY_REQUESTS, "slow down")),
        });

        let response = service.call(request("/limited")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status_code, 429);
        assert_eq!(records[0].error_message.as_deref(), Some("slow down"));
    }

    #[tokio::test]
    async fn non_axum_response_bodies_are_accepted() {
        let (layer, records) = capturing_layer();
        let mut service = layer.layer(Flaky {
            ready: Ok(()),
            outcome: Ok(StatusCode::ACCEPTED),
        });

        let response = service.call(request("/jobs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "done");
        assert_eq!(records.lock().unwrap()[0].status_code, 202);
    }

    #[test]
    fn readiness_errors_are_forwarded_without_a_record() {
        let (layer, records) = capturing_layer();
        let mut service = layer.layer(Flaky {
            ready: Err(HttpError::internal("overloaded")),
            outcome: Ok(StatusCode::OK),
        });

        let mut cx = Context::from_waker(noop_waker_ref());
        match service.poll_ready(&mut cx) {
            Poll::Ready(Err(err)) => assert_eq!(err.message(), "overloaded"),
            other => panic!("expected readiness error, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(records.lock().unwrap().is_empty());
    }
}
