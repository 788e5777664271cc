//! Error types raised by request handlers and by the logger itself.

use std::any::Any;
use std::convert::Infallible;
use std::fmt::Write as _;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// An error raised by the downstream pipeline.
///
/// Carries an optional HTTP status, a message, whether that message is safe to
/// show the client, and an optional JSON payload that is copied into the log
/// record. Handlers return it like any other axum error:
///
/// ```rust
/// use axum::http::StatusCode;
/// use reqlog::HttpError;
///
/// async fn find_user() -> Result<String, HttpError> {
///     Err(HttpError::new(StatusCode::NOT_FOUND, "no such user"))
/// }
/// ```
///
/// When returned as a response, the error rides along in the response
/// extensions so that [`JsonLogLayer`](crate::JsonLogLayer) can classify the
/// request as failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    status: Option<StatusCode>,
    message: String,
    expose: bool,
    data: Option<serde_json::Value>,
    stack: String,
}

impl HttpError {
    /// Error with an explicit status. The message is exposed to the client
    /// for 4xx statuses only.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: Some(status),
            expose: status.is_client_error(),
            stack: render_stack(&message, None),
            message,
            data: None,
        }
    }

    /// Error without a status. Logged as a 500 and never exposed.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: None,
            expose: false,
            stack: render_stack(&message, None),
            message,
            data: None,
        }
    }

    /// Unclassified error built from any [`std::error::Error`], keeping its
    /// `source()` chain in the stack.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let message = err.to_string();
        Self {
            status: None,
            expose: false,
            stack: render_stack(&message, err.source()),
            message,
            data: None,
        }
    }

    /// Unclassified error for a caught panic. The message is the panic's
    /// `&str` or `String` payload when it has one.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "request handler panicked".to_owned());
        Self::internal(message)
    }

    /// Attach a payload that is copied into the `data` field of the log record.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Override whether the message may be written into the response body.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Set the status after construction, e.g. on an error built with
    /// [`HttpError::from_error`].
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The carried status, or 500 when the error has none.
    pub fn effective_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_exposed(&self) -> bool {
        self.expose
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// Rendered error chain, logged as `errorStack` and as the second
    /// plain-text line.
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// The response the client receives for this error: the effective status,
    /// and either the message or the status's reason phrase as body.
    pub fn to_response(&self) -> Response {
        let status = self.effective_status();
        let body = if self.expose {
            self.message.clone()
        } else {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_owned()
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = self.to_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<Infallible> for HttpError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

fn render_stack(message: &str, source: Option<&(dyn std::error::Error + 'static)>) -> String {
    let mut stack = format!("Error: {message}");
    let mut next = source;
    while let Some(cause) = next {
        let _ = write!(stack, "\n    caused by: {cause}");
        next = cause.source();
    }
    stack
}

/// Failures while emitting a log line. These never reach the client; the
/// logger reports them through `tracing` and moves on.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink rejected the log line")]
    SinkRejected,
    #[error("failed to write log line: {0}")]
    Io(#[from] std::io::Error),
}
