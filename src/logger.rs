//! The request-logging interceptor.
//!
//! [`JsonLogger`] times the downstream pipeline, turns a failure into the
//! final response, and emits the log line(s) for the request. The tower
//! service in the crate root drives it, but it can wrap any future that
//! yields `Result<Response, HttpError>`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::response::Response;
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::error::{HttpError, LogError};
use crate::options::LogConfig;
use crate::sink::Sink;
use crate::types::{LogRecord, RequestMeta};

/// Logging interceptor holding a resolved [`LogConfig`].
///
/// Cloning is cheap and every clone shares the same configuration.
#[derive(Clone, Debug, Default)]
pub struct JsonLogger {
    config: Arc<LogConfig>,
}

impl JsonLogger {
    pub fn new(config: LogConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Run `next` for the request described by `meta` and log the outcome.
    ///
    /// Errors never escape: an `Err` from `next`, a response carrying an
    /// [`HttpError`] extension, or a panic while polling `next` is replaced by
    /// the error's response and logged as a failure. Panics become
    /// unclassified 500 errors.
    pub async fn intercept<Fut>(&self, meta: RequestMeta, next: Fut) -> Response
    where
        Fut: Future<Output = Result<Response, HttpError>>,
    {
        debug!(method = %meta.method, url = %meta.url, "Awaiting downstream pipeline");
        let outcome = match AssertUnwindSafe(next).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let err = HttpError::from_panic(payload.as_ref());
                error!(url = %meta.url, panic = %err.message(), "Downstream pipeline panicked");
                Err(err)
            }
        };

        let (response, failure) = match outcome {
            Ok(mut response) => match response.extensions_mut().remove::<HttpError>() {
                Some(err) => (err.to_response(), Some(err)),
                None => (response, None),
            },
            Err(err) => (err.to_response(), Some(err)),
        };

        let elapsed = meta.started_at.elapsed();
        let record = meta.into_record(response.status(), elapsed, failure.as_ref());
        debug!(
            status = record.status_code,
            response_time_ms = record.response_time,
            failed = failure.is_some(),
            "Downstream pipeline finished"
        );

        self.output(&record, failure.as_ref());
        response
    }

    /// Notify the observer and write the line(s) for a finished request.
    pub fn output(&self, record: &LogRecord, failure: Option<&HttpError>) {
        if let Some(on_log) = &self.config.on_log {
            on_log(record);
        }

        if !self.config.json_log {
            write_to(&self.config.request_sink, "request", &plain_line(record));
            if let Some(err) = failure {
                write_to(&self.config.error_sink, "error", err.stack());
            }
            return;
        }

        match json_line(record) {
            Ok(line) if record.is_error() => write_to(&self.config.error_sink, "error", &line),
            Ok(line) => write_to(&self.config.request_sink, "request", &line),
            Err(e) => warn!(error = %e, url = %record.url, "Dropping unserializable log record"),
        }
    }
}

/// `<timestamp> - <status> <method> <url> - <ms>ms`
pub fn plain_line(record: &LogRecord) -> String {
    format!(
        "{} - {} {} {} - {}ms",
        record.timestamp, record.status_code, record.method, record.url, record.response_time
    )
}

/// The record as one newline-terminated JSON document.
pub fn json_line(record: &LogRecord) -> Result<String, LogError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

// Sink failures are reported and otherwise ignored.
fn write_to(sink: &Sink, slot: &'static str, line: &str) {
    if let Err(e) = sink.write(line) {
        warn!(sink = slot, error = %e, "Failed to write log line");
    }
}
