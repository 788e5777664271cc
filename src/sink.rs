//! Output sinks for formatted log lines.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use tracing::Level;

use crate::error::LogError;

/// Signature of a custom sink. Returning `false` reports that the line was
/// not written.
pub type LogFn = dyn Fn(&str) -> bool + Send + Sync;

/// Destination for formatted log lines.
///
/// Lines are handed over exactly as formatted: JSON lines end with `\n`,
/// plain-text lines do not. [`Sink::Stdout`] and [`Sink::Stderr`] add the
/// missing newline so that each line stays on its own row.
///
/// To log through `tracing`, [`Sink::tracing_defaults`] gives the usual
/// pair: request lines at INFO and error lines at ERROR.
///
/// ```rust
/// use reqlog::{Environment, LogOptions, Sink};
///
/// let (requests, errors) = Sink::tracing_defaults();
/// let config = LogOptions::new()
///     .with_request_sink(requests)
///     .with_error_sink(errors)
///     .resolve(Environment::Production);
/// assert_eq!(config.error_sink, Sink::Tracing(tracing::Level::ERROR));
/// ```
#[derive(Clone)]
pub enum Sink {
    /// Process standard output.
    Stdout,
    /// Process standard error.
    Stderr,
    /// A `tracing` event at the given level, target `reqlog`.
    Tracing(Level),
    /// Any caller-supplied function.
    Custom(Arc<LogFn>),
}

impl Sink {
    /// `(request, error)` sinks emitting `tracing` events at INFO and ERROR.
    pub fn tracing_defaults() -> (Self, Self) {
        (Self::Tracing(Level::INFO), Self::Tracing(Level::ERROR))
    }

    /// Wrap a closure as a sink.
    ///
    /// ```rust
    /// use reqlog::Sink;
    ///
    /// let sink = Sink::from_fn(|line| {
    ///     eprint!("{line}");
    ///     true
    /// });
    /// assert!(sink.write("hello\n").is_ok());
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Write one line.
    pub fn write(&self, line: &str) -> Result<(), LogError> {
        match self {
            Self::Stdout => write_line(std::io::stdout().lock(), line),
            Self::Stderr => write_line(std::io::stderr().lock(), line),
            Self::Tracing(level) => {
                emit_event(*level, line.trim_end_matches('\n'));
                Ok(())
            }
            Self::Custom(f) => {
                if f(line) {
                    Ok(())
                } else {
                    Err(LogError::SinkRejected)
                }
            }
        }
    }
}

fn write_line(mut out: impl Write, line: &str) -> Result<(), LogError> {
    out.write_all(line.as_bytes())?;
    if !line.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

// tracing macros need the level as a constant
fn emit_event(level: Level, line: &str) {
    match level {
        Level::ERROR => tracing::error!(target: "reqlog", "{line}"),
        Level::WARN => tracing::warn!(target: "reqlog", "{line}"),
        Level::INFO => tracing::info!(target: "reqlog", "{line}"),
        Level::DEBUG => tracing::debug!(target: "reqlog", "{line}"),
        _ => tracing::trace!(target: "reqlog", "{line}"),
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Stderr => f.write_str("Stderr"),
            Self::Tracing(level) => f.debug_tuple("Tracing").field(level).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Custom sinks compare by identity.
impl PartialEq for Sink {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Stdout, Self::Stdout) | (Self::Stderr, Self::Stderr) => true,
            (Self::Tracing(a), Self::Tracing(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn custom_sink_receives_line_verbatim() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink = Sink::from_fn(move |line| {
            captured.lock().unwrap().push(line.to_owned());
            true
        });

        sink.write("200 GET / - 1ms").unwrap();
        sink.write("{\"statusCode\":200}\n").unwrap();

        assert_eq!(
            *lines.lock().unwrap(),
            vec!["200 GET / - 1ms", "{\"statusCode\":200}\n"]
        );
    }

    #[test]
    fn rejected_line_is_an_error() {
        let sink = Sink::from_fn(|_| false);
        assert!(matches!(sink.write("dropped"), Err(LogError::SinkRejected)));
    }

    #[test]
    fn write_line_terminates_unterminated_lines() {
        let mut out = Vec::new();
        write_line(&mut out, "plain").unwrap();
        write_line(&mut out, "json\n").unwrap();
        assert_eq!(out, b"plain\njson\n");
    }

    /// Records the level, target and message of every event
    #[derive(Clone, Default)]
    struct EventCapture(Arc<Mutex<Vec<(Level, String, String)>>>);

    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            let metadata = event.metadata();
            self.0.lock().unwrap().push((
                *metadata.level(),
                metadata.target().to_owned(),
                visitor.0,
            ));
        }
    }

    #[test]
    fn tracing_sinks_emit_at_their_level_without_newline() {
        use tracing_subscriber::layer::SubscriberExt;

        let capture = EventCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let (requests, errors) = Sink::tracing_defaults();

        tracing::subscriber::with_default(subscriber, || {
            requests.write("{\"statusCode\":200}\n").unwrap();
            errors.write("Error: not found").unwrap();
            Sink::Tracing(Level::DEBUG).write("debug line\n").unwrap();
        });

        let events = capture.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (Level::INFO, "reqlog".to_owned(), "{\"statusCode\":200}".to_owned()),
                (Level::ERROR, "reqlog".to_owned(), "Error: not found".to_owned()),
                (Level::DEBUG, "reqlog".to_owned(), "debug line".to_owned()),
            ]
        );
    }

    #[test]
    fn equality_is_by_identity_for_custom_sinks() {
        let sink = Sink::from_fn(|_| true);
        assert_eq!(sink, sink.clone());
        assert_ne!(sink, Sink::from_fn(|_| true));
        assert_eq!(Sink::Stdout, Sink::Stdout);
        assert_ne!(Sink::Stdout, Sink::Stderr);
        assert_ne!(Sink::Tracing(Level::INFO), Sink::Tracing(Level::ERROR));
    }
}
