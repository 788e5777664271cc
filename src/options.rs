//! Logger options and their resolution into a complete [`LogConfig`].

use std::fmt;
use std::sync::Arc;

use crate::sink::Sink;
use crate::types::LogRecord;

/// Observer called with every completed [`LogRecord`].
pub type OnLog = Arc<dyn Fn(&LogRecord) + Send + Sync>;

/// Runtime environment, used only to pick the default output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    /// Variable read by [`Environment::from_env`].
    pub const VAR: &'static str = "APP_ENV";

    /// Read [`Environment::VAR`] from the process environment.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(Self::VAR).ok().as_deref())
    }

    /// `"development"` (any case) selects development, anything else
    /// production.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.trim().eq_ignore_ascii_case("development") => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl From<bool> for Environment {
    fn from(is_development: bool) -> Self {
        if is_development {
            Self::Development
        } else {
            Self::Production
        }
    }
}

/// Partial logger configuration. Every field is optional; unset fields are
/// filled in by [`LogOptions::resolve`].
///
/// # Examples
///
/// ```rust
/// use reqlog::{Environment, LogOptions, Sink};
///
/// let config = LogOptions::default()
///     .with_json_log(true)
///     .with_error_sink(Sink::Stdout)
///     .resolve(Environment::Development);
///
/// assert!(config.json_log);
/// assert_eq!(config.request_sink, Sink::Stdout);
/// assert_eq!(config.error_sink, Sink::Stdout);
/// ```
#[derive(Clone, Default)]
pub struct LogOptions {
    /// Emit JSON lines instead of plain text
    pub json_log: Option<bool>,
    /// Single sink used for both request and error lines
    pub log_fn: Option<Sink>,
    /// Sink for successful requests; takes precedence over `log_fn`
    pub request_log_fn: Option<Sink>,
    /// Sink for failed requests; takes precedence over `log_fn`
    pub error_log_fn: Option<Sink>,
    pub on_log: Option<OnLog>,
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json_log(mut self, json_log: bool) -> Self {
        self.json_log = Some(json_log);
        self
    }

    /// Route every line through one function.
    pub fn with_log_fn<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.with_log_sink(Sink::from_fn(f))
    }

    pub fn with_log_sink(mut self, sink: Sink) -> Self {
        self.log_fn = Some(sink);
        self
    }

    pub fn with_request_log_fn<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.with_request_sink(Sink::from_fn(f))
    }

    pub fn with_request_sink(mut self, sink: Sink) -> Self {
        self.request_log_fn = Some(sink);
        self
    }

    pub fn with_error_log_fn<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.with_error_sink(Sink::from_fn(f))
    }

    pub fn with_error_sink(mut self, sink: Sink) -> Self {
        self.error_log_fn = Some(sink);
        self
    }

    pub fn with_on_log<F>(mut self, f: F) -> Self
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        self.on_log = Some(Arc::new(f));
        self
    }

    /// Fill in every unset field.
    ///
    /// - `json_log` defaults to `true`, or `false` in development.
    /// - The request sink is `request_log_fn`, else `log_fn`, else stdout.
    /// - The error sink is `error_log_fn`, else `log_fn`, else stderr.
    pub fn resolve(self, environment: Environment) -> LogConfig {
        let Self {
            json_log,
            log_fn,
            request_log_fn,
            error_log_fn,
            on_log,
        } = self;

        LogConfig {
            json_log: json_log.unwrap_or(!environment.is_development()),
            request_sink: request_log_fn
                .or_else(|| log_fn.clone())
                .unwrap_or(Sink::Stdout),
            error_sink: error_log_fn.or(log_fn).unwrap_or(Sink::Stderr),
            on_log,
        }
    }
}

impl fmt::Debug for LogOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogOptions")
            .field("json_log", &self.json_log)
            .field("log_fn", &self.log_fn)
            .field("request_log_fn", &self.request_log_fn)
            .field("error_log_fn", &self.error_log_fn)
            .field("on_log", &self.on_log.is_some())
            .finish()
    }
}

/// Resolve `options` for `environment`. Same as [`LogOptions::resolve`].
pub fn get_options(options: LogOptions, environment: Environment) -> LogConfig {
    options.resolve(environment)
}

/// Fully resolved logger configuration.
#[derive(Clone)]
pub struct LogConfig {
    pub json_log: bool,
    pub request_sink: Sink,
    pub error_sink: Sink,
    pub on_log: Option<OnLog>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogOptions::default().resolve(Environment::default())
    }
}

impl fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogConfig")
            .field("json_log", &self.json_log)
            .field("request_sink", &self.request_sink)
            .field("error_sink", &self.error_sink)
            .field("on_log", &self.on_log.is_some())
            .finish()
    }
}

impl PartialEq for LogConfig {
    fn eq(&self, other: &Self) -> bool {
        let same_observer = match (&self.on_log, &other.on_log) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_observer
            && self.json_log == other.json_log
            && self.request_sink == other.request_sink
            && self.error_sink == other.error_sink
    }
}
