//! Data types for captured request metadata and the emitted log record.
//!
//! [`RequestMeta`] is the snapshot taken when a request enters the logger;
//! [`LogRecord`] is what the logger hands to `on_log` and serializes in JSON
//! mode.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, StatusCode},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HttpError;

/// A query parameter value. Keys that appear once hold a string, repeated keys
/// hold every value in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

/// Parse a raw query string into a key/value map.
///
/// ```rust
/// use reqlog::types::{parse_query, QueryValue};
///
/// let query = parse_query(Some("tag=a&tag=b&page=2"));
/// assert_eq!(query["page"], QueryValue::One("2".into()));
/// assert_eq!(query["tag"], QueryValue::Many(vec!["a".into(), "b".into()]));
/// assert!(parse_query(None).is_empty());
/// ```
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, QueryValue> {
    let mut query = BTreeMap::new();
    let Some(raw) = raw else {
        return query;
    };

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = value.into_owned();
        match query.remove(&*key) {
            None => {
                query.insert(key.into_owned(), QueryValue::One(value));
            }
            Some(QueryValue::One(first)) => {
                query.insert(key.into_owned(), QueryValue::Many(vec![first, value]));
            }
            Some(QueryValue::Many(mut values)) => {
                values.push(value);
                query.insert(key.into_owned(), QueryValue::Many(values));
            }
        }
    }
    query
}

/// Request metadata captured before the downstream pipeline runs.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Monotonic start of the request, used for `responseTime`
    pub started_at: Instant,
    /// Wall-clock start of the request
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Path and query exactly as received
    pub url: String,
    pub query: BTreeMap<String, QueryValue>,
    pub remote_address: Option<String>,
    pub host: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    /// Start the clock for a request with the given method and url. The query
    /// is parsed from the url.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let query = parse_query(url.split_once('?').map(|(_, query)| query));
        Self {
            started_at: Instant::now(),
            timestamp: Utc::now(),
            method: method.into(),
            url,
            query,
            remote_address: None,
            host: None,
            user_agent: None,
        }
    }

    /// Snapshot an axum request. The peer address is read from the
    /// `ConnectInfo<SocketAddr>` extension when the server provides one.
    pub fn from_request(request: &Request) -> Self {
        let uri = request.uri();
        let url = uri
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str().to_owned())
            .unwrap_or_else(|| uri.path().to_owned());

        let mut meta = Self::new(request.method().as_str(), url);
        meta.remote_address = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        meta.host = header_str(request.headers(), header::HOST)
            .or_else(|| uri.authority().map(|authority| authority.to_string()));
        meta.user_agent = header_str(request.headers(), header::USER_AGENT);
        meta
    }

    pub fn with_remote_address(mut self, remote_address: impl Into<String>) -> Self {
        self.remote_address = Some(remote_address.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the record for a finished request. `failure` fills the error
    /// fields; `status` must already be the final response status.
    pub(crate) fn into_record(
        self,
        status: StatusCode,
        elapsed: Duration,
        failure: Option<&HttpError>,
    ) -> LogRecord {
        LogRecord {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            method: self.method,
            url: self.url,
            query: self.query,
            remote_address: self.remote_address,
            host: self.host,
            user_agent: self.user_agent,
            status_code: status.as_u16(),
            error_message: failure.map(|err| err.message().to_owned()),
            error_stack: failure.map(|err| err.stack().to_owned()),
            data: failure.and_then(|err| err.data().cloned()),
            response_time: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// One log entry, built fresh for every request.
///
/// Serialized with camelCase field names; the optional fields are left out
/// of the JSON line when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// RFC 3339 UTC instant the request began
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub query: BTreeMap<String, QueryValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Elapsed milliseconds
    pub response_time: u64,
}

impl LogRecord {
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}
