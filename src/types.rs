//! Core data types used throughout the monitor
//!
//! # Key Types
//!
//! - **`LogEntry`**: One parsed access-log line
//! - **`Request`**: The `"METHOD URL PROTOCOL"` part of a line
//! - **`LabelSet`**: String labels derived from an entry; the only grouping
//!   key the store understands
//! - **`TimeRange`**: Inclusive query window in Unix milliseconds
//!
//! # Example
//!
//! ```rust
//! use kuba_logmon::types::{section, TimeRange};
//!
//! assert_eq!(section("/pages/title/create"), "/pages");
//!
//! let range = TimeRange::new(1000, 2000).unwrap();
//! assert!(range.contains(2000));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Label holding the remote host
pub const HOST_LABEL: &str = "host";
/// Label holding the RFC 1413 logname
pub const LOGNAME_LABEL: &str = "logname";
/// Label holding the authenticated user
pub const USER_LABEL: &str = "user";
/// Label holding the request method
pub const METHOD_LABEL: &str = "method";
/// Label holding the request URL
pub const URL_LABEL: &str = "url";
/// Label holding the request protocol
pub const PROTOCOL_LABEL: &str = "protocol";
/// Label holding the first path segment of the URL
pub const SECTION_LABEL: &str = "section";
/// Label holding the response status code
pub const STATUS_LABEL: &str = "status";

/// Every label an entry produces, in a stable order
pub const ALL_LABELS: [&str; 8] = [
    HOST_LABEL,
    LOGNAME_LABEL,
    USER_LABEL,
    METHOD_LABEL,
    URL_LABEL,
    PROTOCOL_LABEL,
    SECTION_LABEL,
    STATUS_LABEL,
];

/// Pattern matching every label value
pub const ALL_VALUES_PATTERN: &str = ".*";

/// Placeholder for missing fields in the common log format
pub const MISSING: &str = "-";

/// Check whether `name` is one of the labels produced by [`LogEntry::labels`]
pub fn is_known_label(name: &str) -> bool {
    ALL_LABELS.contains(&name)
}

/// Compute the section of a URL: everything before the second `/`
///
/// `/pages/title/create` → `/pages`, `/pages` → `/pages`, `pages` → `pages`.
pub fn section(url: &str) -> &str {
    let Some(first) = url.find('/') else {
        return url;
    };

    match url[first + 1..].find('/') {
        Some(second) => &url[..first + 1 + second],
        None => url,
    }
}

/// Set of string labels identifying a series
///
/// Backed by a sorted map so two sets with the same pairs compare and hash
/// equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert or replace a label
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Get a label value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Time range for queries (inclusive on both ends), in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp in milliseconds (inclusive)
    pub start: i64,

    /// End timestamp in milliseconds (inclusive)
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range, rejecting `start > end`
    pub fn new(start: i64, end: i64) -> Result<Self, StoreError> {
        if start > end {
            return Err(StoreError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build the range covering `[since, until]`
    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, StoreError> {
        Self::new(since.timestamp_millis(), until.timestamp_millis())
    }

    /// Check if a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Duration of the range in milliseconds
    pub fn duration_ms(&self) -> Option<i64> {
        self.end.checked_sub(self.start)
    }
}

/// A single stored sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Sample weight (1.0 per request)
    pub value: f64,
}

impl DataPoint {
    /// Create a new data point
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// HTTP request line of an access-log entry
///
/// A `-` request in the log yields the default (all fields empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Request method (GET, POST, ...)
    pub method: String,
    /// Requested URL
    pub url: String,
    /// Protocol (HTTP/1.1, ...)
    pub protocol: String,
}

impl Request {
    /// Create a request from its three parts
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            protocol: protocol.into(),
        }
    }

    /// Section of the requested URL, see [`section`]
    pub fn section(&self) -> &str {
        section(&self.url)
    }

    /// True for a `-` request
    pub fn is_empty(&self) -> bool {
        self.method.is_empty() && self.url.is_empty() && self.protocol.is_empty()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.url, self.protocol)
    }
}

/// One parsed line of an HTTP access log
///
/// Entries only exist fully parsed; a line that fails any check never
/// produces one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Remote host name or address
    pub remote_host: String,
    /// Remote logname (may be `-`)
    pub remote_logname: String,
    /// Authenticated user (may be `-`)
    pub auth_user: String,
    /// Request time, `None` when the log carried `-`
    pub timestamp: Option<DateTime<Utc>>,
    /// Request line
    pub request: Request,
    /// Response status, 0 when missing
    pub status: u16,
    /// Response size in bytes, 0 when missing
    pub bytes: u64,
}

impl LogEntry {
    /// Labels stored with this entry
    ///
    /// Numeric fields are stringified; `section` is derived from the URL.
    pub fn labels(&self) -> LabelSet {
        LabelSet::from_iter([
            (HOST_LABEL, self.remote_host.clone()),
            (LOGNAME_LABEL, self.remote_logname.clone()),
            (USER_LABEL, self.auth_user.clone()),
            (METHOD_LABEL, self.request.method.clone()),
            (URL_LABEL, self.request.url.clone()),
            (PROTOCOL_LABEL, self.request.protocol.clone()),
            (SECTION_LABEL, self.request.section().to_string()),
            (STATUS_LABEL, self.status.to_string()),
        ])
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ",
            self.remote_host, self.remote_logname, self.auth_user
        )?;

        match self.timestamp {
            Some(ts) => write!(f, "[{}] ", ts.format("%d/%b/%Y:%H:%M:%S %z"))?,
            None => write!(f, "{} ", MISSING)?,
        }

        if self.request.is_empty() {
            write!(f, "{} ", MISSING)?;
        } else {
            write!(f, "\"{}\" ", self.request)?;
        }

        // Zero status or size came from the sentinel
        match self.status {
            0 => write!(f, "{} ", MISSING)?,
            status => write!(f, "{} ", status)?,
        }
        match self.bytes {
            0 => write!(f, "{}", MISSING),
            bytes => write!(f, "{}", bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_entry() -> LogEntry {
        LogEntry {
            remote_host: "127.0.0.1".to_string(),
            remote_logname: "-".to_string(),
            auth_user: "james".to_string(),
            timestamp: Some(Utc.with_ymd_and_hms(2018, 5, 9, 16, 0, 39).unwrap()),
            request: Request::new("GET", "/report/user", "HTTP/1.0"),
            status: 200,
            bytes: 123,
        }
    }

    #[test]
    fn test_section() {
        assert_eq!(section("pages"), "pages");
        assert_eq!(section("/pages"), "/pages");
        assert_eq!(section("/pages/title/create"), "/pages");
        assert_eq!(section("/pages/"), "/pages");
        assert_eq!(section("http://example.com/a"), "http:/");
        assert_eq!(section(""), "");
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::new(100, 200).unwrap();
        assert!(range.contains(100));
        assert!(range.contains(200));
        assert!(!range.contains(201));
        assert_eq!(range.duration_ms(), Some(100));

        assert_eq!(
            TimeRange::new(200, 100),
            Err(StoreError::InvalidTimeRange {
                start: 200,
                end: 100
            })
        );
    }

    #[test]
    fn test_entry_labels() {
        let labels = sample_entry().labels();

        assert_eq!(labels.len(), ALL_LABELS.len());
        assert_eq!(labels.get(HOST_LABEL), Some("127.0.0.1"));
        assert_eq!(labels.get(LOGNAME_LABEL), Some("-"));
        assert_eq!(labels.get(USER_LABEL), Some("james"));
        assert_eq!(labels.get(METHOD_LABEL), Some("GET"));
        assert_eq!(labels.get(URL_LABEL), Some("/report/user"));
        assert_eq!(labels.get(PROTOCOL_LABEL), Some("HTTP/1.0"));
        assert_eq!(labels.get(SECTION_LABEL), Some("/report"));
        assert_eq!(labels.get(STATUS_LABEL), Some("200"));
    }

    #[test]
    fn test_label_set_order_independent() {
        let a = LabelSet::from_iter([("host", "a"), ("user", "b")]);
        let b = LabelSet::from_iter([("user", "b"), ("host", "a")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{host=\"a\", user=\"b\"}");
    }

    #[test]
    fn test_entry_display() {
        let entry = sample_entry();
        assert_eq!(
            entry.to_string(),
            "127.0.0.1 - james [09/May/2018:16:00:39 +0000] \"GET /report/user HTTP/1.0\" 200 123"
        );

        let bare = LogEntry {
            timestamp: None,
            request: Request::default(),
            status: 0,
            bytes: 0,
            ..entry
        };
        assert_eq!(bare.to_string(), "127.0.0.1 - james - - - -");

        let parsed = crate::ingestion::AccessLogParser::new()
            .parse(&bare.to_string())
            .unwrap();
        assert_eq!(parsed, bare);
    }
}
