//! Common Log Format Parser
//!
//! Turns one raw access-log line into a [`LogEntry`].
//!
//! # Format
//!
//! ```text
//! <host> <logname> <user> [<timestamp>] "<method> <url> <protocol>" <status> <bytes>
//! ```
//!
//! Every field except `host` may be the placeholder `-`. The timestamp and
//! request may be `-` instead of their bracketed/quoted form; `-` numeric
//! fields parse as 0.
//!
//! # Examples
//!
//! ```text
//! 127.0.0.1 - james [09/May/2018:16:00:39 +0000] "GET /report HTTP/1.0" 200 123
//! 127.0.0.1 - - - - - -
//! ```
//!
//! # Timestamps
//!
//! The canonical layout `DD/Mon/YYYY:HH:MM:SS ±ZZZZ` is tried first. When
//! it fails, [`parse_any_timestamp`] tries a list of other common layouts.
//! A timestamp that matches nothing rejects the whole line.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{ParseError, ParseErrorKind};
use crate::types::{LogEntry, Request, MISSING};

/// Grammar of a common log format line, one capture group per field
const LINE_PATTERN: &str = concat!(
    r"^(\S+)\s",                 // remote host
    r"([^ ]*)\s",                // remote logname
    r"([^ ]*)\s",                // auth user
    r"(?:-|\[([^\]]*)\])\s",     // timestamp
    r#"(?:-|"(.*)")\s"#,         // request
    r"(-|[0-9]{3})\s",           // status
    r"(-|[0-9]+)$",              // bytes
);

/// Canonical access-log timestamp layout
pub const CLF_TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Layouts carrying a UTC offset, tried after the canonical one
const OFFSET_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %y %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%a %b %d %H:%M:%S %z %Y",
    "%d/%b/%Y %H:%M:%S %z",
];

/// Layouts without an offset, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%d/%b/%Y:%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%b %d %Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",
    "%m/%d/%Y %H:%M:%S",
];

/// Date-only layouts, interpreted as midnight UTC
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%b/%Y", "%Y/%m/%d", "%d %b %Y"];

/// Parser configuration
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Lines longer than this are rejected without matching (default: 16KB)
    pub max_line_length: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_line_length: 16 * 1024,
        }
    }
}

/// Access-log line parser
///
/// Owns the compiled line grammar; build one at startup and share it.
///
/// # Example
///
/// ```rust
/// use kuba_logmon::ingestion::AccessLogParser;
///
/// let parser = AccessLogParser::new();
/// let entry = parser
///     .parse(r#"127.0.0.1 - james [09/May/2018:16:00:39 +0000] "GET /report HTTP/1.0" 200 123"#)
///     .unwrap();
/// assert_eq!(entry.request.section(), "/report");
/// ```
#[derive(Debug, Clone)]
pub struct AccessLogParser {
    config: ParserConfig,
    line_regex: Regex,
}

impl AccessLogParser {
    /// Create a parser with default configuration
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Create a parser with custom configuration
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            line_regex: Regex::new(LINE_PATTERN).expect("line grammar is a valid regex"),
        }
    }

    /// Parse one line into a [`LogEntry`]
    pub fn parse(&self, raw: &str) -> Result<LogEntry, ParseError> {
        let line = raw.trim_end_matches(['\r', '\n']);

        if line.len() > self.config.max_line_length {
            return Err(ParseError::new(ParseErrorKind::InvalidFormat).with_context(line));
        }

        let caps = self
            .line_regex
            .captures(line)
            .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidFormat).with_context(line))?;

        let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());

        let timestamp = match caps.get(4) {
            Some(m) => Some(parse_timestamp(m.as_str()).map_err(|e| e.with_context(line))?),
            None => None,
        };

        let request = match caps.get(5) {
            Some(m) => parse_request(m.as_str()).map_err(|e| e.with_context(line))?,
            None => Request::default(),
        };

        let status = parse_number::<u16>("status", field(6)).map_err(|e| e.with_context(line))?;
        let bytes = parse_number::<u64>("bytes", field(7)).map_err(|e| e.with_context(line))?;

        Ok(LogEntry {
            remote_host: field(1).to_string(),
            remote_logname: field(2).to_string(),
            auth_user: field(3).to_string(),
            timestamp,
            request,
            status,
            bytes,
        })
    }
}

impl Default for AccessLogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a request into exactly three space-separated tokens
fn parse_request(raw: &str) -> Result<Request, ParseError> {
    let tokens: Vec<&str> = raw.split(' ').collect();
    match tokens.as_slice() {
        [method, url, protocol] => Ok(Request::new(*method, *url, *protocol)),
        _ => Err(ParseError::new(ParseErrorKind::InvalidRequest {
            tokens: tokens.len(),
        })),
    }
}

/// Parse a numeric field, `-` meaning zero
fn parse_number<T>(field: &'static str, raw: &str) -> Result<T, ParseError>
where
    T: std::str::FromStr + Default,
{
    if raw == MISSING {
        return Ok(T::default());
    }

    raw.parse::<T>().map_err(|_| {
        ParseError::new(ParseErrorKind::InvalidNumber {
            field,
            value: raw.to_string(),
        })
    })
}

/// Parse a bracketed timestamp: canonical layout first, then the fallbacks
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(ts) = DateTime::parse_from_str(raw, CLF_TIMESTAMP_FORMAT) {
        return Ok(ts.with_timezone(&Utc));
    }

    parse_any_timestamp(raw)
        .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidTimestamp(raw.to_string())))
}

/// Permissive timestamp parsing over a fixed list of layouts
///
/// Accepts RFC 3339, RFC 2822, the layouts in this module's format tables
/// and bare Unix timestamps in seconds (10 digits) or milliseconds
/// (13 digits). Values without an offset are taken as UTC.
pub fn parse_any_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = raw.parse().ok()?;
        return match raw.len() {
            10 => DateTime::from_timestamp(n, 0),
            13 => DateTime::from_timestamp_millis(n),
            _ => None,
        };
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }

    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|ts| ts.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parser() -> AccessLogParser {
        AccessLogParser::new()
    }

    #[test]
    fn test_parse_full_line() {
        let entry = parser()
            .parse(r#"127.0.0.1 - james [09/May/2018:16:00:39 +0000] "GET /report HTTP/1.0" 200 123"#)
            .unwrap();

        assert_eq!(entry.remote_host, "127.0.0.1");
        assert_eq!(entry.remote_logname, "-");
        assert_eq!(entry.auth_user, "james");
        assert_eq!(
            entry.timestamp,
            Some(Utc.with_ymd_and_hms(2018, 5, 9, 16, 0, 39).unwrap())
        );
        assert_eq!(entry.request, Request::new("GET", "/report", "HTTP/1.0"));
        assert_eq!(entry.status, 200);
        assert_eq!(entry.bytes, 123);
    }

    #[test]
    fn test_parse_converts_offset_to_utc() {
        let entry = parser()
            .parse(r#"10.0.0.1 - - [09/May/2018:18:00:39 +0200] "GET / HTTP/1.1" 200 1"#)
            .unwrap();
        assert_eq!(
            entry.timestamp,
            Some(Utc.with_ymd_and_hms(2018, 5, 9, 16, 0, 39).unwrap())
        );
    }

    #[test]
    fn test_parse_fallback_timestamp() {
        let entry = parser()
            .parse(r#"127.0.0.1 - james [09 May 2018 16:00 +0000] "GET /report HTTP/1.0" 200 123"#)
            .unwrap();
        assert_eq!(
            entry.timestamp,
            Some(Utc.with_ymd_and_hms(2018, 5, 9, 16, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_all_sentinels() {
        let entry = parser().parse("127.0.0.1 - - - - - -").unwrap();

        assert_eq!(entry.remote_logname, "-");
        assert_eq!(entry.auth_user, "-");
        assert_eq!(entry.timestamp, None);
        assert_eq!(entry.request, Request::default());
        assert_eq!(entry.status, 0);
        assert_eq!(entry.bytes, 0);
    }

    #[test]
    fn test_invalid_line() {
        let err = parser().parse("invalid").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFormat);

        // Missing closing quote
        assert!(parser()
            .parse(r#"127.0.0.1 - - [09/May/2018:16:00:39 +0000] "GET / HTTP/1.0 200 1"#)
            .is_err());
    }

    #[test]
    fn test_invalid_date() {
        let err = parser()
            .parse(r#"127.0.0.1 - james [40/May/2018:16:00:39 ] "GET /report HTTP/1.0" 200 123"#)
            .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidTimestamp(_)));
    }

    #[test]
    fn test_invalid_request() {
        let err = parser()
            .parse(r#"127.0.0.1 - james [09 May 2018 16:00 +0000] "GET /report" 200 123"#)
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidRequest { tokens: 2 });

        let err = parser()
            .parse(r#"127.0.0.1 - james - "GET /a b HTTP/1.0" 200 123"#)
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidRequest { tokens: 4 });

        let err = parser().parse(r#"127.0.0.1 - james - "" 200 123"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidRequest { tokens: 1 });
    }

    #[test]
    fn test_invalid_status() {
        let err = parser()
            .parse(r#"127.0.0.1 - james [09 May 2018 16:00 +0000] "GET /report HTTP/1.0" 20 123"#)
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFormat);
    }

    #[test]
    fn test_invalid_size() {
        let err = parser()
            .parse(r#"127.0.0.1 - james [09 May 2018 16:00 +0000] "GET /report HTTP/1.0" 123 invalid"#)
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFormat);
    }

    #[test]
    fn test_bytes_overflow_is_rejected() {
        let err = parser()
            .parse(r#"127.0.0.1 - - - "GET / HTTP/1.0" 200 99999999999999999999999"#)
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::InvalidNumber { field: "bytes", .. }
        ));
    }

    #[test]
    fn test_trailing_carriage_return() {
        let entry = parser()
            .parse("127.0.0.1 - - - \"GET / HTTP/1.0\" 404 0\r\n")
            .unwrap();
        assert_eq!(entry.status, 404);
    }

    #[test]
    fn test_line_length_limit() {
        let parser = AccessLogParser::with_config(ParserConfig { max_line_length: 16 });
        assert!(parser.parse("127.0.0.1 - - - - - -").is_err());
    }

    #[test]
    fn test_parse_any_timestamp_layouts() {
        let expected = Utc.with_ymd_and_hms(2018, 5, 9, 16, 0, 39).unwrap();

        for raw in [
            "2018-05-09T16:00:39Z",
            "2018-05-09T18:00:39+02:00",
            "Wed, 09 May 2018 16:00:39 +0000",
            "2018-05-09 16:00:39",
            "2018/05/09 16:00:39",
            "09/May/2018:16:00:39",
            "1525881639",
            "1525881639000",
        ] {
            assert_eq!(parse_any_timestamp(raw), Some(expected), "layout {}", raw);
        }

        assert_eq!(parse_any_timestamp(""), None);
        assert_eq!(parse_any_timestamp("yesterday"), None);
        assert_eq!(parse_any_timestamp("40/May/2018:16:00:39"), None);
    }
}
