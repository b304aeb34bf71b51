//! Error types for the log monitor
//!
//! Three failure classes flow through the pipeline:
//!
//! - [`ParseError`]: a single access-log line did not match the expected
//!   format. Line-scoped and always recoverable; the ingestion service logs
//!   it and moves on.
//! - [`StoreError`]: the shared time-series store failed. Fatal to the task
//!   that hit it and, through the service manager, to the whole pipeline.
//! - [`ConfigError`]: invalid alert definitions or configuration files.
//!   Raised before anything is started.
//!
//! Failures inside running services travel as
//! [`ServiceError`](crate::services::ServiceError) and are mapped back to
//! [`Error`] when the monitor stops.

use std::fmt;

use thiserror::Error;

use crate::services::ServiceError;

/// Main error type for the monitor
#[derive(Error, Debug)]
pub enum Error {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Line parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Line source failure (tailing, channel)
    #[error("Line source error: {0}")]
    Source(String),

    /// Service framework error
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store errors
///
/// Returned by every [`TimeSeriesStore`](crate::engine::TimeSeriesStore)
/// operation. Once a store has been cleaned up it only ever returns
/// [`StoreError::Closed`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store was cleaned up and can no longer be used
    #[error("Store is closed")]
    Closed,

    /// Query bounds are inverted
    #[error("Invalid time range: start {start} > end {end}")]
    InvalidTimeRange {
        /// Start timestamp (ms)
        start: i64,
        /// End timestamp (ms)
        end: i64,
    },

    /// A point could not be appended
    #[error("Append rejected: {0}")]
    AppendRejected(String),

    /// Backend-specific failure
    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An alert or matcher pattern failed to compile
    #[error("Invalid pattern '{pattern}' for label '{label}': {reason}")]
    InvalidPattern {
        /// Label the pattern applies to
        label: String,
        /// The pattern (truncated if long)
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// The label is not part of the access-log label set
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    /// A field failed validation
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Field name
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// Two alerts share a name
    #[error("Duplicate alert name '{0}'")]
    DuplicateAlert(String),

    /// Config file could not be read or parsed
    #[error("Failed to load {path}: {message}")]
    Load {
        /// File path
        path: String,
        /// Underlying failure
        message: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Access-log line parse error with a snippet of the offending input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Kind of error that occurred
    pub kind: ParseErrorKind,
    /// The problematic input (truncated if too long)
    pub context: Option<String>,
}

/// Maximum context kept on a parse error
const MAX_CONTEXT_LEN: usize = 80;

impl ParseError {
    /// Create a new parse error
    pub fn new(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Attach the input that failed to parse
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        self.context = if ctx.chars().count() > MAX_CONTEXT_LEN {
            let head: String = ctx.chars().take(MAX_CONTEXT_LEN - 3).collect();
            Some(format!("{}...", head))
        } else {
            Some(ctx)
        };
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref ctx) = self.context {
            write!(f, " near '{}'", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Kinds of parse errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Line does not follow the common log format grammar
    InvalidFormat,

    /// Timestamp present but unparseable by every known layout
    InvalidTimestamp(String),

    /// Request field is not `METHOD URL PROTOCOL`
    InvalidRequest {
        /// Number of space-separated tokens found
        tokens: usize,
    },

    /// Numeric field does not fit the expected integer type
    InvalidNumber {
        /// Field name (`status` or `bytes`)
        field: &'static str,
        /// Raw value
        value: String,
    },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidFormat => write!(f, "Invalid format line"),
            ParseErrorKind::InvalidTimestamp(raw) => write!(f, "Invalid timestamp '{}'", raw),
            ParseErrorKind::InvalidRequest { tokens } => {
                write!(f, "Invalid request: expected 3 tokens, got {}", tokens)
            },
            ParseErrorKind::InvalidNumber { field, value } => {
                write!(f, "Invalid {} value '{}'", field, value)
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(ParseErrorKind::InvalidRequest { tokens: 2 })
            .with_context("GET /report");

        let msg = err.to_string();
        assert!(msg.contains("expected 3 tokens, got 2"));
        assert!(msg.contains("GET /report"));
    }

    #[test]
    fn test_parse_error_truncates_context() {
        let err = ParseError::new(ParseErrorKind::InvalidFormat).with_context("x".repeat(500));
        let ctx = err.context.unwrap();
        assert_eq!(ctx.chars().count(), MAX_CONTEXT_LEN);
        assert!(ctx.ends_with("..."));
    }

    #[test]
    fn test_error_conversions() {
        let err: Error = StoreError::Closed.into();
        assert!(matches!(err, Error::Store(StoreError::Closed)));

        let err: Error = ConfigError::UnknownLabel("foo".into()).into();
        assert_eq!(err.to_string(), "Configuration error: Unknown label 'foo'");
    }
}
