//! Store contract and label matchers

use async_trait::async_trait;
use regex::Regex;

use crate::error::{ConfigError, StoreError};
use crate::types::{DataPoint, LabelSet, TimeRange};

/// Maximum accepted pattern length
pub const MAX_PATTERN_LEN: usize = 1024;

/// Compiled size limit for matcher regexes
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

// =============================================================================
// Label Matcher
// =============================================================================

/// How a matcher compares a label value
#[derive(Debug, Clone)]
pub enum MatchMode {
    /// Value equals the string
    Exact(String),

    /// Value matches the regex in full
    Regex(Regex),

    /// Any value, as long as the label is present
    Any,
}

/// Selects series by the value of one label
///
/// Series that do not carry the label never match.
///
/// # Example
///
/// ```rust
/// use kuba_logmon::engine::LabelMatcher;
/// use kuba_logmon::types::LabelSet;
///
/// let matcher = LabelMatcher::regex("section", "/api.*").unwrap();
/// let labels = LabelSet::from_iter([("section", "/api")]);
/// assert!(matcher.matches(&labels));
///
/// // Patterns are anchored: a partial hit is not a match
/// assert!(!LabelMatcher::regex("section", "api").unwrap().matches(&labels));
/// ```
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    name: String,
    mode: MatchMode,
}

impl LabelMatcher {
    /// Match a label value exactly
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MatchMode::Exact(value.into()),
        }
    }

    /// Match every value of a label
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MatchMode::Any,
        }
    }

    /// Match a label value against a regular expression over the full value
    pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        let name = name.into();

        if pattern.len() > MAX_PATTERN_LEN {
            return Err(ConfigError::InvalidPattern {
                label: name,
                pattern: truncate_pattern(pattern),
                reason: format!("pattern too long (max {} chars)", MAX_PATTERN_LEN),
            });
        }

        let anchored = format!("^(?:{})$", pattern);
        let regex = regex::RegexBuilder::new(&anchored)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                label: name.clone(),
                pattern: truncate_pattern(pattern),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            mode: MatchMode::Regex(regex),
        })
    }

    /// Label this matcher inspects
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match mode
    pub fn mode(&self) -> &MatchMode {
        &self.mode
    }

    /// Check a single label value
    pub fn matches_value(&self, value: &str) -> bool {
        match &self.mode {
            MatchMode::Exact(expected) => expected == value,
            MatchMode::Regex(regex) => regex.is_match(value),
            MatchMode::Any => true,
        }
    }

    /// Check a full label set
    pub fn matches(&self, labels: &LabelSet) -> bool {
        labels
            .get(&self.name)
            .is_some_and(|value| self.matches_value(value))
    }
}

fn truncate_pattern(pattern: &str) -> String {
    if pattern.chars().count() > 50 {
        let head: String = pattern.chars().take(50).collect();
        format!("{}...", head)
    } else {
        pattern.to_string()
    }
}

// =============================================================================
// Time Series Store
// =============================================================================

/// One series returned by a query: its labels and the points in range
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Full label set of the series
    pub labels: LabelSet,
    /// Points inside the query range, ascending by timestamp
    pub points: Vec<DataPoint>,
}

impl Series {
    /// Sum of the point values
    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of distinct series
    pub series_count: usize,
    /// Number of points held
    pub point_count: usize,
    /// Points dropped by retention
    pub points_expired: u64,
    /// Whether `cleanup` was called
    pub closed: bool,
}

/// Append/range-query store keyed by label sets
///
/// Implementations must accept one writer and any number of concurrent
/// readers without external locking. Appends that complete before a query
/// starts are visible to it.
///
/// Once [`cleanup`](TimeSeriesStore::cleanup) has been called the store is
/// terminal: `add` and `query` fail with [`StoreError::Closed`].
#[async_trait]
pub trait TimeSeriesStore: Send + Sync + 'static {
    /// Identifier used in logs
    fn store_id(&self) -> &str;

    /// Append one point to the series identified by `labels`
    async fn add(&self, labels: &LabelSet, timestamp: i64, value: f64) -> Result<(), StoreError>;

    /// Return every series matching `matcher` with its points inside `range`
    ///
    /// Series with no point in range are omitted.
    async fn query(
        &self,
        range: TimeRange,
        matcher: &LabelMatcher,
    ) -> Result<Vec<Series>, StoreError>;

    /// Release all data; the store cannot be used afterwards
    async fn cleanup(&self) -> Result<(), StoreError>;

    /// Current statistics
    fn stats(&self) -> StoreStats;
}
