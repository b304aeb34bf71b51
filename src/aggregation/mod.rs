//! Aggregation over the time-series store
//!
//! Turns raw per-request points into per-label-value counts and rankings.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   query(range, matcher)   ┌──────────────────┐
//! │ TimeSeriesStore  │──────────────────────────▶│  sum_by_label    │
//! └──────────────────┘                           └────────┬─────────┘
//!                                                         │ value → weight
//!                                                         ▼
//!                                 ┌──────────────┐   ┌──────────┐
//!                                 │ StatsSummary │◀──│  top_k   │
//!                                 └──────────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let aggregator = Aggregator::new(store.clone());
//! let range = TimeRange::between(now - window, now)?;
//!
//! // Busiest three hosts in the window
//! let hosts = aggregator.top_entries("host", ".*", range, 3).await?;
//! ```

pub mod functions;
pub mod summary;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::engine::{LabelMatcher, TimeSeriesStore};
use crate::error::{Error, StoreError};
use crate::metrics;
use crate::types::{TimeRange, METHOD_LABEL, SECTION_LABEL, STATUS_LABEL, USER_LABEL};

pub use functions::{sum_by_label, top_k, RankedEntry};
pub use summary::{StatsSummary, StatusBreakdown, SUMMARY_TOP_LIMIT};

/// Groups and ranks stored points by label
///
/// Cheap to clone; every clone shares the same store.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn TimeSeriesStore>,
}

impl Aggregator {
    /// Create an aggregator over `store`
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn TimeSeriesStore> {
        &self.store
    }

    /// Summed weight per value of the matcher's label inside `range`
    pub async fn entries(
        &self,
        matcher: &LabelMatcher,
        range: TimeRange,
    ) -> Result<HashMap<String, f64>, StoreError> {
        let started = Instant::now();

        let series = self.store.query(range, matcher).await.inspect_err(|_| {
            metrics::record_store_failure("query");
        })?;
        let sums = sum_by_label(&series, matcher.name());

        metrics::record_query(matcher.name(), started.elapsed().as_secs_f64());
        Ok(sums)
    }

    /// Ranked entries for the matcher's label; `limit = 0` returns all
    pub async fn top(
        &self,
        matcher: &LabelMatcher,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RankedEntry>, StoreError> {
        let sums = self.entries(matcher, range).await?;
        Ok(top_k(limit, sums))
    }

    /// Summed weight per value of `label`, restricted to values matching
    /// `pattern` in full
    pub async fn get_entries(
        &self,
        label: &str,
        pattern: &str,
        range: TimeRange,
    ) -> Result<HashMap<String, f64>, Error> {
        let matcher = LabelMatcher::regex(label, pattern)?;
        Ok(self.entries(&matcher, range).await?)
    }

    /// [`get_entries`](Self::get_entries) ranked by descending weight
    ///
    /// Ties are ordered by label value. `limit = 0` means unlimited.
    pub async fn top_entries(
        &self,
        label: &str,
        pattern: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RankedEntry>, Error> {
        let matcher = LabelMatcher::regex(label, pattern)?;
        Ok(self.top(&matcher, range, limit).await?)
    }

    /// Build the traffic summary for `[since, until]`
    pub async fn build_stats_summary(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<StatsSummary, StoreError> {
        let range = TimeRange::between(since, until)?;

        let top_sections = self
            .top(&LabelMatcher::any(SECTION_LABEL), range, SUMMARY_TOP_LIMIT)
            .await?;
        let top_users = self
            .top(&LabelMatcher::any(USER_LABEL), range, SUMMARY_TOP_LIMIT)
            .await?;
        let request_methods = self.top(&LabelMatcher::any(METHOD_LABEL), range, 0).await?;
        let request_statuses = self.top(&LabelMatcher::any(STATUS_LABEL), range, 0).await?;

        Ok(StatsSummary {
            since,
            until,
            top_sections,
            top_users,
            request_methods,
            request_statuses,
        })
    }
}
