//! In-memory time-series store
//!
//! Series are keyed by their full label set. Each label name/value pair has
//! a postings list of the series carrying it, so exact matchers are a map
//! lookup and regex matchers only scan the distinct values of one label.
//!
//! ```text
//! postings: "host" ─┬─ "10.0.0.1" → [0, 3]
//!                   └─ "10.0.0.2" → [1]
//!           "method" ─ "GET"      → [0, 1, 3]
//!
//! series:   0 → {host=10.0.0.1, method=GET, ...} [(t, 1.0), (t+5, 1.0)]
//! ```
//!
//! A single `RwLock` guards the whole state: appends take it exclusively,
//! queries share it. It is never held across an `.await`.
//!
//! Retention is measured from the newest appended timestamp, capped at the
//! wall clock so a future-dated line cannot push the cutoff ahead of real
//! traffic. Series left without points after pruning are removed and the
//! postings are rebuilt.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::traits::{LabelMatcher, MatchMode, Series, StoreStats, TimeSeriesStore};
use crate::error::StoreError;
use crate::metrics;
use crate::types::{DataPoint, LabelSet, TimeRange};

/// Default retention: one hour behind the newest point (at most now)
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Minimum advance of the retention cutoff before old points are pruned
const PRUNE_STEP_MS: i64 = 1_000;

/// Configuration for [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Points older than the newest timestamp minus this are dropped.
    /// The newest timestamp never runs ahead of the wall clock.
    /// `None` keeps everything.
    pub retention: Option<Duration>,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            retention: Some(DEFAULT_RETENTION),
        }
    }
}

struct StoredSeries {
    labels: LabelSet,
    /// Sorted by timestamp, equal timestamps in append order
    points: Vec<DataPoint>,
}

#[derive(Default)]
struct Inner {
    series: Vec<StoredSeries>,
    ids: HashMap<LabelSet, usize>,
    postings: HashMap<String, BTreeMap<String, Vec<usize>>>,
    point_count: usize,
    points_expired: u64,
    newest: Option<i64>,
    pruned_up_to: i64,
    closed: bool,
}

impl Inner {
    fn series_id(&mut self, labels: &LabelSet) -> usize {
        if let Some(&id) = self.ids.get(labels) {
            return id;
        }

        let id = self.series.len();
        for (name, value) in labels.iter() {
            self.postings
                .entry(name.to_string())
                .or_default()
                .entry(value.to_string())
                .or_default()
                .push(id);
        }
        self.series.push(StoredSeries {
            labels: labels.clone(),
            points: Vec::new(),
        });
        self.ids.insert(labels.clone(), id);
        id
    }

    fn matching_ids(&self, matcher: &LabelMatcher) -> Vec<usize> {
        let Some(values) = self.postings.get(matcher.name()) else {
            return Vec::new();
        };

        let mut ids: Vec<usize> = match matcher.mode() {
            MatchMode::Exact(value) => values.get(value).cloned().unwrap_or_default(),
            MatchMode::Regex(regex) => values
                .iter()
                .filter(|(value, _)| regex.is_match(value))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect(),
            MatchMode::Any => values.values().flatten().copied().collect(),
        };
        ids.sort_unstable();
        ids
    }

    fn prune(&mut self, cutoff: i64) {
        let mut dropped = 0usize;
        let mut emptied = false;
        for series in &mut self.series {
            let keep_from = series.points.partition_point(|p| p.timestamp < cutoff);
            if keep_from > 0 {
                series.points.drain(..keep_from);
                dropped += keep_from;
                emptied |= series.points.is_empty();
            }
        }
        self.point_count -= dropped;
        self.points_expired += dropped as u64;
        self.pruned_up_to = cutoff;
        metrics::record_points_expired(dropped as u64);

        if emptied {
            self.compact();
        }
    }

    /// Drop empty series and renumber the rest, rebuilding ids and postings
    fn compact(&mut self) {
        let before = self.series.len();
        self.series.retain(|s| !s.points.is_empty());
        self.ids.clear();
        self.postings.clear();

        for (id, stored) in self.series.iter().enumerate() {
            for (name, value) in stored.labels.iter() {
                self.postings
                    .entry(name.to_string())
                    .or_default()
                    .entry(value.to_string())
                    .or_default()
                    .push(id);
            }
            self.ids.insert(stored.labels.clone(), id);
        }

        tracing::trace!(
            removed = before - self.series.len(),
            series = self.series.len(),
            "Compacted expired series"
        );
    }
}

/// In-memory [`TimeSeriesStore`]
///
/// # Example
///
/// ```rust
/// use kuba_logmon::engine::{LabelMatcher, MemoryStore, TimeSeriesStore};
/// use kuba_logmon::types::{LabelSet, TimeRange};
///
/// # tokio_test_block(async {
/// let store = MemoryStore::new();
/// let labels = LabelSet::from_iter([("host", "a")]);
/// store.add(&labels, 1_000, 1.0).await.unwrap();
///
/// let series = store
///     .query(TimeRange::new(0, 2_000).unwrap(), &LabelMatcher::exact("host", "a"))
///     .await
///     .unwrap();
/// assert_eq!(series.len(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub struct MemoryStore {
    config: MemoryStoreConfig,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a store with default configuration
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create a store with custom configuration
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                pruned_up_to: i64::MIN,
                ..Inner::default()
            }),
        }
    }

    fn retention_ms(&self) -> Option<i64> {
        self.config
            .retention
            .map(|r| i64::try_from(r.as_millis()).unwrap_or(i64::MAX))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    fn store_id(&self) -> &str {
        "in-memory-v1"
    }

    async fn add(&self, labels: &LabelSet, timestamp: i64, value: f64) -> Result<(), StoreError> {
        if !value.is_finite() {
            return Err(StoreError::AppendRejected(format!(
                "non-finite value {} for {}",
                value, labels
            )));
        }

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(StoreError::Closed);
        }

        let bounded = timestamp.min(Utc::now().timestamp_millis());
        let newest = inner.newest.map_or(bounded, |n| n.max(bounded));
        inner.newest = Some(newest);

        if let Some(retention) = self.retention_ms() {
            let cutoff = newest.saturating_sub(retention);
            if timestamp < cutoff {
                inner.points_expired += 1;
                metrics::record_points_expired(1);
                tracing::warn!(
                    timestamp,
                    cutoff,
                    labels = %labels,
                    "Dropped append behind the retention cutoff"
                );
                return Ok(());
            }
            if cutoff.saturating_sub(inner.pruned_up_to) >= PRUNE_STEP_MS {
                inner.prune(cutoff);
            }
        }

        let id = inner.series_id(labels);
        let points = &mut inner.series[id].points;
        let at = points.partition_point(|p| p.timestamp <= timestamp);
        points.insert(at, DataPoint::new(timestamp, value));
        inner.point_count += 1;

        Ok(())
    }

    async fn query(
        &self,
        range: TimeRange,
        matcher: &LabelMatcher,
    ) -> Result<Vec<Series>, StoreError> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(StoreError::Closed);
        }

        let result = inner
            .matching_ids(matcher)
            .into_iter()
            .filter_map(|id| {
                let stored = &inner.series[id];
                let lo = stored.points.partition_point(|p| p.timestamp < range.start);
                let hi = stored.points.partition_point(|p| p.timestamp <= range.end);
                (lo < hi).then(|| Series {
                    labels: stored.labels.clone(),
                    points: stored.points[lo..hi].to_vec(),
                })
            })
            .collect();

        Ok(result)
    }

    async fn cleanup(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(StoreError::Closed);
        }

        let series_count = inner.series.len();
        let point_count = inner.point_count;
        let points_expired = inner.points_expired;
        *inner = Inner {
            points_expired,
            closed: true,
            ..Inner::default()
        };

        tracing::debug!(
            series = series_count,
            points = point_count,
            "In-memory store cleaned up"
        );
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            series_count: inner.series.len(),
            point_count: inner.point_count,
            points_expired: inner.points_expired,
            closed: inner.closed,
        }
    }
}
