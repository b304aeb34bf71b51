//! Grouping and ranking helpers
//!
//! Pure functions over query results; the [`Aggregator`](super::Aggregator)
//! feeds them with series fetched from the store.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::engine::Series;

// ============================================================================
// Group By Label
// ============================================================================

/// Sum each series' points, then accumulate the sums per value of `label`
///
/// Several raw series sharing one label value collapse into a single entry.
/// Series without the label are ignored.
pub fn sum_by_label(series: &[Series], label: &str) -> HashMap<String, f64> {
    let mut sums: HashMap<String, f64> = HashMap::new();

    for s in series {
        let Some(value) = s.labels.get(label) else {
            continue;
        };
        *sums.entry(value.to_string()).or_insert(0.0) += s.total();
    }

    sums
}

// ============================================================================
// Ranking
// ============================================================================

/// One label value with its summed weight
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    /// Label value
    pub value: String,
    /// Summed weight
    pub weight: f64,
}

impl RankedEntry {
    /// Create a ranked entry
    pub fn new(value: impl Into<String>, weight: f64) -> Self {
        Self {
            value: value.into(),
            weight,
        }
    }
}

/// Ranking order: higher weight first, then label value ascending
///
/// `Greater` means "ranks before".
fn rank_order(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    a.weight
        .partial_cmp(&b.weight)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.value.cmp(&a.value))
}

/// Heap wrapper ordering entries so the worst-ranked one sits on top
struct Worst(RankedEntry);

impl PartialEq for Worst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Worst {}

impl PartialOrd for Worst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Worst {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_order(&other.0, &self.0)
    }
}

/// Rank entries by descending weight, ties broken by ascending label value
///
/// `limit = 0` returns every entry. NaN weights are skipped.
pub fn top_k<I>(limit: usize, entries: I) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let candidates: Vec<RankedEntry> = entries
        .into_iter()
        .filter(|(_, weight)| !weight.is_nan())
        .map(|(value, weight)| RankedEntry { value, weight })
        .collect();

    let mut result: Vec<RankedEntry> = if limit == 0 || limit >= candidates.len() {
        candidates
    } else {
        // Bounded heap keeps the best `limit` entries, worst on top
        let mut heap: BinaryHeap<Worst> = BinaryHeap::with_capacity(limit + 1);
        for entry in candidates {
            heap.push(Worst(entry));
            if heap.len() > limit {
                heap.pop();
            }
        }
        heap.into_iter().map(|w| w.0).collect()
    };

    result.sort_by(|a, b| rank_order(b, a));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataPoint, LabelSet};

    fn series(host: &str, user: &str, weights: &[f64]) -> Series {
        Series {
            labels: LabelSet::from_iter([("host", host), ("user", user)]),
            points: weights
                .iter()
                .enumerate()
                .map(|(i, w)| DataPoint::new(i as i64, *w))
                .collect(),
        }
    }

    fn entries(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(v, w)| (v.to_string(), *w)).collect()
    }

    #[test]
    fn test_sum_by_label_merges_series() {
        let data = vec![
            series("a", "x", &[1.0, 1.0]),
            series("a", "y", &[1.0]),
            series("b", "x", &[1.0]),
        ];

        let by_host = sum_by_label(&data, "host");
        assert_eq!(by_host.len(), 2);
        assert_eq!(by_host["a"], 3.0);
        assert_eq!(by_host["b"], 1.0);

        let by_user = sum_by_label(&data, "user");
        assert_eq!(by_user["x"], 3.0);
        assert_eq!(by_user["y"], 1.0);

        assert!(sum_by_label(&data, "missing").is_empty());
    }

    #[test]
    fn test_top_k_orders_descending() {
        let ranked = top_k(2, entries(&[("B", 1.0), ("A", 2.0), ("C", 0.5)]));
        assert_eq!(
            ranked,
            vec![RankedEntry::new("A", 2.0), RankedEntry::new("B", 1.0)]
        );
    }

    #[test]
    fn test_top_k_unlimited_and_oversized_limit() {
        let data = entries(&[("a", 1.0), ("b", 3.0), ("c", 2.0)]);

        let all = top_k(0, data.clone());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].value, "b");
        assert_eq!(all[2].value, "a");

        assert_eq!(top_k(10, data.clone()), all);
        assert_eq!(top_k(3, data.clone()), all);
        assert_eq!(top_k(usize::MAX, data.clone()), all);
        assert_eq!(top_k(1 << 40, data), all);
    }

    #[test]
    fn test_top_k_tie_break_is_lexicographic() {
        let data = entries(&[("zeta", 2.0), ("alpha", 2.0), ("mid", 2.0), ("low", 1.0)]);

        let ranked: Vec<String> = top_k(3, data.clone()).into_iter().map(|e| e.value).collect();
        assert_eq!(ranked, vec!["alpha", "mid", "zeta"]);

        let ranked: Vec<String> = top_k(0, data).into_iter().map(|e| e.value).collect();
        assert_eq!(ranked, vec!["alpha", "mid", "zeta", "low"]);
    }

    #[test]
    fn test_top_k_skips_nan() {
        let ranked = top_k(0, entries(&[("a", f64::NAN), ("b", 1.0)]));
        assert_eq!(ranked, vec![RankedEntry::new("b", 1.0)]);
    }

    #[test]
    fn test_top_k_empty() {
        assert!(top_k(3, Vec::new()).is_empty());
    }
}
