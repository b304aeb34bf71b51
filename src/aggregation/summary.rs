//! Periodic traffic summary

use std::fmt;

use chrono::{DateTime, Utc};

use super::functions::RankedEntry;

/// Number of sections and users listed in a summary
pub const SUMMARY_TOP_LIMIT: usize = 3;

const RULE: &str = "------------------------------------------------------------------------";

/// Request counts per status class
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusBreakdown {
    /// Every request in the window
    pub total: f64,
    /// 2xx
    pub successful: f64,
    /// 3xx
    pub redirections: f64,
    /// 4xx
    pub client_errors: f64,
    /// 5xx and above
    pub server_errors: f64,
}

impl StatusBreakdown {
    /// Classify ranked status entries
    ///
    /// Status values are compared as strings against the class bounds. For
    /// three-digit codes this orders exactly like the numeric comparison.
    /// Entries outside every class (the `0` of a `-` status) still count
    /// towards the total.
    pub fn from_statuses(statuses: &[RankedEntry]) -> Self {
        let mut breakdown = Self::default();

        for entry in statuses {
            let status = entry.value.as_str();
            breakdown.total += entry.weight;

            if ("200".."300").contains(&status) {
                breakdown.successful += entry.weight;
            } else if ("300".."400").contains(&status) {
                breakdown.redirections += entry.weight;
            } else if ("400".."500").contains(&status) {
                breakdown.client_errors += entry.weight;
            } else if status >= "500" {
                breakdown.server_errors += entry.weight;
            }
        }

        breakdown
    }
}

/// Traffic statistics for one reporting window
///
/// Built fresh on every reporting tick; nothing is carried over between
/// windows.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    /// Window start (inclusive)
    pub since: DateTime<Utc>,
    /// Window end (inclusive)
    pub until: DateTime<Utc>,
    /// Busiest sections, at most [`SUMMARY_TOP_LIMIT`]
    pub top_sections: Vec<RankedEntry>,
    /// Busiest users, at most [`SUMMARY_TOP_LIMIT`]
    pub top_users: Vec<RankedEntry>,
    /// Every request method seen, ranked
    pub request_methods: Vec<RankedEntry>,
    /// Every status seen, ranked
    pub request_statuses: Vec<RankedEntry>,
}

impl StatsSummary {
    /// Counts per status class
    pub fn status_breakdown(&self) -> StatusBreakdown {
        StatusBreakdown::from_statuses(&self.request_statuses)
    }

    /// Total requests in the window
    pub fn total_requests(&self) -> f64 {
        self.status_breakdown().total
    }
}

struct EntryList<'a>(&'a [RankedEntry]);

impl fmt::Display for EntryList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "none");
        }
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ({})", entry.value, entry.weight)?;
        }
        Ok(())
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.status_breakdown();

        writeln!(f, "{}", RULE)?;
        writeln!(
            f,
            "Traffic stats between [{}, {}]:",
            self.since.format("%Y-%m-%d %H:%M:%S %Z"),
            self.until.format("%Y-%m-%d %H:%M:%S %Z")
        )?;
        writeln!(
            f,
            "- From a total of {} requests, there were {} successful calls, {} redirections, \
             {} client errors and {} server errors",
            b.total, b.successful, b.redirections, b.client_errors, b.server_errors
        )?;
        writeln!(f, "- Requests by method: {}", EntryList(&self.request_methods))?;
        writeln!(
            f,
            "- Top {} sections: {}",
            SUMMARY_TOP_LIMIT,
            EntryList(&self.top_sections)
        )?;
        writeln!(
            f,
            "- Top {} users: {}",
            SUMMARY_TOP_LIMIT,
            EntryList(&self.top_users)
        )?;
        write!(f, "{}", RULE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn statuses(pairs: &[(&str, f64)]) -> Vec<RankedEntry> {
        pairs.iter().map(|(v, w)| RankedEntry::new(*v, *w)).collect()
    }

    #[test]
    fn test_status_breakdown() {
        let b = StatusBreakdown::from_statuses(&statuses(&[
            ("200", 5.0),
            ("204", 1.0),
            ("301", 2.0),
            ("404", 3.0),
            ("500", 1.0),
            ("503", 1.0),
            ("0", 4.0),
        ]));

        assert_eq!(b.total, 17.0);
        assert_eq!(b.successful, 6.0);
        assert_eq!(b.redirections, 2.0);
        assert_eq!(b.client_errors, 3.0);
        assert_eq!(b.server_errors, 2.0);
    }

    #[test]
    fn test_status_class_bounds() {
        let b = StatusBreakdown::from_statuses(&statuses(&[
            ("199", 1.0),
            ("299", 1.0),
            ("300", 1.0),
            ("399", 1.0),
            ("400", 1.0),
            ("499", 1.0),
        ]));

        assert_eq!(b.successful, 1.0);
        assert_eq!(b.redirections, 2.0);
        assert_eq!(b.client_errors, 2.0);
        assert_eq!(b.server_errors, 0.0);
        assert_eq!(b.total, 6.0);
    }

    #[test]
    fn test_display_block() {
        let since = Utc.with_ymd_and_hms(2018, 5, 9, 16, 0, 0).unwrap();
        let summary = StatsSummary {
            since,
            until: since + chrono::Duration::seconds(10),
            top_sections: statuses(&[("/api", 3.0), ("/report", 1.0)]),
            top_users: vec![],
            request_methods: statuses(&[("GET", 3.0), ("POST", 1.0)]),
            request_statuses: statuses(&[("200", 3.0), ("404", 1.0)]),
        };

        let text = summary.to_string();
        assert!(text.contains("Traffic stats between [2018-05-09 16:00:00 UTC, 2018-05-09 16:00:10 UTC]"));
        assert!(text.contains("From a total of 4 requests, there were 3 successful calls, 0 redirections, 1 client errors and 0 server errors"));
        assert!(text.contains("- Requests by method: GET (3), POST (1)"));
        assert!(text.contains("- Top 3 sections: /api (3), /report (1)"));
        assert!(text.contains("- Top 3 users: none"));
        assert_eq!(summary.total_requests(), 4.0);
    }
}
