//! Threshold alerts over sliding windows
//!
//! Each [`AlertEngine`] watches the request rate of the series whose
//! `label` matches `pattern`. The rate is the summed weight in the trailing
//! window divided by the window length in seconds.
//!
//! ```text
//!            average >= threshold
//!     ┌────┐ ───────────────────▶ ┌──────────┐
//!     │ OK │                      │ Critical │
//!     └────┘ ◀─────────────────── └──────────┘
//!            average < threshold
//! ```
//!
//! Events are emitted only on a transition. Staying in a state, however
//! far above or below the threshold, is silent.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregation::Aggregator;
use crate::engine::LabelMatcher;
use crate::error::{ConfigError, StoreError};
use crate::metrics;
use crate::types::{is_known_label, TimeRange};

// ============================================================================
// Configuration
// ============================================================================

/// Definition of one alert
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Unique alert name
    pub name: String,
    /// Time between evaluations
    pub check_interval: Duration,
    /// Length of the trailing window examined
    pub window: Duration,
    /// Requests per second at or above which the alert fires
    pub threshold: f64,
    /// Label the pattern applies to
    pub label: String,
    /// Regular expression over the full label value
    pub pattern: String,
}

impl AlertConfig {
    /// Check every field; the pattern is compiled as part of the check
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.matcher().map(|_| ())
    }

    /// Validate and build the label matcher
    fn matcher(&self) -> Result<LabelMatcher, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("alert.name", "must not be empty"));
        }

        let field = |f: &str| format!("alert '{}'.{}", self.name, f);

        if self.check_interval.is_zero() {
            return Err(ConfigError::invalid(field("check_interval"), "must be > 0"));
        }
        if self.window.is_zero() {
            return Err(ConfigError::invalid(field("window"), "must be > 0"));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::invalid(
                field("threshold"),
                format!("must be a finite, non-negative number, got {}", self.threshold),
            ));
        }
        if !is_known_label(&self.label) {
            return Err(ConfigError::UnknownLabel(self.label.clone()));
        }

        LabelMatcher::regex(self.label.as_str(), &self.pattern)
    }
}

// ============================================================================
// State and Events
// ============================================================================

/// Alert state, `Ok` initially
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertState {
    /// Below threshold
    #[default]
    Ok,
    /// At or above threshold
    Critical,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertState::Ok => write!(f, "OK"),
            AlertState::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Notification for a state transition
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    /// Alert name
    pub name: String,
    /// State entered
    pub state: AlertState,
    /// Requests per second over the window
    pub average: f64,
    /// Evaluation time
    pub at: DateTime<Utc>,
}

impl AlertEvent {
    /// True when the alert fired
    pub fn is_triggered(&self) -> bool {
        self.state == AlertState::Critical
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self.at.format("%Y-%m-%d %H:%M:%S %Z");
        match self.state {
            AlertState::Critical => write!(
                f,
                "[{}] {} - High traffic generated an alert - hits = {:.2}, triggered at {}",
                self.name, self.state, self.average, at
            ),
            AlertState::Ok => write!(
                f,
                "[{}] {} - The traffic returned back to normal - hits = {:.2}, at {}",
                self.name, self.state, self.average, at
            ),
        }
    }
}

// ============================================================================
// Alert Engine
// ============================================================================

/// Evaluates one alert against the store
pub struct AlertEngine {
    config: AlertConfig,
    matcher: LabelMatcher,
    aggregator: Aggregator,
    state: AlertState,
}

impl AlertEngine {
    /// Create an engine in the `Ok` state
    ///
    /// Fails if the configuration is invalid or the pattern does not compile.
    pub fn new(config: AlertConfig, aggregator: Aggregator) -> Result<Self, ConfigError> {
        let matcher = config.matcher()?;
        Ok(Self {
            config,
            matcher,
            aggregator,
            state: AlertState::Ok,
        })
    }

    /// Alert definition
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Alert name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state
    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Evaluate the window ending at `now`
    ///
    /// Returns an event only when the state changes. On a store error the
    /// state is left untouched.
    pub async fn check_status(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertEvent>, StoreError> {
        let since = chrono::Duration::from_std(self.config.window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let range = TimeRange::between(since, now)?;

        let hits = self.aggregator.entries(&self.matcher, range).await?;
        let total: f64 = hits.values().sum();
        let average = total / self.config.window.as_secs_f64();

        let next = match self.state {
            AlertState::Ok if average >= self.config.threshold => AlertState::Critical,
            AlertState::Critical if average < self.config.threshold => AlertState::Ok,
            _ => {
                tracing::trace!(alert = %self.config.name, average, state = %self.state, "Alert unchanged");
                return Ok(None);
            },
        };

        self.state = next;
        metrics::record_alert_transition(
            &self.config.name,
            &next.to_string(),
            next == AlertState::Critical,
        );
        tracing::debug!(
            alert = %self.config.name,
            state = %next,
            average,
            threshold = self.config.threshold,
            "Alert state changed"
        );

        Ok(Some(AlertEvent {
            name: self.config.name.clone(),
            state: next,
            average,
            at: now,
        }))
    }
}
