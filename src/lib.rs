//! Kuba Logmon - HTTP access-log monitor built on a label-indexed time-series store
//!
//! This library provides:
//! - A tolerant Common Log Format parser with fallback timestamp layouts
//! - A pluggable time-series store contract with an in-memory implementation
//! - Label grouping and top-K ranking over time windows
//! - Threshold alerts with OK/Critical hysteresis
//! - Fail-fast orchestration of ingestion, reporting and alerting services

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Access-log parsing and line sources
pub mod ingestion;

/// Label grouping, top-K ranking and traffic summaries
pub mod aggregation;

/// Threshold alert evaluation
pub mod alerting;

/// Background services and their lifecycle management
/// Provides fail-fast supervision under a single shutdown signal
pub mod services;

/// Pipeline orchestration
pub mod monitor;

// Re-export main types
pub use aggregation::{Aggregator, RankedEntry, StatsSummary};
pub use alerting::{AlertConfig, AlertEngine, AlertEvent, AlertState};
pub use engine::{LabelMatcher, MemoryStore, TimeSeriesStore};
pub use error::{Error, Result};
pub use ingestion::AccessLogParser;
pub use monitor::{EventSink, Monitor, MonitorConfig, MonitorEvent};
pub use types::{LabelSet, LogEntry, TimeRange};
