//! Pipeline orchestration
//!
//! [`Monitor`] wires a line source, the parser, the store and the alert
//! engines into services and runs them under one shutdown signal.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──▶ start() ──▶ [running] ──▶ stop() ──▶ [stopped]
//!                           │            ▲
//!                           │ failure    │
//!                           └────────────┘
//!                     wait_for_failure()
//! ```
//!
//! `stop()` signals shutdown, waits for every service, cleans up the store
//! and returns the first service failure (if any). Later calls are no-ops.
//! A stopped monitor cannot be started again.
//!
//! # Example
//!
//! ```rust,ignore
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let monitor = Monitor::new(MonitorConfig::default(), store, Box::new(source), Arc::new(events_tx))?;
//! monitor.start()?;
//!
//! tokio::select! {
//!     _ = tokio::signal::ctrl_c() => {}
//!     _ = monitor.wait_for_failure() => {}
//! }
//! monitor.stop().await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::aggregation::{Aggregator, StatsSummary};
use crate::alerting::{AlertConfig, AlertEngine, AlertEvent};
use crate::engine::TimeSeriesStore;
use crate::error::{ConfigError, Error, Result};
use crate::ingestion::{AccessLogParser, LineSource, ParserConfig};
use crate::metrics;
use crate::services::{
    AlertService, IngestionService, ReporterService, ServiceConfig, ServiceError, ServiceManager,
    ServiceStatus, DEFAULT_STATS_INTERVAL,
};

// ============================================================================
// Events
// ============================================================================

/// Output of the running pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Periodic traffic summary
    Stats(StatsSummary),
    /// Alert state transition
    Alert(AlertEvent),
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::Stats(summary) => write!(f, "{}", summary),
            MonitorEvent::Alert(event) => write!(f, "{}", event),
        }
    }
}

/// Receiver of pipeline events
///
/// Called from service tasks; implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event
    fn emit(&self, event: MonitorEvent);
}

impl EventSink for mpsc::UnboundedSender<MonitorEvent> {
    fn emit(&self, event: MonitorEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding event");
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Runtime configuration of a [`Monitor`]
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval (and window) of the traffic summary
    pub stats_interval: Duration,
    /// Alerts to evaluate
    pub alerts: Vec<AlertConfig>,
    /// Parser limits
    pub parser: ParserConfig,
    /// Service manager settings
    pub services: ServiceConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stats_interval: DEFAULT_STATS_INTERVAL,
            alerts: Vec::new(),
            parser: ParserConfig::default(),
            services: ServiceConfig::default(),
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Ingestion, reporting and alerting pipeline
pub struct Monitor {
    manager: ServiceManager,
    store: Arc<dyn TimeSeriesStore>,
    ingestion: Arc<IngestionService>,
    alerts: Vec<Arc<AlertService>>,
    stopped: Mutex<bool>,
}

impl Monitor {
    /// Build the pipeline
    ///
    /// Every alert is validated and compiled here; nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn TimeSeriesStore>,
        source: Box<dyn LineSource>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if config.stats_interval.is_zero() {
            return Err(ConfigError::invalid("stats_interval", "must be > 0").into());
        }

        let mut names = HashSet::new();
        for alert in &config.alerts {
            if !names.insert(alert.name.as_str()) {
                return Err(ConfigError::DuplicateAlert(alert.name.clone()).into());
            }
        }

        let aggregator = Aggregator::new(store.clone());
        let engines = config
            .alerts
            .iter()
            .map(|alert| AlertEngine::new(alert.clone(), aggregator.clone()))
            .collect::<std::result::Result<Vec<_>, ConfigError>>()?;

        let manager = ServiceManager::new(config.services.clone());

        let ingestion = Arc::new(IngestionService::new(
            source,
            AccessLogParser::with_config(config.parser.clone()),
            store.clone(),
        ));
        manager.register(ingestion.clone())?;

        manager.register(Arc::new(ReporterService::new(
            aggregator,
            config.stats_interval,
            sink.clone(),
        )))?;

        let mut alerts = Vec::with_capacity(engines.len());
        for engine in engines {
            let service = Arc::new(AlertService::new(engine, sink.clone()));
            manager.register(service.clone())?;
            alerts.push(service);
        }

        tracing::debug!(
            store = store.store_id(),
            alerts = alerts.len(),
            stats_interval = ?config.stats_interval,
            "Monitor configured"
        );

        Ok(Self {
            manager,
            store,
            ingestion,
            alerts,
            stopped: Mutex::new(false),
        })
    }

    /// Spawn every service
    ///
    /// Fails with [`ServiceError::Stopped`] once `stop` has begun.
    pub fn start(&self) -> Result<()> {
        match self.stopped.try_lock() {
            Ok(stopped) if !*stopped => {},
            _ => return Err(Error::Service(ServiceError::Stopped)),
        }

        self.manager.start_all()?;
        tracing::info!(services = self.manager.len(), "Monitor started");
        Ok(())
    }

    /// Resolve once any service has failed, returning its error
    pub async fn wait_for_failure(&self) -> Error {
        let (service, error) = self.manager.wait_for_failure().await;
        tracing::error!(service = %service, error = %error, "Monitor service failed");
        service_error(error)
    }

    /// Stop every service, clean up the store and report the first failure
    ///
    /// Calling `stop` again after it completed returns `Ok(())`.
    pub async fn stop(&self) -> Result<()> {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            return Ok(());
        }

        let services = self.manager.shutdown().await;
        let cleanup = self.store.cleanup().await;
        *stopped = true;

        let ingestion = self.ingestion.stats();
        tracing::info!(
            ingested = ingestion.lines_ingested,
            rejected = ingestion.lines_rejected,
            "Monitor stopped"
        );

        services.map_err(service_error)?;
        cleanup.inspect_err(|_| metrics::record_store_failure("cleanup"))?;
        Ok(())
    }

    /// Status of every service by name
    pub fn status(&self) -> std::collections::HashMap<String, ServiceStatus> {
        self.manager.status()
    }

    /// Ingestion service (for its counters)
    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    /// Alert services in configuration order
    pub fn alerts(&self) -> &[Arc<AlertService>] {
        &self.alerts
    }
}

/// Map a service failure to the crate error, keeping store failures typed
fn service_error(error: ServiceError) -> Error {
    match error {
        ServiceError::Store(e) => Error::Store(e),
        ServiceError::Source(msg) => Error::Source(msg),
        other => Error::Service(other),
    }
}
