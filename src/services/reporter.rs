//! Reporting Service
//!
//! Every `interval`, builds a [`StatsSummary`](crate::aggregation::StatsSummary)
//! over the last `interval` and hands it to the event sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::aggregation::{Aggregator, StatsSummary};
use crate::error::StoreError;
use crate::metrics;
use crate::monitor::{EventSink, MonitorEvent};

use super::framework::{Service, ServiceError, ServiceStatus};

/// Default reporting interval
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Service emitting periodic traffic summaries
pub struct ReporterService {
    aggregator: Aggregator,
    interval: Duration,
    sink: Arc<dyn EventSink>,
    status: RwLock<ServiceStatus>,
}

impl ReporterService {
    /// Create the service
    pub fn new(aggregator: Aggregator, interval: Duration, sink: Arc<dyn EventSink>) -> Self {
        Self {
            aggregator,
            interval,
            sink,
            status: RwLock::new(ServiceStatus::Starting),
        }
    }

    /// Build the summary for the window ending now
    pub async fn report(&self) -> Result<StatsSummary, StoreError> {
        let until = Utc::now();
        let window = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
        let since = until - window;

        self.aggregator.build_stats_summary(since, until).await
    }
}

#[async_trait::async_trait]
impl Service for ReporterService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Running;
        tracing::debug!(interval = ?self.interval, "Reporting service started");

        // First report one full interval after start
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Reporting service received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Reporting service broadcast receiver lagged");
                        }
                    }
                }

                _ = ticker.tick() => {
                    match self.report().await {
                        Ok(summary) => {
                            metrics::STATS_REPORTS.inc();
                            tracing::info!(
                                requests = summary.total_requests(),
                                since = %summary.since,
                                until = %summary.until,
                                "Traffic summary"
                            );
                            self.sink.emit(MonitorEvent::Stats(summary));
                        }
                        Err(e) => {
                            *self.status.write() = ServiceStatus::Failed(e.to_string());
                            return Err(e.into());
                        }
                    }
                }
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::debug!("Reporting service stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "reporting"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryStore, TimeSeriesStore};
    use crate::types::LabelSet;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_report_covers_last_interval() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp_millis();
        let labels = LabelSet::from_iter([
            ("section", "/api"),
            ("user", "james"),
            ("method", "GET"),
            ("status", "200"),
        ]);
        store.add(&labels, now, 1.0).await.unwrap();
        store.add(&labels, now - 60_000, 1.0).await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let svc = ReporterService::new(
            Aggregator::new(store),
            Duration::from_secs(10),
            Arc::new(tx),
        );

        let summary = svc.report().await.unwrap();
        assert_eq!(summary.total_requests(), 1.0);
        assert_eq!(summary.top_sections[0].value, "/api");
        assert_eq!(summary.until - summary.since, chrono::Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_emits_on_tick_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let svc = Arc::new(ReporterService::new(
            Aggregator::new(store),
            Duration::from_millis(20),
            Arc::new(tx),
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let runner = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.start(shutdown_rx).await })
        };

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, MonitorEvent::Stats(ref s) if s.total_requests() == 0.0));

        shutdown_tx.send(()).unwrap();
        assert_eq!(runner.await.unwrap(), Ok(()));
        assert_eq!(svc.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_store_error_fails_service() {
        let store = Arc::new(MemoryStore::new());
        store.cleanup().await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let svc = ReporterService::new(
            Aggregator::new(store),
            Duration::from_millis(10),
            Arc::new(tx),
        );

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let result = tokio::time::timeout(Duration::from_secs(5), svc.start(shutdown_rx))
            .await
            .unwrap();
        assert_eq!(result, Err(ServiceError::Store(StoreError::Closed)));
    }
}
