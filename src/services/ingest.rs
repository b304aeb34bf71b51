//! Ingestion Service
//!
//! Reads lines from the source, parses them and appends one point per
//! request to the store:
//! - Parse errors are logged and the line is skipped
//! - Store errors and source I/O errors stop the service
//! - Entries without a timestamp are stored at ingestion time

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};

use crate::engine::TimeSeriesStore;
use crate::ingestion::{AccessLogParser, LineSource};
use crate::metrics;

use super::framework::{wait_for_shutdown, Service, ServiceError, ServiceStatus};

/// Weight of one request
const REQUEST_WEIGHT: f64 = 1.0;

/// Counters kept by the ingestion service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    /// Lines parsed and stored
    pub lines_ingested: u64,
    /// Lines that failed to parse
    pub lines_rejected: u64,
}

/// Service feeding the store from a line source
pub struct IngestionService {
    source: Mutex<Box<dyn LineSource>>,
    parser: AccessLogParser,
    store: Arc<dyn TimeSeriesStore>,
    status: RwLock<ServiceStatus>,
    lines_ingested: AtomicU64,
    lines_rejected: AtomicU64,
}

impl IngestionService {
    /// Create the service
    pub fn new(
        source: Box<dyn LineSource>,
        parser: AccessLogParser,
        store: Arc<dyn TimeSeriesStore>,
    ) -> Self {
        Self {
            source: Mutex::new(source),
            parser,
            store,
            status: RwLock::new(ServiceStatus::Starting),
            lines_ingested: AtomicU64::new(0),
            lines_rejected: AtomicU64::new(0),
        }
    }

    /// Current counters
    pub fn stats(&self) -> IngestionStats {
        IngestionStats {
            lines_ingested: self.lines_ingested.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
        }
    }

    /// Parse and store one line
    ///
    /// Only store failures are returned; a malformed line is counted and
    /// dropped.
    pub async fn ingest_line(&self, line: &str) -> Result<(), ServiceError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let entry = match self.parser.parse(line) {
            Ok(entry) => entry,
            Err(e) => {
                self.lines_rejected.fetch_add(1, Ordering::Relaxed);
                metrics::LINES_REJECTED.inc();
                tracing::warn!(error = %e, "Skipping malformed log line");
                return Ok(());
            },
        };

        let timestamp = entry.timestamp.unwrap_or_else(Utc::now).timestamp_millis();

        self.store
            .add(&entry.labels(), timestamp, REQUEST_WEIGHT)
            .await
            .inspect_err(|_| metrics::record_store_failure("add"))?;

        self.lines_ingested.fetch_add(1, Ordering::Relaxed);
        metrics::LINES_INGESTED.inc();
        Ok(())
    }

    fn fail(&self, error: ServiceError) -> Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Failed(error.to_string());
        Err(error)
    }
}

#[async_trait::async_trait]
impl Service for IngestionService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        let mut source = self.source.lock().await;

        *self.status.write() = ServiceStatus::Running;
        tracing::debug!(source = %source.describe(), "Ingestion service started");

        loop {
            tokio::select! {
                biased;

                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Ingestion service received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Ingestion service broadcast receiver lagged");
                        }
                    }
                }

                next = source.next_line() => {
                    match next {
                        Ok(Some(line)) => {
                            if let Err(e) = self.ingest_line(&line).await {
                                return self.fail(e);
                            }
                        }
                        Ok(None) => {
                            tracing::info!(source = %source.describe(), "Line source exhausted");
                            wait_for_shutdown(&mut shutdown).await;
                            break;
                        }
                        Err(e) => {
                            return self.fail(ServiceError::Source(format!(
                                "{}: {}",
                                source.describe(),
                                e
                            )));
                        }
                    }
                }
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::debug!(
            ingested = self.lines_ingested.load(Ordering::Relaxed),
            rejected = self.lines_rejected.load(Ordering::Relaxed),
            "Ingestion service stopped"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "ingestion"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }
}
