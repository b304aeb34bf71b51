//! Alert Service
//!
//! Drives one [`AlertEngine`] on its own check interval.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::alerting::{AlertEngine, AlertState};
use crate::monitor::{EventSink, MonitorEvent};

use super::framework::{Service, ServiceError, ServiceStatus};

/// Service evaluating one alert
pub struct AlertService {
    name: String,
    engine: Mutex<AlertEngine>,
    sink: Arc<dyn EventSink>,
    status: RwLock<ServiceStatus>,
}

impl AlertService {
    /// Create the service; it is named `alert:<alert name>`
    pub fn new(engine: AlertEngine, sink: Arc<dyn EventSink>) -> Self {
        Self {
            name: format!("alert:{}", engine.name()),
            engine: Mutex::new(engine),
            sink,
            status: RwLock::new(ServiceStatus::Starting),
        }
    }

    /// Current state of the alert
    pub async fn alert_state(&self) -> AlertState {
        self.engine.lock().await.state()
    }
}

#[async_trait::async_trait]
impl Service for AlertService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        let mut engine = self.engine.lock().await;
        let period = engine.config().check_interval;

        *self.status.write() = ServiceStatus::Running;
        tracing::debug!(
            alert = %engine.name(),
            interval = ?period,
            window = ?engine.config().window,
            threshold = engine.config().threshold,
            "Alert service started"
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!(alert = %engine.name(), "Alert service received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Alert service broadcast receiver lagged");
                        }
                    }
                }

                _ = ticker.tick() => {
                    match engine.check_status(Utc::now()).await {
                        Ok(Some(event)) => {
                            tracing::info!(
                                alert = %event.name,
                                state = %event.state,
                                average = event.average,
                                "Alert state changed"
                            );
                            self.sink.emit(MonitorEvent::Alert(event));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            *self.status.write() = ServiceStatus::Failed(e.to_string());
                            return Err(e.into());
                        }
                    }
                }
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::debug!(alert = %engine.name(), "Alert service stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }
}
