//! Service Framework
//!
//! Runs the monitor's long-lived tasks under one shutdown signal:
//! - Service trait for implementing a task
//! - ServiceManager for spawning, stopping and collecting results
//! - Fail-fast: the first service error stops every sibling

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::StoreError;

// ============================================================================
// Service Trait
// ============================================================================

/// Trait for implementing long-running tasks
///
/// A service runs until the shutdown signal arrives and then returns
/// `Ok(())`. Returning an error stops every other service managed alongside
/// it.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Run the service until shutdown or failure
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError>;

    /// Service name for logging and identification
    fn name(&self) -> &str;

    /// Current status of the service
    fn status(&self) -> ServiceStatus;
}

/// Wait on a shutdown receiver, tolerating lag
///
/// Returns once the signal was received or every sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut broadcast::Receiver<()>) {
    loop {
        match shutdown.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Closed) => return,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(missed = n, "Shutdown receiver lagged");
            },
        }
    }
}

// ============================================================================
// Service Status
// ============================================================================

/// Status of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Registered, not running yet
    Starting,

    /// Service is running normally
    Running,

    /// Service has stopped
    Stopped,

    /// Service failed with an error
    Failed(String),
}

impl ServiceStatus {
    /// Check if the service is in a healthy state
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }

    /// Check if the service has stopped (normally or due to failure)
    pub fn is_stopped(&self) -> bool {
        matches!(self, ServiceStatus::Stopped | ServiceStatus::Failed(_))
    }
}

// ============================================================================
// Service Error
// ============================================================================

/// Errors that can occur in services
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// The shared store failed
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// The line source failed
    #[error("Line source failure: {0}")]
    Source(String),

    /// Attempted to start services that are already running
    #[error("Services already running")]
    AlreadyRunning,

    /// Attempted to start services after shutdown
    #[error("Services already stopped")]
    Stopped,

    /// Two services share a name
    #[error("Service already registered: {0}")]
    Duplicate(String),

    /// An internal error occurred in the service framework
    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Service Config
// ============================================================================

/// Configuration for the service manager
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time allowed for services to stop before they are aborted
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Failure Tracking
// ============================================================================

/// First error reported by any service, plus the wakeup for waiters
struct FailureState {
    first: Mutex<Option<(String, ServiceError)>>,
    notify: Notify,
}

impl FailureState {
    /// Record `error` unless an earlier one exists; returns true if recorded
    fn record(&self, service: &str, error: ServiceError) -> bool {
        let mut first = self.first.lock();
        if first.is_some() {
            return false;
        }
        *first = Some((service.to_string(), error));
        drop(first);

        self.notify.notify_waiters();
        true
    }

    fn get(&self) -> Option<(String, ServiceError)> {
        self.first.lock().clone()
    }
}

// ============================================================================
// Service Handle
// ============================================================================

/// Handle for a registered service
struct ServiceHandle {
    /// The service instance
    service: Arc<dyn Service>,

    /// Task handle for the running service
    task: Option<JoinHandle<Result<(), ServiceError>>>,

    /// Last start time
    started_at: Option<Instant>,
}

// ============================================================================
// Service Manager
// ============================================================================

/// Manager for running services under a shared shutdown signal
///
/// The ServiceManager handles:
/// - Spawning every registered service
/// - Broadcasting shutdown when any service fails
/// - Graceful shutdown with a configurable timeout
/// - Reporting the first failure
pub struct ServiceManager {
    /// Configuration
    config: ServiceConfig,

    /// Registered services, in registration order
    services: RwLock<Vec<(String, ServiceHandle)>>,

    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,

    /// First failure
    failure: Arc<FailureState>,

    /// Manager is running
    running: RwLock<bool>,
}

impl ServiceManager {
    /// Create a new service manager
    pub fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            services: RwLock::new(Vec::new()),
            shutdown_tx,
            failure: Arc::new(FailureState {
                first: Mutex::new(None),
                notify: Notify::new(),
            }),
            running: RwLock::new(false),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ServiceConfig::default())
    }

    /// Register a service with the manager
    pub fn register(&self, service: Arc<dyn Service>) -> Result<(), ServiceError> {
        let name = service.name().to_string();
        let mut services = self.services.write();

        if services.iter().any(|(n, _)| *n == name) {
            return Err(ServiceError::Duplicate(name));
        }

        tracing::debug!(service = %name, "Service registered");
        services.push((
            name,
            ServiceHandle {
                service,
                task: None,
                started_at: None,
            },
        ));
        Ok(())
    }

    /// Start all registered services
    ///
    /// Every shutdown receiver is subscribed before the first task is
    /// spawned, so an early failure reaches every service.
    pub fn start_all(&self) -> Result<(), ServiceError> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(ServiceError::AlreadyRunning);
            }
            *running = true;
        }

        let mut services = self.services.write();

        let receivers: Vec<broadcast::Receiver<()>> = services
            .iter()
            .map(|_| self.shutdown_tx.subscribe())
            .collect();

        for ((name, handle), shutdown_rx) in services.iter_mut().zip(receivers) {
            let service = handle.service.clone();
            let failure = self.failure.clone();
            let shutdown_tx = self.shutdown_tx.clone();
            let task_name = name.clone();

            let task = tokio::spawn(async move {
                let result = service.start(shutdown_rx).await;

                if let Err(ref e) = result {
                    tracing::error!(service = %task_name, error = %e, "Service failed, stopping siblings");
                    if failure.record(&task_name, e.clone()) {
                        let _ = shutdown_tx.send(());
                    }
                }
                result
            });

            handle.task = Some(task);
            handle.started_at = Some(Instant::now());
            tracing::debug!(service = %name, "Service started");
        }

        tracing::debug!(count = services.len(), "All services started");
        Ok(())
    }

    /// Resolve once any service has failed, returning that failure
    pub async fn wait_for_failure(&self) -> (String, ServiceError) {
        loop {
            let notified = self.failure.notify.notified();
            if let Some(failure) = self.failure.get() {
                return failure;
            }
            notified.await;
        }
    }

    /// First failure so far, if any
    pub fn first_failure(&self) -> Option<(String, ServiceError)> {
        self.failure.get()
    }

    /// Stop all services and wait for them to finish
    ///
    /// Returns the first error any service reported.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        tracing::info!("Initiating graceful shutdown");

        // Send shutdown signal
        let _ = self.shutdown_tx.send(());

        // Collect tasks to await (release lock before awaiting)
        let tasks: Vec<(String, JoinHandle<Result<(), ServiceError>>)> = {
            let mut services = self.services.write();
            services
                .iter_mut()
                .filter_map(|(name, handle)| handle.task.take().map(|task| (name.clone(), task)))
                .collect()
        };

        let deadline = Instant::now() + self.config.shutdown_timeout;

        for (name, mut task) in tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match tokio::time::timeout(remaining, &mut task).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(service = %name, "Service stopped gracefully");
                },
                Ok(Ok(Err(e))) => {
                    tracing::debug!(service = %name, error = %e, "Service stopped with error");
                },
                Ok(Err(e)) => {
                    tracing::error!(service = %name, error = %e, "Service task panicked");
                    self.failure
                        .record(&name, ServiceError::Internal(format!("task panicked: {}", e)));
                },
                Err(_) => {
                    tracing::warn!(service = %name, "Service shutdown timed out, aborting");
                    task.abort();
                },
            }
        }

        *self.running.write() = false;
        tracing::info!("Shutdown complete");

        match self.failure.get() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Get the status of all services
    pub fn status(&self) -> HashMap<String, ServiceStatus> {
        let services = self.services.read();
        services
            .iter()
            .map(|(name, handle)| (name.clone(), handle.service.status()))
            .collect()
    }

    /// Get the status of a specific service
    pub fn service_status(&self, name: &str) -> Option<ServiceStatus> {
        let services = self.services.read();
        services
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, h)| h.service.status())
    }

    /// Get the uptime of a specific service (time since start)
    pub fn service_uptime(&self, name: &str) -> Option<Duration> {
        let services = self.services.read();
        services
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, h)| h.started_at.map(|started| started.elapsed()))
    }

    /// Check if all services are healthy
    pub fn is_healthy(&self) -> bool {
        let services = self.services.read();
        services.iter().all(|(_, h)| h.service.status().is_healthy())
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
