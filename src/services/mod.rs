//! Long-running services of the monitor
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────┐
//!                     │  ServiceManager  │── shutdown (broadcast) ──┐
//!                     └──────────────────┘                          │
//!          ┌──────────────────┼──────────────────┐                  │
//!          ▼                  ▼                  ▼                  │
//! ┌─────────────────┐ ┌───────────────┐ ┌──────────────────┐        │
//! │ IngestionService│ │ReporterService│ │ AlertService × N │◀───────┘
//! └────────┬────────┘ └───────┬───────┘ └────────┬─────────┘
//!          │ add              │ query            │ query
//!          ▼                  ▼                  ▼
//!     ┌──────────────────────────────────────────────┐
//!     │               TimeSeriesStore                │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! Services never talk to each other; they share only the store and the
//! shutdown signal. The first service to fail triggers shutdown for all.
//!
//! # Example
//!
//! ```rust
//! use kuba_logmon::services::{ServiceConfig, ServiceManager};
//!
//! let manager = ServiceManager::new(ServiceConfig::default());
//! assert!(manager.is_empty());
//! ```

pub mod alert;
pub mod framework;
pub mod ingest;
pub mod reporter;

pub use alert::AlertService;
pub use framework::{
    wait_for_shutdown, Service, ServiceConfig, ServiceError, ServiceManager, ServiceStatus,
};
pub use ingest::{IngestionService, IngestionStats};
pub use reporter::{ReporterService, DEFAULT_STATS_INTERVAL};
