//! Ingestion: raw lines in, parsed entries out
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐    ┌──────────────────┐
//! │  LineSource  │───▶│ AccessLogParser │───▶│ TimeSeriesStore  │
//! │ (file/chan)  │    │  (per line)     │    │  add(labels, ts) │
//! └──────────────┘    └────────────────┘    └──────────────────┘
//!                            │
//!                            ▼
//!                     ParseError: logged,
//!                     line skipped
//! ```
//!
//! The loop that drives this lives in
//! [`IngestionService`](crate::services::IngestionService).

pub mod parser;
pub mod source;

pub use parser::{
    parse_any_timestamp, parse_timestamp, AccessLogParser, ParserConfig, CLF_TIMESTAMP_FORMAT,
};
pub use source::{ChannelLineSource, FileTailer, LineSource, TailerConfig};
