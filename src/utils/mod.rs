//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, and timing.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` installation driven by [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: Thread-safe counters for frames, documents, replies and identifiers
//! - **Time**: Unix-seconds conversions used by identifier timestamps

pub mod logging;
pub mod metrics;
pub mod time;

pub use metrics::{global_metrics, WireMetrics};
