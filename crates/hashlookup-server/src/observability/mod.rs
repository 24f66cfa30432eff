//! Observability Module
//!
//! - `metrics`: Prometheus counters and histograms for requests, discovery and
//!   membership changes
//! - `events`: structured events with a consistent `event_type` field
//! - `tracing`: log subscriber setup with optional OTLP export

pub mod events;
pub mod metrics;
pub mod tracing;

pub use metrics::init_metrics;
pub use tracing::{init_tracing, shutdown_tracing, LogFormat, TracingConfig};
