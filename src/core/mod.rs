//! Core yield abstractions, configuration and observability

pub mod config;
pub mod error;
pub mod log;
pub mod metrics;
pub mod protocol;
pub mod yields;

// Re-export main types for cleaner imports
pub use error::FetchError;
pub use metrics::{FetchEvent, Metrics, MetricsSnapshot};
pub use protocol::{Protocol, ProtocolSettings, RepresentativePools};
pub use yields::{AggregateQuery, AggregateSource, FetchResult, Provenance, YieldRecord, YieldSource};
