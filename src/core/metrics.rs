//! Fetch metrics collected from structured events.

use super::protocol::Protocol;
use super::yields::Provenance;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};

const RESPONSE_WINDOW: usize = 100;

const FALLBACK_RATE_LIMIT: f64 = 0.3;
const ERROR_RATE_LIMIT: f64 = 0.1;
const RESPONSE_TIME_LIMIT_MS: f64 = 3000.0;

/// A single observation handed to the metrics sink.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub level: Level,
    pub message: String,
    pub protocol: Protocol,
    /// Stage that produced the event, absent for adapter failures
    pub source: Option<Provenance>,
    pub response_time: Option<Duration>,
    pub error: Option<String>,
    /// True for the single event closing out a fetch
    pub completed: bool,
    pub apy: Option<f64>,
    /// Live sources that failed on the way to a completed result
    pub source_errors: usize,
}

impl FetchEvent {
    pub fn completed(
        protocol: Protocol,
        source: Provenance,
        apy: Option<f64>,
        response_time: Duration,
    ) -> Self {
        let level = match source {
            Provenance::Unavailable => Level::ERROR,
            Provenance::Stale => Level::WARN,
            Provenance::Cache => Level::DEBUG,
            _ => Level::INFO,
        };
        Self {
            level,
            message: format!("Fetched {protocol} from {source}"),
            protocol,
            source: Some(source),
            response_time: Some(response_time),
            error: None,
            completed: true,
            apy,
            source_errors: 0,
        }
    }

    pub fn with_source_errors(mut self, source_errors: usize) -> Self {
        self.source_errors = source_errors;
        self
    }

    pub fn source_failed(protocol: Protocol, source: &str, error: impl Into<String>) -> Self {
        Self {
            level: Level::WARN,
            message: format!("Source {source} failed for {protocol}"),
            protocol,
            source: None,
            response_time: None,
            error: Some(error.into()),
            completed: false,
            apy: None,
            source_errors: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub total_fetches: u64,
    pub cache_hit_rate: f64,
    pub fallback_rate: f64,
    pub error_rate: f64,
    pub null_apy_rate: f64,
    pub avg_response_ms: f64,
}

#[derive(Default)]
struct Counters {
    fetches: u64,
    cache_hits: u64,
    fallbacks: u64,
    errors: u64,
    null_apy: u64,
    response_ms: VecDeque<f64>,
}

/// Process-wide metrics sink. Every recorded event is also emitted to `tracing`.
#[derive(Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: FetchEvent) {
        emit(&event);

        // Adapter failures are logged only; they count through the fetch they belong to
        if !event.completed {
            return;
        }
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };

        counters.fetches += 1;
        if event.source_errors > 0 {
            counters.errors += 1;
        }
        if event.source == Some(Provenance::Cache) {
            counters.cache_hits += 1;
        }
        if event.source.is_some_and(|s| s.is_fallback()) {
            counters.fallbacks += 1;
        }
        if event.apy.is_none() {
            counters.null_apy += 1;
        }
        if let Some(elapsed) = event.response_time {
            counters.response_ms.push_back(elapsed.as_secs_f64() * 1000.0);
            if counters.response_ms.len() > RESPONSE_WINDOW {
                counters.response_ms.pop_front();
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let Ok(counters) = self.counters.lock() else {
            return MetricsSnapshot::default();
        };

        let rate = |count: u64| {
            if counters.fetches == 0 {
                0.0
            } else {
                count as f64 / counters.fetches as f64
            }
        };
        let avg_response_ms = if counters.response_ms.is_empty() {
            0.0
        } else {
            counters.response_ms.iter().sum::<f64>() / counters.response_ms.len() as f64
        };

        MetricsSnapshot {
            total_fetches: counters.fetches,
            cache_hit_rate: rate(counters.cache_hits),
            fallback_rate: rate(counters.fallbacks),
            error_rate: rate(counters.errors),
            null_apy_rate: rate(counters.null_apy),
            avg_response_ms,
        }
    }

    /// Returns a message per exceeded threshold and logs them as a warning.
    pub fn check_thresholds(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let mut warnings = Vec::new();

        if snapshot.fallback_rate > FALLBACK_RATE_LIMIT {
            warnings.push(format!(
                "High fallback rate: {:.2}%",
                snapshot.fallback_rate * 100.0
            ));
        }
        if snapshot.error_rate > ERROR_RATE_LIMIT {
            warnings.push(format!(
                "High error rate: {:.2}%",
                snapshot.error_rate * 100.0
            ));
        }
        if snapshot.avg_response_ms > RESPONSE_TIME_LIMIT_MS {
            warnings.push(format!(
                "Slow response time: {:.0}ms",
                snapshot.avg_response_ms
            ));
        }

        if !warnings.is_empty() {
            warn!(?warnings, "Threshold violations detected");
        }
        warnings
    }
}

fn emit(event: &FetchEvent) {
    let protocol = event.protocol.id();
    let source = event.source.map(|s| s.to_string());
    let response_time_ms = event.response_time.map(|d| d.as_millis() as u64);
    let error = event.error.as_deref();

    match event.level {
        Level::ERROR => {
            error!(protocol, ?source, ?response_time_ms, ?error, "{}", event.message)
        }
        Level::WARN => warn!(protocol, ?source, ?response_time_ms, ?error, "{}", event.message),
        Level::INFO => info!(protocol, ?source, ?response_time_ms, ?error, "{}", event.message),
        _ => debug!(protocol, ?source, ?response_time_ms, ?error, "{}", event.message),
    }
}
