//! Per-protocol fetching with an ordered fallback chain.

pub mod batch;
pub mod retry;
#[cfg(test)]
pub(crate) mod testing;

use crate::core::config::AppConfig;
use crate::core::{
    AggregateQuery, AggregateSource, FetchEvent, FetchResult, Metrics, Protocol,
    ProtocolSettings, Provenance, YieldSource,
};
use crate::providers;
use crate::store::YieldCache;
use retry::{RetryPolicy, with_backoff};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A stage evaluated after a fresh-cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Aggregate,
    StaleCache,
    Unavailable,
}

/// Order in which sources are consulted once the fresh cache misses.
pub const FALLBACK_CHAIN: [Stage; 4] = [
    Stage::Primary,
    Stage::Aggregate,
    Stage::StaleCache,
    Stage::Unavailable,
];

pub struct ProtocolFetcher {
    cache: Arc<YieldCache>,
    primary: HashMap<Protocol, Arc<dyn YieldSource>>,
    aggregate: Arc<dyn AggregateSource>,
    settings: HashMap<Protocol, ProtocolSettings>,
    metrics: Arc<Metrics>,
    default_policy: RetryPolicy,
}

impl ProtocolFetcher {
    pub fn new(
        cache: Arc<YieldCache>,
        primary: HashMap<Protocol, Arc<dyn YieldSource>>,
        aggregate: Arc<dyn AggregateSource>,
        settings: HashMap<Protocol, ProtocolSettings>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            primary,
            aggregate,
            settings,
            metrics,
            default_policy: RetryPolicy::single_attempt(DEFAULT_CALL_TIMEOUT),
        }
    }

    /// Wires the HTTP adapters described by `config` around a shared cache.
    pub fn from_config(config: &AppConfig, cache: Arc<YieldCache>, metrics: Arc<Metrics>) -> Self {
        let aggregate: Arc<dyn AggregateSource> =
            providers::aggregate_source(&config.providers, &config.aggregate);
        Self::new(
            cache,
            providers::primary_sources(&config.providers),
            aggregate,
            config.protocol_settings(),
            metrics,
        )
    }

    /// Policy used by [`fetch`](Self::fetch).
    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn settings(&self, protocol: Protocol) -> ProtocolSettings {
        self.settings
            .get(&protocol)
            .cloned()
            .unwrap_or_else(|| protocol.default_settings())
    }

    /// Fetches one protocol. Never fails: exhausting every source yields an
    /// `unavailable` result.
    pub async fn fetch(&self, protocol: Protocol) -> FetchResult {
        self.fetch_with(protocol, &self.default_policy).await
    }

    /// Like [`fetch`](Self::fetch), retrying each live source under `policy`.
    /// Cache reads are never retried.
    #[instrument(name = "ProtocolFetch", skip(self, policy), fields(protocol = %protocol))]
    pub async fn fetch_with(&self, protocol: Protocol, policy: &RetryPolicy) -> FetchResult {
        let started = Instant::now();

        let mut source_errors = 0;
        let result = match self.cache.get_fresh(&protocol).await {
            Some(cached) => cached.served_from_cache(Provenance::Cache),
            None => {
                let mut result = None;
                for stage in FALLBACK_CHAIN {
                    result = self
                        .run_stage(stage, protocol, policy, &mut source_errors)
                        .await;
                    if result.is_some() {
                        break;
                    }
                }
                result.unwrap_or_else(|| FetchResult::unavailable(protocol))
            }
        };

        self.metrics.record(
            FetchEvent::completed(protocol, result.provenance, result.apy, started.elapsed())
                .with_source_errors(source_errors),
        );
        result
    }

    async fn run_stage(
        &self,
        stage: Stage,
        protocol: Protocol,
        policy: &RetryPolicy,
        source_errors: &mut usize,
    ) -> Option<FetchResult> {
        let (source, outcome, provenance) = match stage {
            Stage::Primary => {
                let Some(source) = self.primary.get(&protocol) else {
                    debug!("No primary source for {}", protocol);
                    return None;
                };
                let policy = policy.covering(source.timeout());
                let outcome = with_backoff(|| source.fetch_yield(), &policy, source.name()).await;
                (source.name(), outcome, Provenance::Primary)
            }
            Stage::Aggregate => {
                let settings = self.settings(protocol);
                let query = AggregateQuery {
                    project: settings.project,
                    representative: settings.representative,
                };
                let name = self.aggregate.name();
                let policy = policy.covering(self.aggregate.timeout());
                let outcome =
                    with_backoff(|| self.aggregate.aggregate_yield(&query), &policy, name).await;
                (name, outcome, Provenance::Aggregate)
            }
            Stage::StaleCache => {
                let (cached, age) = self.cache.get_any(&protocol).await?;
                warn!("Using expired cache for {} (age {:?})", protocol, age);
                return Some(cached.served_from_cache(Provenance::Stale));
            }
            Stage::Unavailable => {
                warn!("All data sources failed for {}", protocol);
                return Some(FetchResult::unavailable(protocol));
            }
        };

        match outcome {
            Ok(apy) => {
                let result = FetchResult::live(protocol, apy, provenance);
                self.cache
                    .set(protocol, result.clone(), self.settings(protocol).ttl)
                    .await;
                Some(result)
            }
            Err(e) => {
                *source_errors += 1;
                self.metrics
                    .record(FetchEvent::source_failed(protocol, source, e.to_string()));
                None
            }
        }
    }

    /// Drops the cached value for `protocol`, or for every protocol.
    pub async fn clear_cache(&self, protocol: Option<Protocol>) {
        self.cache.clear(protocol.as_ref()).await;
        match protocol {
            Some(protocol) => info!("Cache cleared for {}", protocol),
            None => info!("All cache cleared"),
        }
    }
}
