use super::ProtocolFetcher;
use super::retry::RetryPolicy;
use crate::core::config::BatchConfig;
use crate::core::{FetchError, FetchResult, Protocol, Provenance};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

const SLOW_BATCH: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    pub max_concurrency: usize,
    pub per_call_timeout: Duration,
    pub retry_count: usize,
    pub retry_base_delay: Duration,
    pub retry_jitter: Duration,
    pub chunk_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            per_call_timeout: Duration::from_millis(config.per_call_timeout_ms),
            retry_count: config.retry_count,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            retry_jitter: Duration::from_millis(config.retry_jitter_ms),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
        }
    }
}

impl BatchOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retry_count,
            base_delay: self.retry_base_delay,
            max_jitter: self.retry_jitter,
            per_call_timeout: self.per_call_timeout,
        }
    }
}

/// Outcome for one requested id.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub outcome: Result<FetchResult, String>,
    pub cached: bool,
}

impl BatchEntry {
    fn error(message: String) -> Self {
        Self {
            outcome: Err(message),
            cached: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub entries: HashMap<String, BatchEntry>,
    pub timestamp: DateTime<Utc>,
}

impl BatchResult {
    pub fn successes(&self) -> usize {
        self.entries.values().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failures(&self) -> usize {
        self.entries.len() - self.successes()
    }
}

pub struct BatchFetcher {
    fetcher: Arc<ProtocolFetcher>,
    options: BatchOptions,
}

impl BatchFetcher {
    pub fn new(fetcher: Arc<ProtocolFetcher>, options: BatchOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn fetcher(&self) -> &Arc<ProtocolFetcher> {
        &self.fetcher
    }

    pub async fn fetch_batch(&self, ids: &[String]) -> BatchResult {
        self.fetch_batch_with_progress(ids, &|| {}).await
    }

    /// Fetches every id in chunks of `max_concurrency`, calling `on_done` as
    /// each id resolves. Per-id failures never fail the batch.
    #[instrument(name = "BatchFetch", skip(self, ids, on_done), fields(count = ids.len()))]
    pub async fn fetch_batch_with_progress(
        &self,
        ids: &[String],
        on_done: &(dyn Fn() + Sync),
    ) -> BatchResult {
        let started = Instant::now();
        let policy = self.options.retry_policy();
        let mut entries = HashMap::with_capacity(ids.len());

        let chunks: Vec<&[String]> = ids.chunks(self.options.max_concurrency.max(1)).collect();
        let last = chunks.len().saturating_sub(1);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let tasks = chunk.iter().map(|id| async move {
                let entry = self.fetch_entry(id, &policy).await;
                on_done();
                (id.clone(), entry)
            });
            entries.extend(join_all(tasks).await);

            if index < last && !self.options.chunk_delay.is_zero() {
                tokio::time::sleep(self.options.chunk_delay).await;
            }
        }

        let result = BatchResult {
            entries,
            timestamp: Utc::now(),
        };

        let elapsed = started.elapsed();
        info!(
            "Batch of {} done in {:?}: {} succeeded, {} failed",
            ids.len(),
            elapsed,
            result.successes(),
            result.failures()
        );
        if elapsed > SLOW_BATCH {
            warn!("Slow batch fetch: {:?}", elapsed);
        }
        result
    }

    async fn fetch_entry(&self, id: &str, policy: &RetryPolicy) -> BatchEntry {
        let protocol = match id.parse::<Protocol>() {
            Ok(protocol) => protocol,
            Err(e) => return BatchEntry::error(e.to_string()),
        };

        let result = self.fetcher.fetch_with(protocol, policy).await;
        if result.provenance == Provenance::Unavailable {
            return BatchEntry::error(format!(
                "No data from any source after {} attempts",
                policy.attempts()
            ));
        }
        BatchEntry {
            cached: result.from_cache,
            outcome: Ok(result),
        }
    }

    /// Typed variant of [`fetch_batch`](Self::fetch_batch). Failed ids come back as
    /// unavailable results.
    pub async fn fetch_multiple(&self, protocols: &[Protocol]) -> HashMap<Protocol, FetchResult> {
        let ids: Vec<String> = protocols.iter().map(|p| p.id().to_string()).collect();
        let batch = self.fetch_batch(&ids).await;

        protocols
            .iter()
            .map(|protocol| {
                let result = batch
                    .entries
                    .get(protocol.id())
                    .and_then(|entry| entry.outcome.clone().ok())
                    .unwrap_or_else(|| FetchResult::unavailable(*protocol));
                (*protocol, result)
            })
            .collect()
    }
}

/// Parses ids up front, collecting every unknown one.
pub fn parse_ids(ids: &[String]) -> Result<Vec<Protocol>, FetchError> {
    let mut protocols = Vec::with_capacity(ids.len());
    let mut unknown = Vec::new();
    for id in ids {
        match id.parse::<Protocol>() {
            Ok(p) => protocols.push(p),
            Err(_) => unknown.push(id.clone()),
        }
    }
    if unknown.is_empty() {
        Ok(protocols)
    } else {
        Err(FetchError::UnknownProtocol(unknown))
    }
}
