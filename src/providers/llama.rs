//! DeFiLlama yields listing, used as the shared aggregate source.

use super::util::{get_json, or_none, round2, weighted_mean};
use crate::core::{
    AggregateQuery, AggregateSource, FetchError, RepresentativePools, YieldRecord,
};
use crate::store::CacheStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// How long a downloaded listing is reused before it is fetched again.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    status: Option<String>,
    #[serde(default)]
    data: Vec<LlamaPool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlamaPool {
    #[serde(default)]
    pool: String,
    #[serde(default)]
    project: String,
    #[serde(default)]
    symbol: String,
    tvl_usd: Option<f64>,
    apy_base: Option<f64>,
    apy_reward: Option<f64>,
    #[serde(default)]
    stablecoin: bool,
}

impl From<LlamaPool> for YieldRecord {
    fn from(pool: LlamaPool) -> Self {
        YieldRecord {
            protocol: pool.project,
            pool: pool.pool,
            symbol: pool.symbol,
            tvl_usd: pool.tvl_usd.filter(|t| t.is_finite()).unwrap_or(0.0).max(0.0),
            apy_base: pool.apy_base.filter(|r| r.is_finite()),
            apy_reward: pool.apy_reward.filter(|r| r.is_finite()),
            stablecoin: pool.stablecoin,
        }
    }
}

/// Filtering rules applied before averaging pool rates.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRules {
    pub min_tvl: f64,
    pub representative: Option<RepresentativePools>,
}

impl RepresentativePools {
    fn matches(&self, record: &YieldRecord) -> bool {
        if self.stablecoin && record.stablecoin {
            return true;
        }
        let symbol = record.symbol.to_lowercase();
        let pool = record.pool.to_lowercase();
        self.symbols.iter().any(|s| {
            let s = s.to_lowercase();
            symbol.contains(&s) || pool.contains(&s)
        })
    }
}

/// TVL-weighted mean base rate over the pools that pass `rules`.
///
/// A pool survives when its TVL reaches `min_tvl` and it reports a positive
/// base rate. Zero rates are treated as missing. When a representative subset
/// is configured and non-empty, only that subset is averaged.
pub fn aggregate(records: &[YieldRecord], rules: &AggregateRules) -> Option<f64> {
    let survivors: Vec<&YieldRecord> = records
        .iter()
        .filter(|r| r.tvl_usd >= rules.min_tvl)
        .filter(|r| r.apy_base.is_some_and(|rate| rate > 0.0))
        .collect();

    let selected: Vec<&YieldRecord> = match &rules.representative {
        Some(representative) => {
            let matching: Vec<&YieldRecord> = survivors
                .iter()
                .copied()
                .filter(|r| representative.matches(r))
                .collect();
            if matching.is_empty() {
                survivors
            } else {
                matching
            }
        }
        None => survivors,
    };

    debug!("Averaging {} of {} pools", selected.len(), records.len());

    weighted_mean(
        selected
            .iter()
            .filter_map(|r| r.apy_base.map(|rate| (rate, r.tvl_usd))),
    )
    .map(round2)
}

/// The whole DeFiLlama listing is one download shared by every protocol.
///
/// It is kept for `listing_ttl`; when a refresh fails the expired copy is
/// served instead.
pub struct LlamaProvider {
    base_url: String,
    timeout: Duration,
    min_tvl: f64,
    listing: CacheStore<(), Arc<Vec<YieldRecord>>>,
    listing_ttl: Duration,
    refresh: Mutex<()>,
}

impl LlamaProvider {
    pub fn new(base_url: &str, timeout: Duration, min_tvl: f64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            min_tvl,
            listing: CacheStore::new(),
            listing_ttl: DEFAULT_LISTING_TTL,
            refresh: Mutex::new(()),
        }
    }

    pub fn with_listing_ttl(mut self, listing_ttl: Duration) -> Self {
        self.listing_ttl = listing_ttl;
        self
    }

    async fn download_listing(&self) -> Result<Vec<YieldRecord>, FetchError> {
        let url = format!("{}/pools", self.base_url);
        let response: PoolsResponse = get_json(&url, self.timeout).await?;

        if let Some(status) = response.status.as_deref()
            && status != "success"
        {
            return Err(FetchError::Parse(format!("listing status: {status}")));
        }

        debug!("Downloaded listing of {} pools", response.data.len());
        Ok(response.data.into_iter().map(YieldRecord::from).collect())
    }

    /// The full listing, downloading it at most once per `listing_ttl`.
    pub async fn listing(&self) -> Result<Arc<Vec<YieldRecord>>, FetchError> {
        if let Some(pools) = self.listing.get_fresh(&()).await {
            return Ok(pools);
        }

        // Concurrent callers wait for a single download
        let _guard = self.refresh.lock().await;
        if let Some(pools) = self.listing.get_fresh(&()).await {
            return Ok(pools);
        }

        match self.download_listing().await {
            Ok(pools) => {
                let pools = Arc::new(pools);
                self.listing
                    .set((), Arc::clone(&pools), self.listing_ttl)
                    .await;
                Ok(pools)
            }
            Err(e) => match self.listing.get_any(&()).await {
                Some((pools, age)) => {
                    warn!("Listing refresh failed ({}), using copy from {:?} ago", e, age);
                    Ok(pools)
                }
                None => Err(e),
            },
        }
    }

    /// Pools listed for `project`, normalized to records.
    pub async fn fetch_pools(&self, project: &str) -> Result<Vec<YieldRecord>, FetchError> {
        let listing = self.listing().await?;
        Ok(listing
            .iter()
            .filter(|pool| pool.protocol == project)
            .cloned()
            .collect())
    }

    async fn try_aggregate(&self, query: &AggregateQuery) -> Result<f64, FetchError> {
        let records = self.fetch_pools(&query.project).await?;
        let rules = AggregateRules {
            min_tvl: self.min_tvl,
            representative: query.representative.clone(),
        };
        aggregate(&records, &rules).ok_or_else(|| {
            FetchError::Parse(format!(
                "no usable pools among {} for {}",
                records.len(),
                query.project
            ))
        })
    }
}

#[async_trait]
impl AggregateSource for LlamaProvider {
    fn name(&self) -> &str {
        "defillama"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(
        name = "LlamaAggregateFetch",
        skip(self, query),
        fields(project = %query.project)
    )]
    async fn aggregate_yield(&self, query: &AggregateQuery) -> Option<f64> {
        or_none(self.name(), self.try_aggregate(query).await)
    }
}
