use super::util::{Numeric, get_json, or_none, validate_rate, weighted_mean};
use crate::core::{FetchError, YieldSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Single markets below this supply (USD) are not reported.
const MIN_MARKET_TVL: f64 = 1_000.0;
/// Markets below this supply (USD) are left out of the weighted average.
const MIN_WEIGHTED_TVL: f64 = 1_000_000.0;

const ENDPOINTS: [&str; 2] = ["/api/v3/markets/mainnet-usdc", "/api/v3/markets"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompoundMarket {
    total_supply_usd: Option<Numeric>,
    supply_apr: Option<Numeric>,
}

impl CompoundMarket {
    fn tvl(&self) -> Option<f64> {
        self.total_supply_usd.as_ref()?.value()
    }

    fn apr(&self) -> Option<f64> {
        self.supply_apr.as_ref()?.value()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MarketsResponse {
    Single { market: CompoundMarket },
    Many(Vec<CompoundMarket>),
}

fn rate_from_response(response: MarketsResponse) -> Result<f64, FetchError> {
    match response {
        MarketsResponse::Single { market } => {
            let tvl = market
                .tvl()
                .ok_or_else(|| FetchError::Parse("missing totalSupplyUsd".to_string()))?;
            if tvl < MIN_MARKET_TVL {
                return Err(FetchError::Validation(format!("market TVL {tvl} too low")));
            }
            market
                .apr()
                .ok_or_else(|| FetchError::Parse("missing supplyApr".to_string()))
        }
        MarketsResponse::Many(markets) => {
            let valid = markets.iter().filter_map(|m| {
                let (tvl, apr) = (m.tvl()?, m.apr()?);
                (tvl > MIN_WEIGHTED_TVL && apr > 0.0).then_some((apr, tvl))
            });
            weighted_mean(valid)
                .ok_or_else(|| FetchError::Parse("no valid markets".to_string()))
        }
    }
}

/// Supply APR from the Compound v3 markets API, trying each endpoint in turn.
pub struct CompoundProvider {
    base_url: String,
    timeout: Duration,
}

impl CompoundProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn try_fetch(&self) -> Result<f64, FetchError> {
        let mut last_error = FetchError::Network("no endpoint attempted".to_string());

        for endpoint in ENDPOINTS {
            let url = format!("{}{}", self.base_url, endpoint);
            let outcome = match get_json::<MarketsResponse>(&url, self.timeout).await {
                Ok(response) => rate_from_response(response),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(rate) => return validate_rate(rate),
                // A definitive answer from the market endpoint is not retried elsewhere
                Err(e @ FetchError::Validation(_)) => return Err(e),
                Err(e) => {
                    debug!("Compound endpoint {} failed: {}", endpoint, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl YieldSource for CompoundProvider {
    fn name(&self) -> &str {
        "compound-api"
    }

    /// Endpoints are tried one after another, each under `timeout`.
    fn timeout(&self) -> Duration {
        self.timeout * ENDPOINTS.len() as u32
    }

    #[instrument(name = "CompoundApyFetch", skip(self))]
    async fn fetch_yield(&self) -> Option<f64> {
        or_none(self.name(), self.try_fetch().await)
    }
}
