use super::util::{Numeric, or_none, post_json, validate_rate, weighted_mean};
use crate::core::{FetchError, YieldSource};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

const RESERVES_QUERY: &str = r#"
  query GetReserves {
    reserves(first: 10, orderBy: totalLiquidity, orderDirection: desc) {
      id
      symbol
      liquidityRate
      totalLiquidity
    }
  }
"#;

/// Ray (1e27) fraction to percent.
const RAY_TO_PERCENT: f64 = 1e25;

#[derive(Debug, Deserialize)]
struct SubgraphResponse {
    data: Option<ReservesData>,
}

#[derive(Debug, Deserialize)]
struct ReservesData {
    reserves: Vec<Reserve>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reserve {
    symbol: Option<String>,
    liquidity_rate: Option<Numeric>,
    total_liquidity: Option<Numeric>,
}

/// Liquidity-weighted supply rate across the largest Aave v3 reserves.
fn weighted_supply_rate(reserves: &[Reserve]) -> Option<f64> {
    let valid = reserves.iter().filter_map(|reserve| {
        let liquidity = reserve.total_liquidity.as_ref()?.value()?;
        let rate = reserve.liquidity_rate.as_ref()?.value()?;
        (liquidity > 0.0 && rate > 0.0).then(|| {
            debug!(
                symbol = reserve.symbol.as_deref().unwrap_or("?"),
                rate = rate / RAY_TO_PERCENT,
                "Aave reserve"
            );
            (rate / RAY_TO_PERCENT, liquidity)
        })
    });
    weighted_mean(valid)
}

pub struct AaveProvider {
    subgraph_url: String,
    timeout: Duration,
}

impl AaveProvider {
    pub fn new(subgraph_url: &str, timeout: Duration) -> Self {
        Self {
            subgraph_url: subgraph_url.to_string(),
            timeout,
        }
    }

    async fn try_fetch(&self) -> Result<f64, FetchError> {
        let body = json!({ "query": RESERVES_QUERY });
        let response: SubgraphResponse = post_json(&self.subgraph_url, &body, self.timeout).await?;

        let reserves = response
            .data
            .map(|d| d.reserves)
            .ok_or_else(|| FetchError::Parse("missing data.reserves".to_string()))?;

        let rate = weighted_supply_rate(&reserves)
            .ok_or_else(|| FetchError::Parse("no reserve with positive liquidity and rate".to_string()))?;
        validate_rate(rate)
    }
}

#[async_trait]
impl YieldSource for AaveProvider {
    fn name(&self) -> &str {
        "aave-subgraph"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(name = "AaveApyFetch", skip(self))]
    async fn fetch_yield(&self) -> Option<f64> {
        or_none(self.name(), self.try_fetch().await)
    }
}
