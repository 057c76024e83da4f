use super::util::{Numeric, get_json, or_none, validate_rate};
use crate::core::{FetchError, YieldSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct LidoAprResponse {
    data: Option<LidoAprData>,
}

#[derive(Debug, Deserialize)]
struct LidoAprData {
    apr: Option<Numeric>,
}

/// stETH staking APR from the Lido API.
pub struct LidoProvider {
    base_url: String,
    timeout: Duration,
}

impl LidoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn try_fetch(&self) -> Result<f64, FetchError> {
        let url = format!("{}/api/steth-apr", self.base_url);
        let response: LidoAprResponse = get_json(&url, self.timeout).await?;

        let apr = response
            .data
            .and_then(|d| d.apr)
            .and_then(|apr| apr.value())
            .ok_or_else(|| FetchError::Parse("missing data.apr".to_string()))?;
        validate_rate(apr)
    }
}

#[async_trait]
impl YieldSource for LidoProvider {
    fn name(&self) -> &str {
        "lido-api"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(name = "LidoAprFetch", skip(self))]
    async fn fetch_yield(&self) -> Option<f64> {
        or_none(self.name(), self.try_fetch().await)
    }
}
