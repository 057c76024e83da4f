use super::util::{Numeric, get_json, or_none, validate_rate};
use crate::core::{FetchError, YieldSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct RocketPoolAprResponse {
    #[serde(alias = "yearlyAPR")]
    yearly_apr: Option<Numeric>,
}

/// rETH yearly APR published by Rocket Pool.
pub struct RocketPoolProvider {
    base_url: String,
    timeout: Duration,
}

impl RocketPoolProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn try_fetch(&self) -> Result<f64, FetchError> {
        let url = format!("{}/api/mainnet/apr", self.base_url);
        let response: RocketPoolAprResponse = get_json(&url, self.timeout).await?;

        let apr = response
            .yearly_apr
            .and_then(|apr| apr.value())
            .ok_or_else(|| FetchError::Parse("missing yearlyAPR".to_string()))?;
        validate_rate(apr)
    }
}

#[async_trait]
impl YieldSource for RocketPoolProvider {
    fn name(&self) -> &str {
        "rocket-pool-api"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(name = "RocketPoolAprFetch", skip(self))]
    async fn fetch_yield(&self) -> Option<f64> {
        or_none(self.name(), self.try_fetch().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/mainnet/apr"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_apr_reported_as_string() {
        let server = create_mock_server(r#"{"yearlyAPR": "2.87"}"#).await;
        let provider = RocketPoolProvider::new(&server.uri(), Duration::from_secs(5));
        assert_eq!(provider.fetch_yield().await, Some(2.87));
    }

    #[tokio::test]
    async fn test_apr_reported_as_number() {
        let server = create_mock_server(r#"{"yearlyAPR": 3.01}"#).await;
        let provider = RocketPoolProvider::new(&server.uri(), Duration::from_secs(5));
        assert_eq!(provider.fetch_yield().await, Some(3.01));
    }

    #[tokio::test]
    async fn test_non_numeric_apr_is_no_data() {
        let server = create_mock_server(r#"{"yearlyAPR": "n/a"}"#).await;
        let provider = RocketPoolProvider::new(&server.uri(), Duration::from_secs(5));
        assert!(matches!(
            provider.try_fetch().await,
            Err(FetchError::Parse(_))
        ));
        assert_eq!(provider.fetch_yield().await, None);
    }
}
