use crate::core::FetchError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Plausible range for an annual yield, in percent.
pub const MAX_PLAUSIBLE_RATE: f64 = 20.0;

const USER_AGENT: &str = concat!("yieldfetch/", env!("CARGO_PKG_VERSION"));

fn map_request_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::from(err)
    }
}

fn client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(FetchError::from)
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
    timeout: Duration,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Network(format!("HTTP error: {status} for {url}")));
    }

    let text = response
        .text()
        .await
        .map_err(|e| map_request_error(e, timeout))?;

    if text.trim().is_empty() {
        return Err(FetchError::Parse(format!("Received empty response from {url}")));
    }

    serde_json::from_str(&text).map_err(|e| {
        error!(error = ?e, response = %text, "Failed to parse response from {}", url);
        FetchError::Parse(format!("Failed to parse response from {url}: {e}"))
    })
}

/// Issues a GET and decodes the JSON body. The whole call is bounded by `timeout`.
pub async fn get_json<T: DeserializeOwned>(url: &str, timeout: Duration) -> Result<T, FetchError> {
    debug!("Requesting {}", url);
    let response = client(timeout)?
        .get(url)
        .send()
        .await
        .map_err(|e| map_request_error(e, timeout))?;
    read_json(response, url, timeout).await
}

pub async fn post_json<B, T>(url: &str, body: &B, timeout: Duration) -> Result<T, FetchError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    debug!("Posting to {}", url);
    let response = client(timeout)?
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| map_request_error(e, timeout))?;
    read_json(response, url, timeout).await
}

/// Upstream APIs report numbers both as JSON numbers and as strings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// Normalizes to a finite value; anything else is treated as absent.
    pub fn value(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Rejects values that cannot be a real annual yield.
pub fn validate_rate(value: f64) -> Result<f64, FetchError> {
    if !value.is_finite() {
        return Err(FetchError::Validation(format!("non-finite rate: {value}")));
    }
    if !(0.0..=MAX_PLAUSIBLE_RATE).contains(&value) {
        return Err(FetchError::Validation(format!(
            "rate {value} outside 0-{MAX_PLAUSIBLE_RATE}%"
        )));
    }
    Ok(value)
}

/// Weighted mean of `(rate, weight)` pairs.
///
/// Falls back to the plain mean when the weights sum to zero; `None` for no
/// input.
pub fn weighted_mean<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let pairs: Vec<(f64, f64)> = pairs.into_iter().collect();
    if pairs.is_empty() {
        return None;
    }

    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total_weight > 0.0 {
        Some(pairs.iter().map(|(r, w)| r * w).sum::<f64>() / total_weight)
    } else {
        Some(pairs.iter().map(|(r, _)| r).sum::<f64>() / pairs.len() as f64)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Collapses an adapter outcome into the single "no data" sentinel.
pub fn or_none(source: &str, result: Result<f64, FetchError>) -> Option<f64> {
    match result {
        Ok(value) => {
            debug!("{} returned {:.4}%", source, value);
            Some(value)
        }
        Err(e) => {
            warn!(source, error = %e, "Source returned no data");
            None
        }
    }
}
