use std::time::Duration;
use thiserror::Error;

/// Failures raised while talking to upstream yield sources.
///
/// Adapters never hand these to the fetcher; they are logged and turned into
/// `None`. Only `UnknownProtocol` reaches batch callers.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection failures and non-success HTTP statuses
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed body or missing field
    #[error("Parse error: {0}")]
    Parse(String),

    /// Value present but outside the plausible range
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source answered but had nothing usable
    #[error("No data from {0}")]
    NoData(String),

    #[error("Invalid protocols: {}", .0.join(", "))]
    UnknownProtocol(Vec<String>),
}

impl FetchError {
    /// Status code used when the error is surfaced through the batch endpoint.
    pub fn http_status(&self) -> u16 {
        match self {
            FetchError::UnknownProtocol(_) => 400,
            FetchError::Timeout(_) => 504,
            FetchError::Network(_)
            | FetchError::Parse(_)
            | FetchError::Validation(_)
            | FetchError::NoData(_) => 502,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}
