//! Request and response shapes for the batch endpoint.

use crate::core::{FetchError, FetchResult, Protocol};
use crate::fetcher::batch::{BatchResult, parse_ids};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchRequest {
    /// `None` requests every supported protocol
    #[serde(default)]
    pub protocols: Option<Vec<String>>,
}

impl BatchRequest {
    /// Parses a `protocols=a,b,c` query value. Blank items are skipped.
    pub fn from_query(query: Option<&str>) -> Self {
        let protocols = query.map(|q| {
            q.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        });
        Self {
            protocols: protocols.filter(|p| !p.is_empty()),
        }
    }

    /// Parses a `{"protocols": [...]}` body.
    pub fn from_json(body: &str) -> Result<Self, FetchError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Requested ids, defaulting to the full allow-list.
    pub fn ids(&self) -> Vec<String> {
        match &self.protocols {
            Some(ids) => ids.clone(),
            None => Protocol::ALL.iter().map(|p| p.id().to_string()).collect(),
        }
    }

    /// Rejects the request if any id is outside the allow-list, naming all of them.
    pub fn validate(&self) -> Result<Vec<Protocol>, FetchError> {
        parse_ids(&self.ids())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponse {
    pub data: BTreeMap<String, Option<FetchResult>>,
    pub errors: BTreeMap<String, String>,
    #[serde(rename = "_cached")]
    pub cached: BTreeMap<String, bool>,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl BatchResponse {
    /// Value for a cache status header: `partial` when any entry came from cache.
    pub fn cache_status(&self) -> &'static str {
        if self.cached.values().any(|c| *c) {
            "partial"
        } else {
            "miss"
        }
    }
}

impl From<BatchResult> for BatchResponse {
    fn from(batch: BatchResult) -> Self {
        let mut data = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut cached = BTreeMap::new();

        for (id, entry) in batch.entries {
            cached.insert(id.clone(), entry.cached);
            match entry.outcome {
                Ok(result) => {
                    data.insert(id, Some(result));
                }
                Err(message) => {
                    data.insert(id.clone(), None);
                    errors.insert(id, message);
                }
            }
        }

        Self {
            data,
            errors,
            cached,
            timestamp: batch.timestamp.timestamp_millis(),
        }
    }
}
