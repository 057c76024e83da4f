//! Yield abstractions and core types

use super::protocol::{Protocol, RepresentativePools};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// One pool as reported by an upstream listing.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldRecord {
    pub protocol: String,
    pub pool: String,
    pub symbol: String,
    pub tvl_usd: f64,
    pub apy_base: Option<f64>,
    pub apy_reward: Option<f64>,
    pub stablecoin: bool,
}

/// Which stage of the fallback chain produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Primary,
    Aggregate,
    Cache,
    Stale,
    Unavailable,
}

impl Provenance {
    /// True for anything other than a live protocol source or a fresh cache hit.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Provenance::Aggregate | Provenance::Stale | Provenance::Unavailable
        )
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Provenance::Primary => "primary",
                Provenance::Aggregate => "aggregate",
                Provenance::Cache => "cache",
                Provenance::Stale => "stale",
                Provenance::Unavailable => "unavailable",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub protocol: Protocol,
    /// `None` when no source produced usable data
    pub apy: Option<f64>,
    pub provenance: Provenance,
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
}

impl FetchResult {
    pub fn live(protocol: Protocol, apy: f64, provenance: Provenance) -> Self {
        Self {
            protocol,
            apy: Some(apy),
            provenance,
            fetched_at: Utc::now(),
            from_cache: false,
        }
    }

    pub fn unavailable(protocol: Protocol) -> Self {
        Self {
            protocol,
            apy: None,
            provenance: Provenance::Unavailable,
            fetched_at: Utc::now(),
            from_cache: false,
        }
    }

    /// Re-labels a cached result, keeping the value and original fetch time.
    pub fn served_from_cache(&self, provenance: Provenance) -> Self {
        Self {
            provenance,
            from_cache: true,
            ..self.clone()
        }
    }
}

/// A protocol-operated endpoint reporting a single yield figure.
#[async_trait]
pub trait YieldSource: Send + Sync {
    fn name(&self) -> &str;

    /// Time the source allows its own HTTP calls. Zero when it sets none.
    fn timeout(&self) -> Duration {
        Duration::ZERO
    }

    /// Returns `None` on any failure; implementations log the cause.
    async fn fetch_yield(&self) -> Option<f64>;
}

/// Lookup parameters for the aggregate listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub project: String,
    pub representative: Option<RepresentativePools>,
}

/// A third-party listing covering many protocols.
#[async_trait]
pub trait AggregateSource: Send + Sync {
    fn name(&self) -> &str;

    fn timeout(&self) -> Duration {
        Duration::ZERO
    }

    async fn aggregate_yield(&self, query: &AggregateQuery) -> Option<f64>;
}
