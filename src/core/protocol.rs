//! The fixed set of tracked protocols and their per-protocol settings

use super::error::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Lido,
    RocketPool,
    AaveV3,
    CompoundV3,
    Curve,
}

impl Protocol {
    /// Allow-list accepted by the batch endpoint, in display order.
    pub const ALL: [Protocol; 5] = [
        Protocol::Lido,
        Protocol::RocketPool,
        Protocol::AaveV3,
        Protocol::CompoundV3,
        Protocol::Curve,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Protocol::Lido => "lido",
            Protocol::RocketPool => "rocket-pool",
            Protocol::AaveV3 => "aave-v3",
            Protocol::CompoundV3 => "compound-v3",
            Protocol::Curve => "curve",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Lido => "Lido",
            Protocol::RocketPool => "Rocket Pool",
            Protocol::AaveV3 => "Aave V3",
            Protocol::CompoundV3 => "Compound V3",
            Protocol::Curve => "Curve Finance",
        }
    }

    /// Cache window and aggregate lookup used when the config has no override.
    ///
    /// Compound and Rocket Pool upstreams rate-limit harder, so they get longer
    /// windows.
    pub fn default_settings(&self) -> ProtocolSettings {
        let (ttl_mins, project) = match self {
            Protocol::Lido => (5, "lido"),
            Protocol::RocketPool => (15, "rocket-pool"),
            Protocol::AaveV3 => (5, "aave-v3"),
            Protocol::CompoundV3 => (10, "compound-v3"),
            Protocol::Curve => (5, "curve-dex"),
        };

        let representative = match self {
            Protocol::Curve => Some(RepresentativePools {
                stablecoin: true,
                symbols: ["3pool", "frax", "lusd", "usdt", "usdc", "dai"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            _ => None,
        };

        ProtocolSettings {
            ttl: Duration::from_secs(ttl_mins * 60),
            project: project.to_string(),
            representative,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Protocol {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lido" => Ok(Protocol::Lido),
            "rocket-pool" => Ok(Protocol::RocketPool),
            "aave-v3" => Ok(Protocol::AaveV3),
            "compound-v3" => Ok(Protocol::CompoundV3),
            "curve" => Ok(Protocol::Curve),
            _ => Err(FetchError::UnknownProtocol(vec![s.to_string()])),
        }
    }
}

/// Subset of pools considered typical for a protocol.
///
/// A pool matches when it is flagged as a stablecoin pool (if `stablecoin` is
/// set) or when its symbol contains one of `symbols`, case-insensitively.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepresentativePools {
    pub stablecoin: bool,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolSettings {
    pub ttl: Duration,
    /// Project name in the aggregate yields listing
    pub project: String,
    pub representative: Option<RepresentativePools>,
}
