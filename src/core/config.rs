use super::protocol::{Protocol, ProtocolSettings};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub lido: ProviderConfig,
    pub rocket_pool: ProviderConfig,
    pub aave: ProviderConfig,
    pub compound: ProviderConfig,
    pub llama: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            lido: ProviderConfig::new("https://stake.lido.fi", 5),
            rocket_pool: ProviderConfig::new("https://rocketpool.net", 5),
            aave: ProviderConfig::new(
                "https://api.thegraph.com/subgraphs/name/aave/protocol-v3-ethereum",
                10,
            ),
            compound: ProviderConfig::new("https://api.compound.finance", 5),
            llama: ProviderConfig::new("https://yields.llama.fi", 10),
        }
    }
}

/// Per-protocol overrides; anything missing keeps the protocol default.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProtocolOverride {
    pub ttl_secs: Option<u64>,
    pub project: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AggregateConfig {
    /// Pools below this TVL (USD) are ignored
    pub min_tvl: f64,
    /// Lifetime of the downloaded listing, shared by every protocol
    pub listing_ttl_secs: u64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            min_tvl: 1_000_000.0,
            listing_ttl_secs: 300,
        }
    }
}

impl AggregateConfig {
    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub per_call_timeout_ms: u64,
    pub retry_count: usize,
    pub retry_base_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub chunk_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            per_call_timeout_ms: 5000,
            retry_count: 2,
            retry_base_delay_ms: 500,
            retry_jitter_ms: 200,
            chunk_delay_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub protocols: HashMap<Protocol, ProtocolOverride>,
    pub aggregate: AggregateConfig,
    pub batch: BatchConfig,
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults when it does not exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "yieldfetch", "yieldfetch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Resolves the settings of every protocol, applying config overrides.
    pub fn protocol_settings(&self) -> HashMap<Protocol, ProtocolSettings> {
        Protocol::ALL
            .iter()
            .map(|protocol| {
                let mut settings = protocol.default_settings();
                if let Some(overrides) = self.protocols.get(protocol) {
                    if let Some(ttl_secs) = overrides.ttl_secs {
                        settings.ttl = Duration::from_secs(ttl_secs);
                    }
                    if let Some(project) = &overrides.project {
                        settings.project = project.clone();
                    }
                }
                (*protocol, settings)
            })
            .collect()
    }
}
