pub mod api;
pub mod cli;
pub mod core;
pub mod fetcher;
pub mod providers;
pub mod store;

use crate::core::Metrics;
use crate::core::config::AppConfig;
use crate::fetcher::ProtocolFetcher;
use crate::fetcher::batch::{BatchFetcher, BatchOptions};
use crate::fetcher::retry::RetryPolicy;
use crate::store::YieldCache;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Fetch {
        protocol: String,
    },
    Batch {
        protocols: Option<String>,
        json: bool,
    },
    Watch {
        protocols: Option<String>,
        interval: Duration,
        rounds: Option<u32>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("yieldfetch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let batch = build_batch_fetcher(&config);

    match command {
        AppCommand::Fetch { protocol } => cli::fetch::run(batch.fetcher(), &protocol).await,
        AppCommand::Batch { protocols, json } => {
            cli::batch::run(&batch, protocols.as_deref(), json).await
        }
        AppCommand::Watch {
            protocols,
            interval,
            rounds,
        } => {
            cli::watch::run(
                &batch,
                batch.fetcher().metrics(),
                protocols.as_deref(),
                interval,
                rounds,
            )
            .await
        }
    }
}

/// Wires adapters, cache and metrics described by `config` into a batch fetcher.
pub fn build_batch_fetcher(config: &AppConfig) -> BatchFetcher {
    let cache = Arc::new(YieldCache::new());
    let metrics = Arc::new(Metrics::new());
    let options = BatchOptions::from(&config.batch);

    let fetcher = ProtocolFetcher::from_config(config, cache, metrics)
        .with_default_policy(RetryPolicy::single_attempt(options.per_call_timeout));
    BatchFetcher::new(Arc::new(fetcher), options)
}
