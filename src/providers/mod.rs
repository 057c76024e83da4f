pub mod aave;
pub mod compound;
pub mod lido;
pub mod llama;
pub mod rocket_pool;
pub mod util;

use crate::core::config::{AggregateConfig, ProvidersConfig};
use crate::core::{Protocol, YieldSource};
use std::collections::HashMap;
use std::sync::Arc;

/// Primary adapters for every protocol that runs its own endpoint.
///
/// Curve has none and goes straight to the aggregate listing.
pub fn primary_sources(config: &ProvidersConfig) -> HashMap<Protocol, Arc<dyn YieldSource>> {
    let mut sources: HashMap<Protocol, Arc<dyn YieldSource>> = HashMap::new();
    sources.insert(
        Protocol::Lido,
        Arc::new(lido::LidoProvider::new(
            &config.lido.base_url,
            config.lido.timeout(),
        )),
    );
    sources.insert(
        Protocol::RocketPool,
        Arc::new(rocket_pool::RocketPoolProvider::new(
            &config.rocket_pool.base_url,
            config.rocket_pool.timeout(),
        )),
    );
    sources.insert(
        Protocol::AaveV3,
        Arc::new(aave::AaveProvider::new(
            &config.aave.base_url,
            config.aave.timeout(),
        )),
    );
    sources.insert(
        Protocol::CompoundV3,
        Arc::new(compound::CompoundProvider::new(
            &config.compound.base_url,
            config.compound.timeout(),
        )),
    );
    sources
}

pub fn aggregate_source(config: &ProvidersConfig, aggregate: &AggregateConfig) -> Arc<llama::LlamaProvider> {
    Arc::new(
        llama::LlamaProvider::new(
            &config.llama.base_url,
            config.llama.timeout(),
            aggregate.min_tvl,
        )
        .with_listing_ttl(aggregate.listing_ttl()),
    )
}
