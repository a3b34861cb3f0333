pub mod caching;
pub mod finnhub;
pub mod frankfurter;
pub mod util;
pub mod yahoo_finance;

use crate::core::config::{AppConfig, FxProviderKind};
use crate::core::fx::{FxProvider, FxResolver};
use anyhow::Result;
use std::sync::Arc;

/// Builds the exchange rate chain in the configured priority order.
pub fn build_fx_providers(
    config: &AppConfig,
    client: &reqwest::Client,
    finnhub: &Arc<finnhub::FinnhubClient>,
) -> Vec<Box<dyn FxProvider>> {
    let policy = config.http.retry_policy();
    config
        .fx
        .providers
        .iter()
        .map(|kind| -> Box<dyn FxProvider> {
            match kind {
                FxProviderKind::Frankfurter => Box::new(frankfurter::FrankfurterProvider::new(
                    &config.providers.frankfurter.base_url,
                    client.clone(),
                    policy,
                )),
                FxProviderKind::FinnhubRates => {
                    Box::new(finnhub::FinnhubRatesProvider::new(Arc::clone(finnhub)))
                }
                FxProviderKind::FinnhubCandle1m => Box::new(
                    finnhub::FinnhubCandleProvider::new(Arc::clone(finnhub), 1),
                ),
                FxProviderKind::FinnhubCandle5m => Box::new(
                    finnhub::FinnhubCandleProvider::new(Arc::clone(finnhub), 5),
                ),
                FxProviderKind::FinnhubCandle15m => Box::new(
                    finnhub::FinnhubCandleProvider::new(Arc::clone(finnhub), 15),
                ),
                FxProviderKind::Yahoo => Box::new(yahoo_finance::YahooCurrencyProvider::new(
                    &config.providers.yahoo.base_url,
                    client.clone(),
                    policy,
                )),
            }
        })
        .collect()
}

pub fn build_fx_resolver(
    config: &AppConfig,
    client: &reqwest::Client,
    finnhub: &Arc<finnhub::FinnhubClient>,
) -> Result<FxResolver> {
    FxResolver::new(
        build_fx_providers(config, client, finnhub),
        config.fx.fallback_rate,
    )
}

pub fn build_finnhub_client(
    config: &AppConfig,
    client: &reqwest::Client,
) -> Arc<finnhub::FinnhubClient> {
    Arc::new(finnhub::FinnhubClient::new(
        &config.providers.finnhub.base_url,
        config.finnhub_api_key(),
        client.clone(),
        config.http.retry_policy(),
    ))
}
