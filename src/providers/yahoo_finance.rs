use super::util::{RetryPolicy, fetch_json};
use crate::core::fx::{FxFailure, FxProvider, RateObservation};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

// YahooCurrencyProvider reads the regular market price of a `<BASE><QUOTE>=X` chart
pub struct YahooCurrencyProvider {
    base_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl YahooCurrencyProvider {
    pub fn new(base_url: &str, client: reqwest::Client, policy: RetryPolicy) -> Self {
        YahooCurrencyProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            policy,
        }
    }
}

#[derive(Debug, Deserialize)]
struct YahooCurrencyResponse {
    chart: CurrencyChartResult,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartResult {
    result: Vec<CurrencyChartItem>,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartItem {
    meta: CurrencyChartMeta,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
}

#[async_trait]
impl FxProvider for YahooCurrencyProvider {
    fn label(&self) -> String {
        "Yahoo Finance chart".to_string()
    }

    #[instrument(name = "YahooRateFetch", skip(self))]
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<RateObservation, FxFailure> {
        let symbol = format!("{base}{quote}=X");
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let raw = fetch_json(&self.client, &url, &[], &self.policy).await?;
        debug!(response = %raw, "Received Yahoo response");

        let data: YahooCurrencyResponse = match serde_json::from_value(raw.clone()) {
            Ok(data) => data,
            Err(e) => {
                return Err(FxFailure::with_raw(
                    format!("Failed to parse chart response for {symbol}: {e}"),
                    raw,
                ));
            }
        };

        match data.chart.result.into_iter().next() {
            Some(item) => Ok(RateObservation {
                rate: item.meta.regular_market_price,
                raw,
            }),
            None => Err(FxFailure::with_raw(
                format!("No rate data found for currency pair: {symbol}"),
                raw,
            )),
        }
    }
}
