use super::util::{RetryPolicy, as_number, fetch_json};
use crate::core::fx::{FxFailure, FxProvider, RateObservation};
use crate::core::market::MarketDataProvider;
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// `stock/profile2` reports market capitalization in millions.
const MARKET_CAP_UNIT: f64 = 1e6;

/// How far back candle requests look for a last close.
const CANDLE_LOOKBACK_SECS: i64 = 6 * 3600;

/// Authenticated access to the Finnhub REST API.
pub struct FinnhubClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl FinnhubClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        client: reqwest::Client,
        policy: RetryPolicy,
    ) -> Self {
        FinnhubClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            policy,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// GETs `path` relative to the API root with the token appended to `params`.
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let Some(api_key) = &self.api_key else {
            bail!("Missing Finnhub API key (set FINNHUB_KEY or providers.finnhub.api_key)");
        };

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut query = params.to_vec();
        query.push(("token", api_key.clone()));
        fetch_json(&self.client, &url, &query, &self.policy).await
    }
}

/// Aggregated forex rates from `forex/rates`.
pub struct FinnhubRatesProvider {
    client: Arc<FinnhubClient>,
}

impl FinnhubRatesProvider {
    pub fn new(client: Arc<FinnhubClient>) -> Self {
        FinnhubRatesProvider { client }
    }
}

#[async_trait]
impl FxProvider for FinnhubRatesProvider {
    fn label(&self) -> String {
        "Finnhub forex/rates".to_string()
    }

    #[instrument(name = "FinnhubRatesFetch", skip(self))]
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<RateObservation, FxFailure> {
        let raw = self
            .client
            .get("forex/rates", &[("base", base.to_string())])
            .await?;

        let rate = raw.get("quote").and_then(|q| q.get(quote)).and_then(as_number);
        match rate {
            Some(rate) => Ok(RateObservation { rate, raw }),
            None => Err(FxFailure::with_raw(
                format!("No {quote} quote for base {base}"),
                raw,
            )),
        }
    }
}

/// Last close of an OANDA candle series at a fixed resolution.
pub struct FinnhubCandleProvider {
    client: Arc<FinnhubClient>,
    resolution_minutes: u32,
}

impl FinnhubCandleProvider {
    pub fn new(client: Arc<FinnhubClient>, resolution_minutes: u32) -> Self {
        FinnhubCandleProvider {
            client,
            resolution_minutes,
        }
    }
}

fn last_close(candles: &Value) -> Result<f64, String> {
    match candles.get("s").and_then(Value::as_str) {
        Some("ok") => {}
        Some(status) => return Err(format!("Candle status '{status}'")),
        None => return Err("Candle response has no status".to_string()),
    }
    candles
        .get("c")
        .and_then(Value::as_array)
        .and_then(|closes| closes.last())
        .and_then(as_number)
        .ok_or_else(|| "Candle response has no closes".to_string())
}

#[async_trait]
impl FxProvider for FinnhubCandleProvider {
    fn label(&self) -> String {
        format!("Finnhub OANDA candle {}m", self.resolution_minutes)
    }

    #[instrument(name = "FinnhubCandleFetch", skip(self))]
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<RateObservation, FxFailure> {
        let now = chrono::Utc::now().timestamp();
        let params = [
            ("symbol", format!("OANDA:{base}_{quote}")),
            ("resolution", self.resolution_minutes.to_string()),
            ("from", (now - CANDLE_LOOKBACK_SECS).to_string()),
            ("to", now.to_string()),
        ];
        let raw = self.client.get("forex/candle", &params).await?;

        match last_close(&raw) {
            Ok(rate) => Ok(RateObservation { rate, raw }),
            Err(message) => Err(FxFailure::with_raw(message, raw)),
        }
    }
}

/// Quotes and company profiles for equities.
pub struct FinnhubMarketData {
    client: Arc<FinnhubClient>,
}

impl FinnhubMarketData {
    pub fn new(client: Arc<FinnhubClient>) -> Self {
        FinnhubMarketData { client }
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubMarketData {
    #[instrument(name = "FinnhubQuoteFetch", skip(self))]
    async fn fetch_price(&self, ticker: &str) -> Result<f64> {
        let quote = self
            .client
            .get("quote", &[("symbol", ticker.to_string())])
            .await?;
        debug!(response = %quote, "Received Finnhub quote");

        quote
            .get("c")
            .and_then(as_number)
            .ok_or_else(|| anyhow!("No price data found for symbol: {}", ticker))
    }

    #[instrument(name = "FinnhubProfileFetch", skip(self))]
    async fn fetch_market_cap(&self, ticker: &str) -> Result<f64> {
        let profile = self
            .client
            .get("stock/profile2", &[("symbol", ticker.to_string())])
            .await?;
        debug!(response = %profile, "Received Finnhub profile");

        profile
            .get("marketCapitalization")
            .and_then(as_number)
            .map(|millions| millions * MARKET_CAP_UNIT)
            .ok_or_else(|| anyhow!("No market cap found for symbol: {}", ticker))
    }
}
