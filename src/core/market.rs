//! Market data abstractions and instrument collection

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A ticker with a usable price and market capitalization, both in the quote currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub price: f64,
    pub market_cap: f64,
}

impl Instrument {
    /// Returns `None` unless both price and market cap are finite and positive.
    pub fn new(ticker: impl Into<String>, price: f64, market_cap: f64) -> Option<Self> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if usable(price) && usable(market_cap) {
            Some(Instrument {
                ticker: ticker.into(),
                price,
                market_cap,
            })
        } else {
            None
        }
    }
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Latest traded price in the quote currency.
    async fn fetch_price(&self, ticker: &str) -> Result<f64>;

    /// Market capitalization in the quote currency (absolute units, not millions).
    async fn fetch_market_cap(&self, ticker: &str) -> Result<f64>;
}

/// Fetches price and market cap for each ticker in order, one request at a time.
///
/// Tickers whose data is unavailable or non-positive are left out; the result may be empty.
/// Duplicate tickers are fetched once. `on_progress` is called after every ticker.
pub async fn fetch_instruments(
    provider: &(dyn MarketDataProvider + Send + Sync),
    tickers: &[String],
    on_progress: &(dyn Fn() + Sync),
) -> Vec<Instrument> {
    let mut seen = HashSet::new();
    let mut instruments = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        if !seen.insert(ticker.as_str()) {
            debug!(%ticker, "Skipping duplicate ticker");
            on_progress();
            continue;
        }

        let price = provider.fetch_price(ticker).await;
        let market_cap = provider.fetch_market_cap(ticker).await;
        on_progress();

        match (price, market_cap) {
            (Ok(price), Ok(market_cap)) => match Instrument::new(ticker.as_str(), price, market_cap)
            {
                Some(instrument) => instruments.push(instrument),
                None => warn!(%ticker, price, market_cap, "Excluding ticker with unusable data"),
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(%ticker, error = %e, "Excluding ticker after fetch failure")
            }
        }
    }

    instruments
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockMarketData {
        prices: HashMap<&'static str, f64>,
        caps: HashMap<&'static str, f64>,
        calls: AtomicUsize,
    }

    impl MockMarketData {
        fn new(data: &[(&'static str, Option<f64>, Option<f64>)]) -> Self {
            let mut prices = HashMap::new();
            let mut caps = HashMap::new();
            for (ticker, price, cap) in data {
                if let Some(p) = price {
                    prices.insert(*ticker, *p);
                }
                if let Some(c) = cap {
                    caps.insert(*ticker, *c);
                }
            }
            Self {
                prices,
                caps,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for MockMarketData {
        async fn fetch_price(&self, ticker: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .get(ticker)
                .copied()
                .ok_or_else(|| anyhow!("No quote for {ticker}"))
        }

        async fn fetch_market_cap(&self, ticker: &str) -> Result<f64> {
            self.caps
                .get(ticker)
                .copied()
                .ok_or_else(|| anyhow!("No profile for {ticker}"))
        }
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_instrument_rejects_unusable_values() {
        assert!(Instrument::new("AAPL", 150.0, 3.5e12).is_some());
        assert!(Instrument::new("AAPL", 0.0, 3.5e12).is_none());
        assert!(Instrument::new("AAPL", 150.0, -1.0).is_none());
        assert!(Instrument::new("AAPL", f64::NAN, 3.5e12).is_none());
        assert!(Instrument::new("AAPL", 150.0, f64::INFINITY).is_none());
    }

    #[tokio::test]
    async fn test_fetch_instruments_excludes_failures() {
        let provider = MockMarketData::new(&[
            ("AAPL", Some(150.0), Some(3.0e12)),
            ("MSFT", Some(400.0), None),
            ("NVDA", None, Some(2.0e12)),
            ("TSLA", Some(0.0), Some(8.0e11)),
            ("META", Some(500.0), Some(1.2e12)),
        ]);
        let progress = AtomicUsize::new(0);

        let instruments = fetch_instruments(
            &provider,
            &tickers(&["AAPL", "MSFT", "NVDA", "TSLA", "META"]),
            &|| {
                progress.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        let fetched: Vec<&str> = instruments.iter().map(|i| i.ticker.as_str()).collect();
        assert_eq!(fetched, vec!["AAPL", "META"]);
        assert_eq!(progress.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fetch_instruments_skips_duplicates() {
        let provider = MockMarketData::new(&[("AAPL", Some(150.0), Some(3.0e12))]);

        let instruments =
            fetch_instruments(&provider, &tickers(&["AAPL", "AAPL"]), &|| {}).await;

        assert_eq!(instruments.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_instruments_all_failing_is_empty() {
        let provider = MockMarketData::new(&[]);
        let instruments = fetch_instruments(&provider, &tickers(&["AAPL"]), &|| {}).await;
        assert!(instruments.is_empty());
    }
}
