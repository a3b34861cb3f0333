use crate::core::cache::MemoryCache;
use crate::core::market::MarketDataProvider;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

// Time-boxed memoization for MarketDataProvider. Only successful lookups are kept, so a failed
// ticker is retried on the next refresh.
pub struct CachingMarketData<T: MarketDataProvider> {
    inner: T,
    prices: MemoryCache<String, f64>,
    market_caps: MemoryCache<String, f64>,
    ttl: Duration,
}

impl<T: MarketDataProvider> CachingMarketData<T> {
    pub fn new(inner: T, ttl: Duration) -> Self {
        Self {
            inner,
            prices: MemoryCache::new(),
            market_caps: MemoryCache::new(),
            ttl,
        }
    }

    /// Drops everything so the next lookups go to the inner provider.
    pub async fn clear(&self) {
        self.prices.clear().await;
        self.market_caps.clear().await;
    }
}

#[async_trait]
impl<T: MarketDataProvider> MarketDataProvider for CachingMarketData<T> {
    async fn fetch_price(&self, ticker: &str) -> Result<f64> {
        let key = ticker.to_string();
        if let Some(price) = self.prices.get(&key).await {
            return Ok(price);
        }
        debug!("Cache miss for price: {}", ticker);
        let price = self.inner.fetch_price(ticker).await?;
        self.prices.put(key, price, Some(self.ttl)).await;
        Ok(price)
    }

    async fn fetch_market_cap(&self, ticker: &str) -> Result<f64> {
        let key = ticker.to_string();
        if let Some(cap) = self.market_caps.get(&key).await {
            return Ok(cap);
        }
        debug!("Cache miss for market cap: {}", ticker);
        let cap = self.inner.fetch_market_cap(ticker).await?;
        self.market_caps.put(key, cap, Some(self.ttl)).await;
        Ok(cap)
    }
}
