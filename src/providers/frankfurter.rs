use super::util::{RetryPolicy, as_number, fetch_json};
use crate::core::fx::{FxFailure, FxProvider, RateObservation};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// ECB reference rates via frankfurter.app. Needs no API key.
pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str, client: reqwest::Client, policy: RetryPolicy) -> Self {
        FrankfurterProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            policy,
        }
    }
}

#[async_trait]
impl FxProvider for FrankfurterProvider {
    fn label(&self) -> String {
        "Frankfurter (ECB)".to_string()
    }

    #[instrument(name = "FrankfurterRateFetch", skip(self))]
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<RateObservation, FxFailure> {
        let url = format!("{}/latest", self.base_url);
        let params = [("from", base.to_string()), ("to", quote.to_string())];
        let raw = fetch_json(&self.client, &url, &params, &self.policy).await?;
        debug!(response = %raw, "Received Frankfurter response");

        let rate = raw.get("rates").and_then(|r| r.get(quote)).and_then(as_number);
        match rate {
            Some(rate) => Ok(RateObservation { rate, raw }),
            None => Err(FxFailure::with_raw(
                format!("No {quote} rate in response for base {base}"),
                raw,
            )),
        }
    }
}
