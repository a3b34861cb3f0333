//! Exchange rate resolution with an ordered provider chain and a labelled fallback.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use tracing::{debug, info, warn};

/// A rate a provider observed, along with the payload it was read from.
#[derive(Debug, Clone)]
pub struct RateObservation {
    pub rate: f64,
    pub raw: Value,
}

/// Why a provider could not supply a rate. `raw` holds the payload when one was received.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FxFailure {
    pub message: String,
    pub raw: Option<Value>,
}

impl FxFailure {
    pub fn new(message: impl Into<String>) -> Self {
        FxFailure {
            message: message.into(),
            raw: None,
        }
    }

    pub fn with_raw(message: impl Into<String>, raw: Value) -> Self {
        FxFailure {
            message: message.into(),
            raw: Some(raw),
        }
    }
}

impl From<anyhow::Error> for FxFailure {
    fn from(err: anyhow::Error) -> Self {
        FxFailure::new(err.to_string())
    }
}

/// A single source of exchange rates.
#[async_trait]
pub trait FxProvider: Send + Sync {
    /// Stable label used in diagnostics and as the live source name.
    fn label(&self) -> String;

    /// Units of `quote` per one unit of `base`.
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<RateObservation, FxFailure>;
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSource {
    /// A provider from the chain; `rank` is its zero-based priority.
    Live { label: String, rank: usize },
    /// The configured constant, used when every provider failed.
    Fallback { rate: f64 },
    /// A rate supplied by the user in place of the resolved one.
    Override { rate: f64 },
}

impl RateSource {
    pub fn is_live(&self) -> bool {
        matches!(self, RateSource::Live { .. })
    }
}

impl Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateSource::Live { label, .. } => write!(f, "{label}"),
            RateSource::Fallback { rate } => write!(f, "fallback {rate}"),
            RateSource::Override { rate } => write!(f, "custom override ({rate:.4})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted { rate: f64, raw: Value },
    Failed { error: String, raw: Option<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub source: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed { .. })
    }
}

/// Outcome of one resolution. Immutable once built; the inverse is computed once from the same
/// rate so both directions always come from the same resolution.
#[derive(Debug, Clone, Serialize)]
pub struct RateResult {
    rate: f64,
    inverse_rate: f64,
    source: RateSource,
    diagnostics: Vec<Attempt>,
}

impl RateResult {
    fn new(rate: f64, source: RateSource, diagnostics: Vec<Attempt>) -> Self {
        RateResult {
            rate,
            inverse_rate: 1.0 / rate,
            source,
            diagnostics,
        }
    }

    /// Builds a result with no diagnostics, e.g. for a rate known ahead of time.
    pub fn fixed(rate: f64, source: RateSource) -> Result<Self> {
        if !is_valid_rate(rate) {
            bail!("Exchange rate must be a positive number, got {}", rate);
        }
        Ok(Self::new(rate, source, Vec::new()))
    }

    /// Replaces the resolved rate with a user-supplied one, keeping the live diagnostics.
    pub fn with_override(self, rate: f64) -> Result<Self> {
        if !is_valid_rate(rate) {
            bail!("Override rate must be a positive number, got {}", rate);
        }
        Ok(Self::new(
            rate,
            RateSource::Override { rate },
            self.diagnostics,
        ))
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn inverse_rate(&self) -> f64 {
        self.inverse_rate
    }

    pub fn source(&self) -> &RateSource {
        &self.source
    }

    pub fn diagnostics(&self) -> &[Attempt] {
        &self.diagnostics
    }

    pub fn attempt(&self, source: &str) -> Option<&Attempt> {
        self.diagnostics.iter().find(|a| a.source == source)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, RateSource::Fallback { .. })
    }
}

fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Tries each provider in order and settles on the first usable rate.
pub struct FxResolver {
    providers: Vec<Box<dyn FxProvider>>,
    fallback_rate: f64,
}

impl FxResolver {
    pub fn new(providers: Vec<Box<dyn FxProvider>>, fallback_rate: f64) -> Result<Self> {
        if !is_valid_rate(fallback_rate) {
            bail!("Fallback rate must be a positive number, got {}", fallback_rate);
        }
        Ok(FxResolver {
            providers,
            fallback_rate,
        })
    }

    pub fn fallback_rate(&self) -> f64 {
        self.fallback_rate
    }

    pub fn provider_labels(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.label()).collect()
    }

    /// Resolves units of `quote` per unit of `base`. Never fails: when no provider produces a
    /// usable rate the configured fallback is returned, labelled as such.
    pub async fn resolve(&self, base: &str, quote: &str) -> RateResult {
        let mut diagnostics = Vec::with_capacity(self.providers.len());

        for (rank, provider) in self.providers.iter().enumerate() {
            let label = provider.label();
            debug!(provider = %label, rank, "Trying exchange rate provider");

            match provider.fetch_rate(base, quote).await {
                Ok(observation) if is_valid_rate(observation.rate) => {
                    info!(provider = %label, rate = observation.rate, "{base}->{quote} resolved");
                    let rate = observation.rate;
                    diagnostics.push(Attempt {
                        source: label.clone(),
                        outcome: AttemptOutcome::Accepted {
                            rate,
                            raw: observation.raw,
                        },
                    });
                    return RateResult::new(rate, RateSource::Live { label, rank }, diagnostics);
                }
                Ok(observation) => {
                    warn!(provider = %label, rate = observation.rate, "Rejected unusable rate");
                    diagnostics.push(Attempt {
                        source: label,
                        outcome: AttemptOutcome::Failed {
                            error: format!("Unusable rate: {}", observation.rate),
                            raw: Some(observation.raw),
                        },
                    });
                }
                Err(failure) => {
                    warn!(provider = %label, error = %failure, "Exchange rate provider failed");
                    diagnostics.push(Attempt {
                        source: label,
                        outcome: AttemptOutcome::Failed {
                            error: failure.message,
                            raw: failure.raw,
                        },
                    });
                }
            }
        }

        warn!(
            fallback = self.fallback_rate,
            "All exchange rate providers failed, using fallback"
        );
        RateResult::new(
            self.fallback_rate,
            RateSource::Fallback {
                rate: self.fallback_rate,
            },
            diagnostics,
        )
    }
}
