use crate::providers::util::RetryPolicy;
use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

pub const DEFAULT_TICKERS: [&str; 10] = [
    "AAPL", "MSFT", "NVDA", "GOOGL", "GOOG", "AMZN", "META", "AVGO", "TSLA", "BRK-B",
];

/// Environment variable holding the Finnhub API token. Takes precedence over the config file.
pub const FINNHUB_KEY_ENV: &str = "FINNHUB_KEY";

/// Exchange rate sources, listed in the order the resolver should try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FxProviderKind {
    #[serde(rename = "frankfurter")]
    Frankfurter,
    #[serde(rename = "finnhub_rates")]
    FinnhubRates,
    #[serde(rename = "finnhub_candle_1m")]
    FinnhubCandle1m,
    #[serde(rename = "finnhub_candle_5m")]
    FinnhubCandle5m,
    #[serde(rename = "finnhub_candle_15m")]
    FinnhubCandle15m,
    #[serde(rename = "yahoo")]
    Yahoo,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FxConfig {
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: f64,
    #[serde(default = "default_fx_providers")]
    pub providers: Vec<FxProviderKind>,
}

impl Default for FxConfig {
    fn default() -> Self {
        FxConfig {
            fallback_rate: default_fallback_rate(),
            providers: default_fx_providers(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FinnhubProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrankfurterProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_finnhub")]
    pub finnhub: FinnhubProviderConfig,
    #[serde(default = "default_frankfurter")]
    pub frankfurter: FrankfurterProviderConfig,
    #[serde(default = "default_yahoo")]
    pub yahoo: YahooProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            finnhub: default_finnhub(),
            frankfurter: default_frankfurter(),
            yahoo: default_yahoo(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    #[serde(default = "default_budget")]
    pub default_budget: f64,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub fx: FxConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            tickers: default_tickers(),
            default_budget: default_budget(),
            base_currency: default_base_currency(),
            quote_currency: default_quote_currency(),
            timezone: default_timezone(),
            fx: FxConfig::default(),
            providers: ProvidersConfig::default(),
            http: HttpConfig::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or built-in defaults when no file exists there.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "topalloc", "topalloc")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            bail!("At least one ticker must be configured");
        }
        if !(self.fx.fallback_rate.is_finite() && self.fx.fallback_rate > 0.0) {
            bail!(
                "fx.fallback_rate must be a positive number, got {}",
                self.fx.fallback_rate
            );
        }
        if self.fx.providers.is_empty() {
            bail!("fx.providers must list at least one exchange rate source");
        }
        if !(self.default_budget.is_finite() && self.default_budget >= 0.0) {
            bail!(
                "default_budget must not be negative, got {}",
                self.default_budget
            );
        }
        if self.http.max_attempts == 0 {
            bail!("http.max_attempts must be at least 1");
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", self.timezone, e))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Finnhub token from the environment, falling back to the config file.
    pub fn finnhub_api_key(&self) -> Option<String> {
        std::env::var(FINNHUB_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.providers.finnhub.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_tickers() -> Vec<String> {
    DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect()
}

fn default_budget() -> f64 {
    37_000.0
}

fn default_base_currency() -> String {
    "GBP".to_string()
}

fn default_quote_currency() -> String {
    "USD".to_string()
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_fallback_rate() -> f64 {
    1.35
}

fn default_fx_providers() -> Vec<FxProviderKind> {
    vec![
        FxProviderKind::Frankfurter,
        FxProviderKind::FinnhubRates,
        FxProviderKind::FinnhubCandle1m,
        FxProviderKind::FinnhubCandle5m,
        FxProviderKind::FinnhubCandle15m,
    ]
}

fn default_finnhub() -> FinnhubProviderConfig {
    FinnhubProviderConfig {
        base_url: "https://finnhub.io/api/v1".to_string(),
        api_key: None,
    }
}

fn default_frankfurter() -> FrankfurterProviderConfig {
    FrankfurterProviderConfig {
        base_url: "https://api.frankfurter.app".to_string(),
    }
}

fn default_yahoo() -> YahooProviderConfig {
    YahooProviderConfig {
        base_url: "https://query1.finance.yahoo.com".to_string(),
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    600
}

fn default_cache_ttl_secs() -> u64 {
    60
}
