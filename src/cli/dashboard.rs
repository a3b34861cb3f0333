//! Interactive loop: enter a budget to recompute, `r` to refetch, `q` to quit.
//!
//! Market data and the resolved rate are memoized for `cache_ttl_secs`, so changing the budget
//! within that window does not hit the network again.

use super::alloc::{self, AllocationReport};
use super::ui;
use crate::core::cache::MemoryCache;
use crate::core::config::AppConfig;
use crate::core::fx::{FxResolver, RateResult};
use crate::core::market::MarketDataProvider;
use crate::providers::{self, caching::CachingMarketData, finnhub::FinnhubMarketData};
use anyhow::{Result, anyhow, bail};
use std::io::{BufRead, Write};
use tracing::debug;

const HELP: &str = "Commands: <amount> set budget | r refresh | rate <x> override rate | rate off | q quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Budget(f64),
    Recompute,
    Refresh,
    Override(Option<f64>),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let lower = line.to_lowercase();
    match lower.as_str() {
        "" => return Ok(Command::Recompute),
        "r" | "refresh" => return Ok(Command::Refresh),
        "q" | "quit" | "exit" => return Ok(Command::Quit),
        "h" | "help" | "?" => return Ok(Command::Help),
        _ => {}
    }

    if let Some(arg) = lower.strip_prefix("rate") {
        let arg = arg.trim();
        if arg == "off" {
            return Ok(Command::Override(None));
        }
        let rate: f64 = arg
            .parse()
            .map_err(|_| anyhow!("Invalid rate '{}'", arg))?;
        if !(rate.is_finite() && rate > 0.0) {
            bail!("Rate must be positive, got {}", rate);
        }
        return Ok(Command::Override(Some(rate)));
    }

    let budget: f64 = line
        .replace([',', '_'], "")
        .trim_start_matches(['£', '$', '€'])
        .parse()
        .map_err(|_| anyhow!("Unrecognised input '{}'. {}", line, HELP))?;
    if !(budget.is_finite() && budget >= 0.0) {
        bail!("Budget must not be negative, got {}", budget);
    }
    Ok(Command::Budget(budget))
}

pub struct Dashboard<M: MarketDataProvider> {
    config: AppConfig,
    market_data: CachingMarketData<M>,
    resolver: FxResolver,
    rates: MemoryCache<String, RateResult>,
    budget: f64,
    rate_override: Option<f64>,
}

impl<M: MarketDataProvider> Dashboard<M> {
    pub fn new(config: AppConfig, market_data: M, resolver: FxResolver) -> Self {
        let ttl = config.cache_ttl();
        let budget = config.default_budget;
        Dashboard {
            config,
            market_data: CachingMarketData::new(market_data, ttl),
            resolver,
            rates: MemoryCache::new(),
            budget,
            rate_override: None,
        }
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    fn rate_key(&self) -> String {
        format!("{}-{}", self.config.base_currency, self.config.quote_currency)
    }

    async fn current_rate(&self) -> Result<RateResult> {
        let key = self.rate_key();
        let rate = match self.rates.get(&key).await {
            Some(rate) => rate,
            None => {
                let rate = alloc::resolve_rate(&self.config, &self.resolver, None).await?;
                self.rates
                    .put(key, rate.clone(), Some(self.config.cache_ttl()))
                    .await;
                rate
            }
        };
        match self.rate_override {
            Some(r) => rate.with_override(r),
            None => Ok(rate),
        }
    }

    /// Recomputes the report, reusing cached market data and rate while they are fresh.
    pub async fn compute(&self) -> Result<AllocationReport> {
        let instruments = alloc::fetch_instruments(&self.market_data, &self.config.tickers).await;
        let rate = self.current_rate().await?;
        AllocationReport::build(&self.config, &instruments, self.budget, rate)
    }

    pub async fn clear_cache(&self) {
        debug!("Clearing cached market data and rates");
        self.market_data.clear().await;
        self.rates.clear().await;
    }

    /// Applies one command. Returns `false` once the user asked to quit.
    pub async fn handle<W: Write>(&mut self, command: Command, out: &mut W) -> Result<bool> {
        match command {
            Command::Quit => return Ok(false),
            Command::Help => {
                writeln!(out, "{HELP}")?;
                return Ok(true);
            }
            Command::Budget(budget) => self.budget = budget,
            Command::Override(rate) => self.rate_override = rate,
            Command::Refresh => self.clear_cache().await,
            Command::Recompute => {}
        }

        let report = self.compute().await?;
        writeln!(out, "{}", report.display_as_table())?;
        writeln!(out, "\n{}", ui::separator())?;
        Ok(true)
    }

    /// Reads commands line by line until `q` or end of input.
    pub async fn run_loop<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        writeln!(out, "{HELP}")?;
        self.handle(Command::Recompute, out).await?;

        for line in input.lines() {
            let line = line?;
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(e) => {
                    writeln!(out, "{}", ui::style_text(&e.to_string(), ui::StyleType::Error))?;
                    continue;
                }
            };
            match self.handle(command, out).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    writeln!(out, "{}", ui::style_text(&format!("{e:#}"), ui::StyleType::Error))?
                }
            }
        }
        Ok(())
    }
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let client = providers::util::http_client(config.http.timeout())?;
    let finnhub = providers::build_finnhub_client(config, &client);
    if !finnhub.has_api_key() {
        bail!(
            "Missing Finnhub API key. Set the {} environment variable or providers.finnhub.api_key in the config file",
            crate::core::config::FINNHUB_KEY_ENV
        );
    }
    let resolver = providers::build_fx_resolver(config, &client, &finnhub)?;
    let market_data = FinnhubMarketData::new(finnhub);

    let mut dashboard = Dashboard::new(config.clone(), market_data, resolver);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    dashboard.run_loop(stdin.lock(), &mut stdout).await
}
