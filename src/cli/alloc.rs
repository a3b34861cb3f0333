use super::{export, fx, ui};
use crate::core::config::AppConfig;
use crate::core::fx::{FxResolver, RateResult};
use crate::core::market::{self, Instrument, MarketDataProvider};
use crate::core::{Allocation, allocate};
use crate::providers::{self, finnhub::FinnhubMarketData, util::http_client};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use comfy_table::Cell;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct AllocOptions {
    /// Budget in the base currency; the configured default when absent
    pub budget: Option<f64>,
    /// Replaces the resolved rate
    pub rate_override: Option<f64>,
    /// Where to write the spreadsheet export
    pub export: Option<PathBuf>,
    /// Print every exchange rate attempt after the table
    pub diagnostics: bool,
}

impl AllocOptions {
    /// Rejects values that would only fail after every ticker and rate had been fetched.
    pub fn validate(&self) -> Result<()> {
        if let Some(budget) = self.budget.filter(|b| !(b.is_finite() && *b >= 0.0)) {
            bail!("Budget must be a non-negative number, got {}", budget);
        }
        if let Some(rate) = self.rate_override.filter(|r| !(r.is_finite() && *r > 0.0)) {
            bail!("Override rate must be a positive number, got {}", rate);
        }
        Ok(())
    }
}

/// Everything one refresh produced, ready for display or export.
#[derive(Debug, Clone)]
pub struct AllocationReport {
    pub allocation: Allocation,
    pub rate: RateResult,
    pub base_currency: String,
    pub quote_currency: String,
    pub generated_at: String,
}

impl AllocationReport {
    pub fn build(
        config: &AppConfig,
        instruments: &[Instrument],
        budget: f64,
        rate: RateResult,
    ) -> Result<Self> {
        let allocation = allocate(instruments, budget, &rate)?;
        let generated_at = Utc::now()
            .with_timezone(&config.tz()?)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string();

        Ok(AllocationReport {
            allocation,
            rate,
            base_currency: config.base_currency.clone(),
            quote_currency: config.quote_currency.clone(),
            generated_at,
        })
    }

    pub fn effective_rate_label(&self) -> String {
        self.allocation
            .effective_rate()
            .map_or("N/A".to_string(), |r| format!("{r:.6}"))
    }

    pub fn effective_inverse_rate_label(&self) -> String {
        self.allocation
            .effective_inverse_rate()
            .map_or("N/A".to_string(), |r| format!("{r:.6}"))
    }

    pub fn display_as_table(&self) -> String {
        let home = &self.base_currency;
        let quote = &self.quote_currency;

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Rank"),
            ui::header_cell("Ticker"),
            ui::header_cell("Price"),
            ui::header_cell("Market Cap"),
            ui::header_cell(&format!("Market Cap ({}T)", ui::currency_symbol(quote).trim_end())),
            ui::header_cell("Weight %"),
            ui::header_cell(&format!("{} Allocation", ui::currency_symbol(home).trim_end())),
            ui::header_cell(&format!("{} Allocation", ui::currency_symbol(quote).trim_end())),
            ui::header_cell("Est. Shares"),
        ]);

        for (rank, row) in self.allocation.rows.iter().enumerate() {
            table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(&row.ticker),
                ui::right_cell(ui::format_money(row.price, quote, 2)),
                ui::right_cell(ui::format_money(row.market_cap, quote, 0)),
                ui::right_cell(ui::group_thousands(row.market_cap_trillions(), 2)),
                ui::format_percentage_cell(row.weight),
                ui::right_cell(ui::format_money(row.home_budget_share, home, 0)),
                ui::right_cell(ui::format_money(row.quote_budget_share, quote, 0)),
                ui::right_cell(ui::group_thousands(row.estimated_shares, 1)),
            ]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Top Market Cap Allocation", ui::StyleType::Title)
        );

        if self.allocation.is_empty() {
            output.push_str(&ui::style_text(
                "No market data retrieved. Please try again shortly.",
                ui::StyleType::Warning,
            ));
            output.push_str("\n\n");
        }

        output.push_str(&table.to_string());

        output.push_str(&format!(
            "\n\n{} {}  ({})",
            ui::style_text(&format!("Budget ({home}):"), ui::StyleType::TotalLabel),
            ui::style_text(
                &ui::format_money(self.allocation.home_budget, home, 0),
                ui::StyleType::TotalValue
            ),
            ui::format_money(self.allocation.quote_budget, quote, 0),
        ));

        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!(
                    "Data source: Finnhub.io | Updated {} | Effective {home}→{quote} used: {} | {quote}→{home} used: {} (FX source: {})",
                    self.generated_at,
                    self.effective_rate_label(),
                    self.effective_inverse_rate_label(),
                    self.rate.source(),
                ),
                ui::StyleType::Subtle
            )
        ));

        if self.rate.is_fallback() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    "Every live exchange rate source failed; the fallback rate was used.",
                    ui::StyleType::Error
                )
            ));
        }

        output
    }
}

/// Fetches instruments one ticker at a time behind a progress bar.
pub async fn fetch_instruments(
    market_data: &(dyn MarketDataProvider + Send + Sync),
    tickers: &[String],
) -> Vec<Instrument> {
    let pb = ui::new_progress_bar(tickers.len() as u64, true);
    pb.set_message("Fetching market data...");
    let instruments = market::fetch_instruments(market_data, tickers, &|| pb.inc(1)).await;
    pb.finish_and_clear();
    debug!(
        fetched = instruments.len(),
        requested = tickers.len(),
        "Market data fetched"
    );
    instruments
}

/// Resolves the exchange rate and applies the user override, if any.
pub async fn resolve_rate(
    config: &AppConfig,
    resolver: &FxResolver,
    rate_override: Option<f64>,
) -> Result<RateResult> {
    let rate = resolver
        .resolve(&config.base_currency, &config.quote_currency)
        .await;
    match rate_override {
        Some(r) => rate.with_override(r),
        None => Ok(rate),
    }
}

/// One full refresh: market data, exchange rate, allocation.
pub async fn refresh(
    config: &AppConfig,
    market_data: &(dyn MarketDataProvider + Send + Sync),
    resolver: &FxResolver,
    budget: f64,
    rate_override: Option<f64>,
) -> Result<AllocationReport> {
    let instruments = fetch_instruments(market_data, &config.tickers).await;
    let rate = resolve_rate(config, resolver, rate_override).await?;
    AllocationReport::build(config, &instruments, budget, rate)
        .context("Failed to compute allocation")
}

pub async fn run(config: &AppConfig, options: &AllocOptions) -> Result<()> {
    options.validate()?;
    let client = http_client(config.http.timeout())?;
    let finnhub = providers::build_finnhub_client(config, &client);
    if !finnhub.has_api_key() {
        bail!(
            "Missing Finnhub API key. Set the {} environment variable or providers.finnhub.api_key in the config file",
            crate::core::config::FINNHUB_KEY_ENV
        );
    }
    let market_data = FinnhubMarketData::new(finnhub.clone());
    let resolver = providers::build_fx_resolver(config, &client, &finnhub)?;

    let budget = options.budget.unwrap_or(config.default_budget);
    let report = refresh(
        config,
        &market_data,
        &resolver,
        budget,
        options.rate_override,
    )
    .await?;

    println!("{}", report.display_as_table());

    if options.diagnostics {
        println!("\n{}", fx::display_diagnostics(&report.rate, config));
    }

    if let Some(path) = &options.export {
        export::write_report(&report, path)?;
        println!("\nExported allocation to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fx::{FxFailure, FxProvider, RateObservation, RateSource};
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct MockMarketData;

    #[async_trait]
    impl MarketDataProvider for MockMarketData {
        async fn fetch_price(&self, ticker: &str) -> Result<f64> {
            match ticker {
                "AAA" => Ok(100.0),
                "BBB" => Ok(50.0),
                _ => Err(anyhow!("Unknown symbol")),
            }
        }

        async fn fetch_market_cap(&self, ticker: &str) -> Result<f64> {
            match ticker {
                "AAA" => Ok(900.0),
                "BBB" => Ok(100.0),
                _ => Err(anyhow!("Unknown symbol")),
            }
        }
    }

    struct FixedRate(f64);

    #[async_trait]
    impl FxProvider for FixedRate {
        fn label(&self) -> String {
            "fixed".to_string()
        }

        async fn fetch_rate(
            &self,
            _base: &str,
            _quote: &str,
        ) -> Result<RateObservation, FxFailure> {
            Ok(RateObservation {
                rate: self.0,
                raw: serde_json::json!({ "rate": self.0 }),
            })
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            tickers: vec!["AAA".to_string(), "BBB".to_string(), "ZZZ".to_string()],
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_builds_report() {
        let config = test_config();
        let resolver = FxResolver::new(vec![Box::new(FixedRate(1.3))], 1.35).unwrap();

        let report = refresh(&config, &MockMarketData, &resolver, 1000.0, None)
            .await
            .unwrap();

        assert_eq!(report.allocation.rows.len(), 2);
        assert_eq!(report.allocation.rows[0].ticker, "AAA");
        assert!((report.allocation.rows[0].estimated_shares - 11.7).abs() < 1e-9);
        assert_eq!(
            report.rate.source(),
            &RateSource::Live {
                label: "fixed".to_string(),
                rank: 0
            }
        );
        assert_eq!(report.effective_rate_label(), "1.300000");
    }

    #[tokio::test]
    async fn test_refresh_with_override() {
        let config = test_config();
        let resolver = FxResolver::new(vec![Box::new(FixedRate(1.3))], 1.35).unwrap();

        let report = refresh(&config, &MockMarketData, &resolver, 1000.0, Some(1.25))
            .await
            .unwrap();

        assert_eq!(report.rate.rate(), 1.25);
        assert!((report.allocation.quote_budget - 1250.0).abs() < 1e-9);
        assert_eq!(report.rate.source().to_string(), "custom override (1.2500)");
    }

    #[test]
    fn test_options_validation() {
        assert!(AllocOptions::default().validate().is_ok());
        let ok = AllocOptions {
            budget: Some(0.0),
            rate_override: Some(1.27),
            ..AllocOptions::default()
        };
        assert!(ok.validate().is_ok());

        for rate in [0.0, -1.3, f64::NAN, f64::INFINITY] {
            let options = AllocOptions {
                rate_override: Some(rate),
                ..AllocOptions::default()
            };
            let err = options.validate().unwrap_err();
            assert!(err.to_string().starts_with("Override rate must be a positive number"));
        }

        let options = AllocOptions {
            budget: Some(-10.0),
            ..AllocOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_table_contains_rows_and_caption() {
        let config = test_config();
        let instruments = vec![
            Instrument::new("AAA", 100.0, 900.0).unwrap(),
            Instrument::new("BBB", 50.0, 100.0).unwrap(),
        ];
        let rate = RateResult::fixed(
            1.3,
            RateSource::Live {
                label: "Frankfurter (ECB)".to_string(),
                rank: 0,
            },
        )
        .unwrap();
        let report = AllocationReport::build(&config, &instruments, 1000.0, rate).unwrap();

        let output = console::strip_ansi_codes(&report.display_as_table()).to_string();
        assert!(output.contains("AAA"));
        assert!(output.contains("$1,170"));
        assert!(output.contains("£900"));
        assert!(output.contains("90.00%"));
        assert!(output.contains("11.7"));
        assert!(output.contains("Effective GBP→USD used: 1.300000"));
        assert!(output.contains("USD→GBP used: 0.769231"));
        assert!(output.contains("FX source: Frankfurter (ECB)"));
        assert!(!output.contains("No market data retrieved"));
    }

    #[test]
    fn test_empty_report_shows_no_data_state() {
        let config = test_config();
        let rate = RateResult::fixed(1.35, RateSource::Fallback { rate: 1.35 }).unwrap();
        let report = AllocationReport::build(&config, &[], 1000.0, rate).unwrap();

        let output = console::strip_ansi_codes(&report.display_as_table()).to_string();
        assert!(output.contains("No market data retrieved"));
        assert!(output.contains("Effective GBP→USD used: N/A"));
        assert!(output.contains("fallback rate was used"));
    }
}
