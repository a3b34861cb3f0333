use super::ui;
use crate::core::config::AppConfig;
use crate::core::fx::{AttemptOutcome, RateResult};
use crate::providers::{self, util::http_client};
use anyhow::{Context, Result};
use comfy_table::{Cell, Color};

/// Renders the chosen source and every attempt made while resolving `rate`.
pub fn display_diagnostics(rate: &RateResult, config: &AppConfig) -> String {
    let base = &config.base_currency;
    let quote = &config.quote_currency;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Source"),
        ui::header_cell("Status"),
        ui::header_cell("Detail"),
    ]);

    for (i, attempt) in rate.diagnostics().iter().enumerate() {
        let (status, detail) = match &attempt.outcome {
            AttemptOutcome::Accepted { rate, raw } => (
                Cell::new("accepted").fg(Color::Green),
                format!("{rate} | raw: {raw}"),
            ),
            AttemptOutcome::Failed { error, raw } => (
                Cell::new("failed").fg(Color::Red),
                match raw {
                    Some(raw) => format!("{error} | raw: {raw}"),
                    None => error.clone(),
                },
            ),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&attempt.source),
            status,
            Cell::new(detail),
        ]);
    }

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Diagnostics (FX sources & raw responses)", ui::StyleType::Title)
    );
    output.push_str(&format!("Selected FX source: {}\n", rate.source()));
    output.push_str(&format!(
        "{base}→{quote} fetched (pre-effective): {}\n",
        rate.rate()
    ));
    output.push_str(&format!(
        "{quote}→{base} fetched (pre-effective): {}\n\n",
        rate.inverse_rate()
    ));
    if rate.diagnostics().is_empty() {
        output.push_str(&ui::style_text("No providers attempted", ui::StyleType::Subtle));
    } else {
        output.push_str(&table.to_string());
    }
    output
}

pub async fn run(config: &AppConfig, json: bool) -> Result<()> {
    let client = http_client(config.http.timeout())?;
    let finnhub = providers::build_finnhub_client(config, &client);
    let resolver = providers::build_fx_resolver(config, &client, &finnhub)?;

    let rate = resolver
        .resolve(&config.base_currency, &config.quote_currency)
        .await;

    if json {
        let text =
            serde_json::to_string_pretty(&rate).context("Failed to serialize diagnostics")?;
        println!("{text}");
    } else {
        println!("{}", display_diagnostics(&rate, config));
    }
    Ok(())
}
