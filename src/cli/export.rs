//! Spreadsheet export of an allocation report.
//!
//! One row per instrument with raw, unformatted numbers, followed by trailer rows with the
//! rates used and the generation time. Trailer rows have fewer columns than the table.

use super::alloc::AllocationReport;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::debug;

pub fn headers(report: &AllocationReport) -> Vec<String> {
    vec![
        "Ticker".to_string(),
        "Price".to_string(),
        "Market Cap".to_string(),
        "Market Cap (T)".to_string(),
        "Weight %".to_string(),
        format!("{} Allocation", report.base_currency),
        format!("{} Allocation", report.quote_currency),
        "Est. Shares".to_string(),
    ]
}

pub fn write_report_to<W: Write>(report: &AllocationReport, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    let base = &report.base_currency;
    let quote = &report.quote_currency;

    wtr.write_record(headers(report))?;
    for row in &report.allocation.rows {
        wtr.write_record([
            row.ticker.clone(),
            row.price.to_string(),
            row.market_cap.to_string(),
            row.market_cap_trillions().to_string(),
            row.weight.to_string(),
            row.home_budget_share.to_string(),
            row.quote_budget_share.to_string(),
            row.estimated_shares.to_string(),
        ])?;
    }

    wtr.write_record([
        format!("Effective {base}→{quote} rate used"),
        report.effective_rate_label(),
    ])?;
    wtr.write_record([
        format!("{quote}→{base} rate used"),
        report.effective_inverse_rate_label(),
    ])?;
    wtr.write_record(["FX source".to_string(), report.rate.source().to_string()])?;
    wtr.write_record(["Updated".to_string(), report.generated_at.clone()])?;
    wtr.flush()?;
    Ok(())
}

pub fn write_report(report: &AllocationReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    write_report_to(report, file)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    debug!("Wrote {} rows to {}", report.allocation.rows.len(), path.display());
    Ok(())
}
