//! Market-cap weighted allocation of a budget across instruments.

use crate::core::fx::RateResult;
use crate::core::market::Instrument;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("total market cap must be positive and finite, got {total}")]
    DivisionInvalid { total: f64 },
    #[error("budget must be non-negative and finite in both currencies, got {0}")]
    InvalidBudget(f64),
    #[error("price for {ticker} must be positive, got {price}")]
    InvalidPrice { ticker: String, price: f64 },
}

/// One instrument's slice of the budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationRow {
    pub ticker: String,
    pub price: f64,
    pub market_cap: f64,
    /// Fraction of total market cap, 0..=1
    pub weight: f64,
    pub home_budget_share: f64,
    pub quote_budget_share: f64,
    pub estimated_shares: f64,
}

impl AllocationRow {
    pub fn market_cap_trillions(&self) -> f64 {
        self.market_cap / 1e12
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub home_budget: f64,
    pub quote_budget: f64,
    /// Sorted by market cap, largest first
    pub rows: Vec<AllocationRow>,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_quote(&self) -> f64 {
        self.rows.iter().map(|r| r.quote_budget_share).sum()
    }

    pub fn total_home(&self) -> f64 {
        self.rows.iter().map(|r| r.home_budget_share).sum()
    }

    /// Rate implied by the allocated totals (quote per home unit). May differ from the resolved
    /// rate in the last digits because of summation order. `None` when nothing was allocated.
    pub fn effective_rate(&self) -> Option<f64> {
        let total_home = self.total_home();
        if total_home > 0.0 {
            Some(self.total_quote() / total_home)
        } else {
            None
        }
    }

    pub fn effective_inverse_rate(&self) -> Option<f64> {
        self.effective_rate()
            .filter(|r| *r > 0.0)
            .map(|r| 1.0 / r)
    }
}

/// Splits `home_budget` across `instruments` in proportion to market cap.
///
/// An empty instrument set is a valid input and yields an allocation without rows.
pub fn allocate(
    instruments: &[Instrument],
    home_budget: f64,
    rate: &RateResult,
) -> Result<Allocation, AllocationError> {
    if !(home_budget.is_finite() && home_budget >= 0.0) {
        return Err(AllocationError::InvalidBudget(home_budget));
    }

    let quote_budget = home_budget * rate.rate();
    // A finite budget can still overflow once converted
    if !quote_budget.is_finite() {
        return Err(AllocationError::InvalidBudget(home_budget));
    }
    if instruments.is_empty() {
        return Ok(Allocation {
            home_budget,
            quote_budget,
            rows: Vec::new(),
        });
    }

    let total: f64 = instruments.iter().map(|i| i.market_cap).sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(AllocationError::DivisionInvalid { total });
    }

    let mut rows = instruments
        .iter()
        .map(|instrument| {
            if !(instrument.price.is_finite() && instrument.price > 0.0) {
                return Err(AllocationError::InvalidPrice {
                    ticker: instrument.ticker.clone(),
                    price: instrument.price,
                });
            }
            let weight = instrument.market_cap / total;
            let quote_budget_share = quote_budget * weight;
            Ok(AllocationRow {
                ticker: instrument.ticker.clone(),
                price: instrument.price,
                market_cap: instrument.market_cap,
                weight,
                home_budget_share: quote_budget_share * rate.inverse_rate(),
                quote_budget_share,
                estimated_shares: quote_budget_share / instrument.price,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Stable, so equal caps keep fetch order
    rows.sort_by(|a, b| b.market_cap.total_cmp(&a.market_cap));

    Ok(Allocation {
        home_budget,
        quote_budget,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fx::RateSource;

    fn rate(value: f64) -> RateResult {
        RateResult::fixed(
            value,
            RateSource::Live {
                label: "test".to_string(),
                rank: 0,
            },
        )
        .unwrap()
    }

    fn instrument(ticker: &str, price: f64, market_cap: f64) -> Instrument {
        Instrument {
            ticker: ticker.to_string(),
            price,
            market_cap,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_two_instrument_example() {
        let instruments = vec![
            instrument("AAA", 100.0, 900.0),
            instrument("BBB", 50.0, 100.0),
        ];
        let allocation = allocate(&instruments, 1000.0, &rate(1.3)).unwrap();

        assert_close(allocation.quote_budget, 1300.0);
        assert_eq!(allocation.rows.len(), 2);

        let aaa = &allocation.rows[0];
        assert_eq!(aaa.ticker, "AAA");
        assert_close(aaa.weight, 0.9);
        assert_close(aaa.quote_budget_share, 1170.0);
        assert_close(aaa.home_budget_share, 900.0);
        assert_close(aaa.estimated_shares, 11.7);

        let bbb = &allocation.rows[1];
        assert_eq!(bbb.ticker, "BBB");
        assert_close(bbb.weight, 0.1);
        assert_close(bbb.quote_budget_share, 130.0);
        assert_close(bbb.home_budget_share, 100.0);
        assert_close(bbb.estimated_shares, 2.6);
    }

    #[test]
    fn test_totals_match_budget() {
        let instruments = vec![
            instrument("AAPL", 229.87, 3.41e12),
            instrument("MSFT", 506.69, 3.77e12),
            instrument("NVDA", 177.99, 4.34e12),
            instrument("GOOGL", 239.63, 2.9e12),
            instrument("AMZN", 231.23, 2.46e12),
            instrument("META", 755.4, 1.9e12),
            instrument("AVGO", 334.89, 1.58e12),
            instrument("TSLA", 395.94, 1.28e12),
            instrument("BRK-B", 493.23, 1.06e12),
        ];
        let allocation = allocate(&instruments, 37_000.0, &rate(1.3512)).unwrap();

        let weight_sum: f64 = allocation.rows.iter().map(|r| r.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);

        let quote_total = allocation.total_quote();
        assert!((quote_total - allocation.quote_budget).abs() / allocation.quote_budget < 1e-6);
        assert!((allocation.total_home() - 37_000.0).abs() / 37_000.0 < 1e-6);

        let effective = allocation.effective_rate().unwrap();
        assert!((effective - 1.3512).abs() < 1e-9);
        let inverse = allocation.effective_inverse_rate().unwrap();
        assert!((effective * inverse - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rows_sorted_by_market_cap_descending() {
        let instruments = vec![
            instrument("SMALL", 10.0, 100.0),
            instrument("LARGE", 10.0, 300.0),
            instrument("MID", 10.0, 200.0),
        ];
        let allocation = allocate(&instruments, 100.0, &rate(1.0)).unwrap();
        let order: Vec<&str> = allocation.rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["LARGE", "MID", "SMALL"]);
    }

    #[test]
    fn test_equal_caps_keep_fetch_order() {
        let instruments = vec![
            instrument("GOOGL", 240.0, 2.9e12),
            instrument("GOOG", 241.0, 2.9e12),
            instrument("AAPL", 230.0, 3.4e12),
        ];
        let allocation = allocate(&instruments, 100.0, &rate(1.0)).unwrap();
        let order: Vec<&str> = allocation.rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["AAPL", "GOOGL", "GOOG"]);
    }

    #[test]
    fn test_empty_instruments_is_not_an_error() {
        let allocation = allocate(&[], 1000.0, &rate(1.3)).unwrap();
        assert!(allocation.is_empty());
        assert_eq!(allocation.effective_rate(), None);
    }

    #[test]
    fn test_zero_total_market_cap_is_rejected() {
        let instruments = vec![instrument("AAA", 100.0, 0.0), instrument("BBB", 50.0, 0.0)];
        let err = allocate(&instruments, 1000.0, &rate(1.3)).unwrap_err();
        assert_eq!(err, AllocationError::DivisionInvalid { total: 0.0 });
    }

    #[test]
    fn test_invalid_price_is_rejected() {
        let instruments = vec![instrument("AAA", 0.0, 900.0)];
        let err = allocate(&instruments, 1000.0, &rate(1.3)).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidPrice { ref ticker, .. } if ticker == "AAA"));
    }

    #[test]
    fn test_zero_budget_allocates_nothing() {
        let instruments = vec![instrument("AAA", 100.0, 900.0)];
        let allocation = allocate(&instruments, 0.0, &rate(1.3)).unwrap();
        assert_eq!(allocation.rows[0].estimated_shares, 0.0);
        assert_eq!(allocation.effective_rate(), None);
        assert_eq!(allocation.effective_inverse_rate(), None);
    }

    #[test]
    fn test_negative_budget_is_rejected() {
        let err = allocate(&[], -5.0, &rate(1.3)).unwrap_err();
        assert_eq!(err, AllocationError::InvalidBudget(-5.0));
    }

    #[test]
    fn test_budget_overflowing_on_conversion_is_rejected() {
        let instruments = vec![
            instrument("AAA", 100.0, 900.0),
            instrument("BBB", 50.0, 100.0),
        ];
        let err = allocate(&instruments, 1.5e308, &rate(1.3)).unwrap_err();
        assert_eq!(err, AllocationError::InvalidBudget(1.5e308));

        let err = allocate(&[], 1.5e308, &rate(1.3)).unwrap_err();
        assert_eq!(err, AllocationError::InvalidBudget(1.5e308));

        // A large budget that still converts stays finite throughout
        let allocation = allocate(&instruments, 1e300, &rate(1.3)).unwrap();
        assert!(allocation.quote_budget.is_finite());
        assert!(allocation.rows.iter().all(|r| r.estimated_shares.is_finite()));
        assert!(allocation.effective_rate().is_some_and(f64::is_finite));
    }

    #[test]
    fn test_inputs_are_untouched() {
        let instruments = vec![
            instrument("BBB", 50.0, 100.0),
            instrument("AAA", 100.0, 900.0),
        ];
        let snapshot = instruments.clone();
        let fx = rate(1.3);
        let _ = allocate(&instruments, 1000.0, &fx).unwrap();
        assert_eq!(instruments, snapshot);
        assert_eq!(fx.rate(), 1.3);
    }
}
