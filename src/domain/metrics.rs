use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use statrs::statistics::{Data, Distribution};

/// Daily risk-free rate used by the Sharpe calculation below. The only place this
/// constant, and the `252`/`sqrt(252)` trading-day-count constants, appear.
const DAILY_RISK_FREE_RATE: f64 = 0.04 / 252.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Pure functions over an already-computed return or value series. No I/O, no
/// mutable state; everything here is deterministic given its inputs.
pub struct Metrics;

impl Metrics {
    /// Annualised Sharpe ratio over daily fractional returns. Zero if there are
    /// fewer than two observations or the sample has zero variance.
    pub fn sharpe_ratio(returns: &[Decimal]) -> Decimal {
        if returns.len() < 2 {
            return Decimal::ZERO;
        }

        let values: Vec<f64> = returns.iter().filter_map(|r| r.to_f64()).collect();
        if values.len() != returns.len() {
            return Decimal::ZERO;
        }

        let data = Data::new(values);
        let mean = data.mean().unwrap_or(0.0);
        let stdev = data.std_dev().unwrap_or(0.0);

        if stdev == 0.0 {
            return Decimal::ZERO;
        }

        let sharpe = (mean - DAILY_RISK_FREE_RATE) / stdev * TRADING_DAYS_PER_YEAR.sqrt();
        Decimal::from_f64_retain(sharpe).unwrap_or(Decimal::ZERO)
    }

    /// Annualised volatility: sample stdev of daily returns, scaled by `sqrt(252)`.
    /// Zero for fewer than two observations.
    pub fn volatility(returns: &[Decimal]) -> Decimal {
        if returns.len() < 2 {
            return Decimal::ZERO;
        }

        let values: Vec<f64> = returns.iter().filter_map(|r| r.to_f64()).collect();
        if values.len() != returns.len() {
            return Decimal::ZERO;
        }

        let stdev = Data::new(values).std_dev().unwrap_or(0.0);

        Decimal::from_f64_retain(stdev * TRADING_DAYS_PER_YEAR.sqrt()).unwrap_or(Decimal::ZERO)
    }

    /// Maximum drawdown and its duration (in calendar days), computed from actual
    /// portfolio values — never approximated from a compounded return series.
    /// Returns `(0, 0)` for an empty sequence.
    pub fn max_drawdown(values: &[(NaiveDate, Decimal)]) -> (Decimal, i64) {
        if values.is_empty() {
            return (Decimal::ZERO, 0);
        }

        let mut running_max = values[0].1;
        let mut running_max_date = values[0].0;
        let mut worst_drawdown = Decimal::ZERO;
        let mut worst_duration = 0i64;

        for &(date, value) in values {
            if value > running_max {
                running_max = value;
                running_max_date = date;
            }

            if running_max > Decimal::ZERO {
                let drawdown = (value - running_max) / running_max;
                if drawdown < worst_drawdown {
                    worst_drawdown = drawdown;
                    worst_duration = (date - running_max_date).num_days();
                }
            }
        }

        (worst_drawdown, worst_duration)
    }

    /// `0.04 / 252`, exposed for callers that want to report the rate used.
    pub fn daily_risk_free_rate() -> Decimal {
        dec!(0.04) / dec!(252)
    }
}
