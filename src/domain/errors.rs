use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::types::AssetId;

/// Errors surfaced to a caller before a run ever starts: always the caller's fault,
/// never retried.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unknown asset id: {0}")]
    UnknownAsset(AssetId),

    #[error("start_date {start} must be strictly before end_date {end}")]
    StartNotBeforeEnd { start: NaiveDate, end: NaiveDate },

    #[error("start_date {0} must be strictly in the past")]
    StartNotInPast(NaiveDate),

    #[error("end_date {0} must be strictly in the past")]
    EndNotInPast(NaiveDate),

    #[error("date range is {days} days; must be between {min} and {max} days")]
    RangeOutOfBounds { days: i64, min: i64, max: i64 },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("missing required parameter '{0}' for this strategy")]
    MissingParameter(&'static str),

    #[error("invalid DCA frequency: {0}")]
    InvalidFrequency(String),

    #[error("initial_cash must be non-negative, got {0}")]
    NegativeCash(Decimal),

    #[error(
        "asset {asset} has data from {first_available} to {last_available}; \
         requested range {requested_start}..{requested_end} falls outside it"
    )]
    DataAvailability {
        asset: AssetId,
        first_available: NaiveDate,
        last_available: NaiveDate,
        requested_start: NaiveDate,
        requested_end: NaiveDate,
    },

    #[error("investment_months must be between 1 and {max}, got {got}")]
    InvestmentMonthsOutOfBounds { got: i64, max: i64 },

    #[error("num_simulations must be between 1 and {max}, got {got}")]
    NumSimulationsOutOfBounds { got: u64, max: u64 },

    #[error("monthly_investment must be positive, got {0}")]
    NonPositiveInvestment(Decimal),

    #[error("simulation would allocate {requested} cells, above the configured ceiling of {max}")]
    SimulationTooLarge { requested: u64, max: u64 },

    #[error("historical timeseries has no usable monthly returns (need at least 1, got {0})")]
    InsufficientHistory(usize),
}

/// A failure that occurs while the engine is mid-run: either an invariant was broken
/// or the run was stopped cooperatively. Never a caller mistake.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot sell {quantity} of asset {asset}: only {held} held")]
    Oversell {
        asset: AssetId,
        quantity: Decimal,
        held: Decimal,
    },

    #[error("run cancelled after {days_completed} of {days_total} trading days")]
    Cancelled {
        days_completed: usize,
        days_total: usize,
    },
}

/// Infrastructure and external-dependency failures: price store or history store
/// unreachable. Distinct from domain errors so a persistence hiccup can never be
/// mistaken for a validation or engine-invariant failure.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("price store unavailable: {0}")]
    PriceStoreUnavailable(String),

    #[error("history store unavailable: {0}")]
    HistoryStoreUnavailable(#[from] anyhow::Error),
}

/// Top-level error returned by the orchestration layer (C6), folding the three
/// kinds above into one type at the boundary the caller actually sees.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversell_message_names_asset_and_quantities() {
        let err = EngineError::Oversell {
            asset: 1,
            quantity: Decimal::from(10),
            held: Decimal::from(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("5"));
        assert!(msg.contains("asset 1"));
    }

    #[test]
    fn data_availability_message_names_window() {
        let err = ValidationError::DataAvailability {
            asset: 7,
            first_available: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            last_available: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            requested_start: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            requested_end: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("asset 7"));
        assert!(msg.contains("2020-01-01"));
    }
}
