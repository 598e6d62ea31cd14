use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque asset identifier; primary key across the system.
pub type AssetId = i64;

/// A calendar date on which at least one asset has a recorded price.
pub type Day = NaiveDate;

/// Mapping from held asset to share count. Never negative after a valid action.
pub type Holdings = HashMap<AssetId, Decimal>;

/// One instruction a strategy hands back to the engine for a single trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Buy { asset: AssetId, dollar_amount: Decimal },
    Sell { asset: AssetId, quantity: Decimal },
}

impl Action {
    pub fn asset(&self) -> AssetId {
        match self {
            Action::Buy { asset, .. } => *asset,
            Action::Sell { asset, .. } => *asset,
        }
    }
}

/// Snapshot of portfolio state at the close of a single trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: Day,
    pub total_value: Decimal,
    pub holdings: Holdings,
    pub cash_flow_today: Decimal,
    pub daily_return_pct: Decimal,
    pub daily_return_abs: Decimal,
}

/// Aggregate risk/performance figures computed once a backtest run completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub sharpe: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_duration_days: i64,
    pub volatility: Decimal,
    pub days_analysed: usize,
    pub investments_made: usize,
    pub peak_value: Decimal,
    pub trough_value: Decimal,
}

/// Full result of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub start_date: Day,
    pub end_date: Day,
    pub total_invested: Decimal,
    pub final_value: Decimal,
    pub total_return_pct: Decimal,
    pub total_return_abs: Decimal,
    pub avg_daily_return: Decimal,
    pub metrics: BacktestMetrics,
    pub history: Vec<DailySnapshot>,
}

/// Which strategy variant a request asked for, and the strategy-specific parameters
/// that came with it. Mirrors the `parameters` object of the JSON request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyRequest {
    BuyAndHold {
        allocation: Option<HashMap<AssetId, Decimal>>,
        initial_investment: Decimal,
    },
    Dca {
        asset_id: AssetId,
        initial_investment: Decimal,
        amount_per_period: Decimal,
        frequency: DcaFrequency,
    },
    Va {
        asset_id: AssetId,
        initial_investment: Decimal,
        target_increment_amount: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DcaFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl std::str::FromStr for DcaFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(DcaFrequency::Daily),
            "weekly" => Ok(DcaFrequency::Weekly),
            "monthly" => Ok(DcaFrequency::Monthly),
            other => Err(other.to_string()),
        }
    }
}

/// A full backtest request as received at the JSON boundary (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub asset_ids: Vec<AssetId>,
    pub start_date: Day,
    pub end_date: Day,
    pub initial_cash: Decimal,
    pub strategy: StrategyRequest,
}

/// Envelope returned to the caller: `data` matches `BacktestResult` field-for-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResponse {
    pub backtest_id: Uuid,
    pub strategy: String,
    pub parameters: serde_json::Value,
    pub data: BacktestResult,
}

/// A Monte Carlo DCA projection request at the JSON boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloRequest {
    pub asset_id: AssetId,
    pub monthly_investment: Decimal,
    pub investment_months: i64,
    pub num_simulations: u64,
    pub initial_price: Option<Decimal>,
    pub seed: Option<u64>,
    pub method: crate::domain::monte_carlo::SimulationMethod,
}

/// Envelope returned to the caller for a Monte Carlo projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResponse {
    pub asset_id: AssetId,
    pub data: crate::domain::monte_carlo::MonteCarloResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_asset_reads_either_variant() {
        let buy = Action::Buy { asset: 1, dollar_amount: dec!(10) };
        let sell = Action::Sell { asset: 2, quantity: dec!(1) };
        assert_eq!(buy.asset(), 1);
        assert_eq!(sell.asset(), 2);
    }

    #[test]
    fn dca_frequency_parses_known_values() {
        assert_eq!("daily".parse::<DcaFrequency>().unwrap(), DcaFrequency::Daily);
        assert_eq!("weekly".parse::<DcaFrequency>().unwrap(), DcaFrequency::Weekly);
        assert_eq!("monthly".parse::<DcaFrequency>().unwrap(), DcaFrequency::Monthly);
        assert!("fortnightly".parse::<DcaFrequency>().is_err());
    }
}
