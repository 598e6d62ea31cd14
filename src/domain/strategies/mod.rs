mod buy_and_hold;
mod dca;
mod factory;
mod va;

pub use buy_and_hold::BuyAndHoldStrategy;
pub use dca::DcaStrategy;
pub use factory::StrategyFactory;
pub use va::VaStrategy;

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::types::{Action, AssetId, Day, DailySnapshot, Holdings};

/// Everything a strategy sees when it is asked for a day's actions. Strategies may
/// read freely but must not mutate any of this; the engine hands out copies of the
/// mutable parts (`holdings`, `history`) for exactly that reason.
pub struct BacktestContext<'a> {
    pub current_date: Day,
    pub holdings: Holdings,
    pub price_lookup: &'a HashMap<(AssetId, Day), Decimal>,
    pub history: Vec<DailySnapshot>,
}

impl<'a> BacktestContext<'a> {
    /// Total value of the most recent snapshot, or zero if this is the first day.
    pub fn last_value(&self) -> Decimal {
        self.history.last().map(|s| s.total_value).unwrap_or(Decimal::ZERO)
    }
}

/// A stateful per-run strategy that decides what to buy or sell on a given day.
/// Implementations may keep private state across calls within a single run.
pub trait Strategy: Send {
    /// Called once per trading day, in calendar order.
    fn on_day(&mut self, context: &BacktestContext<'_>) -> Vec<Action>;

    /// Stable for the lifetime of the run; queried once before the run starts.
    fn get_asset_ids(&self) -> Vec<AssetId>;

    /// For logging and persistence; not consumed by the engine.
    fn get_parameters(&self) -> Value;
}
