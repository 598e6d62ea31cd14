use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::domain::price_service::PriceService;
use crate::domain::strategies::{BacktestContext, Strategy};
use crate::domain::types::{Action, AssetId, Day};

/// Tops up the position on the first trading day of each month so the portfolio
/// value tracks a linearly growing target. Buy-only: never sells to shed value
/// above target (see design notes).
pub struct VaStrategy {
    asset_id: AssetId,
    initial_investment: Decimal,
    target_increment_amount: Decimal,
    trading_days: Vec<Day>,
    period_number: u64,
}

impl VaStrategy {
    pub fn new(
        asset_id: AssetId,
        initial_investment: Decimal,
        target_increment_amount: Decimal,
        trading_days: Vec<Day>,
    ) -> Self {
        Self {
            asset_id,
            initial_investment,
            target_increment_amount,
            trading_days,
            period_number: 0,
        }
    }

    fn should_invest_today(&self, day: Day) -> bool {
        PriceService::is_first_trading_day_of_month(day, &self.trading_days)
    }
}

impl Strategy for VaStrategy {
    fn on_day(&mut self, context: &BacktestContext<'_>) -> Vec<Action> {
        if !self.should_invest_today(context.current_date) {
            return Vec::new();
        }

        let target = self.initial_investment
            + self.target_increment_amount * Decimal::from(self.period_number);
        let shortfall = target - context.last_value();

        if shortfall > Decimal::ZERO {
            self.period_number += 1;
            vec![Action::Buy {
                asset: self.asset_id,
                dollar_amount: shortfall,
            }]
        } else {
            Vec::new()
        }
    }

    fn get_asset_ids(&self) -> Vec<AssetId> {
        vec![self.asset_id]
    }

    fn get_parameters(&self) -> Value {
        json!({
            "strategy": "va",
            "asset_id": self.asset_id,
            "initial_investment": self.initial_investment,
            "target_increment_amount": self.target_increment_amount,
        })
    }
}
