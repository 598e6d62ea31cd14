use chrono::Datelike;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::domain::strategies::{BacktestContext, Strategy};
use crate::domain::types::{Action, AssetId, DcaFrequency, Day};

/// Fixed-dollar periodic purchases on a daily, weekly, or monthly cadence.
pub struct DcaStrategy {
    asset_id: AssetId,
    initial_investment: Decimal,
    amount_per_period: Decimal,
    frequency: DcaFrequency,
    already_invested_initial: bool,
    last_investment_date: Option<Day>,
}

impl DcaStrategy {
    pub fn new(
        asset_id: AssetId,
        initial_investment: Decimal,
        amount_per_period: Decimal,
        frequency: DcaFrequency,
    ) -> Self {
        Self {
            asset_id,
            initial_investment,
            amount_per_period,
            frequency,
            already_invested_initial: false,
            last_investment_date: None,
        }
    }

    fn cadence_elapsed(&self, current: Day) -> bool {
        let Some(last) = self.last_investment_date else {
            return true;
        };
        match self.frequency {
            DcaFrequency::Daily => true,
            DcaFrequency::Weekly => (current - last).num_days() >= 7,
            DcaFrequency::Monthly => (current.year(), current.month()) != (last.year(), last.month()),
        }
    }
}

impl Strategy for DcaStrategy {
    fn on_day(&mut self, context: &BacktestContext<'_>) -> Vec<Action> {
        if !self.already_invested_initial {
            self.already_invested_initial = true;
            self.last_investment_date = Some(context.current_date);
            return vec![Action::Buy {
                asset: self.asset_id,
                dollar_amount: self.initial_investment,
            }];
        }

        if self.cadence_elapsed(context.current_date) {
            self.last_investment_date = Some(context.current_date);
            return vec![Action::Buy {
                asset: self.asset_id,
                dollar_amount: self.amount_per_period,
            }];
        }

        Vec::new()
    }

    fn get_asset_ids(&self) -> Vec<AssetId> {
        vec![self.asset_id]
    }

    fn get_parameters(&self) -> Value {
        json!({
            "strategy": "dca",
            "asset_id": self.asset_id,
            "initial_investment": self.initial_investment,
            "amount_per_period": self.amount_per_period,
            "frequency": format!("{:?}", self.frequency).to_lowercase(),
        })
    }
}
