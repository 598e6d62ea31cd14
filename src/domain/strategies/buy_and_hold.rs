use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::domain::strategies::{BacktestContext, Strategy};
use crate::domain::types::{Action, AssetId};

/// Buys once, on the first day it is invoked, split across `allocation` by weight.
pub struct BuyAndHoldStrategy {
    allocation: HashMap<AssetId, Decimal>,
    initial_investment: Decimal,
    already_invested: bool,
}

impl BuyAndHoldStrategy {
    pub fn new(allocation: HashMap<AssetId, Decimal>, initial_investment: Decimal) -> Self {
        Self {
            allocation,
            initial_investment,
            already_invested: false,
        }
    }

    /// Single-asset convenience constructor: defaults to `{asset: 1.0}`.
    pub fn single_asset(asset: AssetId, initial_investment: Decimal) -> Self {
        Self::new(HashMap::from([(asset, Decimal::ONE)]), initial_investment)
    }
}

impl Strategy for BuyAndHoldStrategy {
    fn on_day(&mut self, _context: &BacktestContext<'_>) -> Vec<Action> {
        if self.already_invested {
            return Vec::new();
        }
        self.already_invested = true;

        self.allocation
            .iter()
            .map(|(&asset, &weight)| Action::Buy {
                asset,
                dollar_amount: self.initial_investment * weight,
            })
            .collect()
    }

    fn get_asset_ids(&self) -> Vec<AssetId> {
        self.allocation.keys().copied().collect()
    }

    fn get_parameters(&self) -> Value {
        json!({
            "strategy": "buy_and_hold",
            "initial_investment": self.initial_investment,
            "allocation": self.allocation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Day;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;

    fn ctx(date: Day, price_lookup: &StdHashMap<(AssetId, Day), Decimal>) -> BacktestContext<'_> {
        BacktestContext {
            current_date: date,
            holdings: StdHashMap::new(),
            price_lookup,
            history: Vec::new(),
        }
    }

    #[test]
    fn buys_full_allocation_on_first_day_only() {
        let mut strategy = BuyAndHoldStrategy::single_asset(1, dec!(1000));
        let prices = StdHashMap::new();
        let day1 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();

        let actions_day1 = strategy.on_day(&ctx(day1, &prices));
        assert_eq!(actions_day1, vec![Action::Buy { asset: 1, dollar_amount: dec!(1000) }]);

        let actions_day2 = strategy.on_day(&ctx(day2, &prices));
        assert!(actions_day2.is_empty());
    }

    #[test]
    fn splits_investment_by_allocation_weight() {
        let allocation = StdHashMap::from([(1, dec!(0.6)), (2, dec!(0.4))]);
        let mut strategy = BuyAndHoldStrategy::new(allocation, dec!(1000));
        let prices = StdHashMap::new();
        let day1 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let mut actions = strategy.on_day(&ctx(day1, &prices));
        actions.sort_by_key(|a| a.asset());

        assert_eq!(
            actions,
            vec![
                Action::Buy { asset: 1, dollar_amount: dec!(600.0) },
                Action::Buy { asset: 2, dollar_amount: dec!(400.0) },
            ]
        );
    }
}
