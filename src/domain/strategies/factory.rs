use std::collections::HashMap;

use rust_decimal_macros::dec;

use crate::domain::errors::ValidationError;
use crate::domain::strategies::{BuyAndHoldStrategy, DcaStrategy, Strategy, VaStrategy};
use crate::domain::types::{AssetId, Day, StrategyRequest};

/// Constructs the concrete strategy a request asked for. The only place strategy
/// variants are chosen by name; nothing downstream does runtime lookup by string.
pub struct StrategyFactory;

impl StrategyFactory {
    pub fn create(
        request: &StrategyRequest,
        asset_ids: &[AssetId],
        trading_days: &[Day],
    ) -> Result<Box<dyn Strategy>, ValidationError> {
        match request {
            StrategyRequest::BuyAndHold { allocation, initial_investment } => {
                let allocation = match allocation {
                    Some(map) if !map.is_empty() => map.clone(),
                    _ if asset_ids.len() == 1 => HashMap::from([(asset_ids[0], dec!(1.0))]),
                    _ => return Err(ValidationError::MissingParameter("allocation")),
                };
                Ok(Box::new(BuyAndHoldStrategy::new(allocation, *initial_investment)))
            }
            StrategyRequest::Dca { asset_id, initial_investment, amount_per_period, frequency } => {
                Ok(Box::new(DcaStrategy::new(
                    *asset_id,
                    *initial_investment,
                    *amount_per_period,
                    *frequency,
                )))
            }
            StrategyRequest::Va { asset_id, initial_investment, target_increment_amount } => {
                Ok(Box::new(VaStrategy::new(
                    *asset_id,
                    *initial_investment,
                    *target_increment_amount,
                    trading_days.to_vec(),
                )))
            }
        }
    }
}
