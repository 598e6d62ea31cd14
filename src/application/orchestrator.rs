use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::application::ports::{BacktestRunRecord, BacktestRunRepository};
use crate::domain::engine::{BacktestEngine, CancellationToken};
use crate::domain::errors::{BacktestError, ValidationError};
use crate::domain::monte_carlo::MonteCarloEngine;
use crate::domain::price_service::PriceService;
use crate::domain::strategies::StrategyFactory;
use crate::domain::types::{
    BacktestRequest, BacktestResponse, Day, MonteCarloRequest, MonteCarloResponse,
};

const MIN_RANGE_DAYS: i64 = 7;
const MAX_RANGE_DAYS: i64 = 365 * 10;
const MAX_INVESTMENT_MONTHS: i64 = 600;

/// Validates requests, dispatches to the right strategy and engine, and
/// (optionally) persists a record of what ran. This is the only layer a caller
/// needs to talk to; everything below it is pure domain logic.
pub struct Orchestrator<'a> {
    price_service: &'a PriceService,
    repository: Option<&'a (dyn BacktestRunRepository)>,
    monte_carlo_max_cells: u64,
    max_num_simulations: u64,
}

impl<'a> Orchestrator<'a> {
    pub fn new(price_service: &'a PriceService, monte_carlo_max_cells: u64, max_num_simulations: u64) -> Self {
        Self { price_service, repository: None, monte_carlo_max_cells, max_num_simulations }
    }

    pub fn with_repository(mut self, repository: &'a dyn BacktestRunRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    #[instrument(skip(self, request, cancellation))]
    pub async fn run_backtest(
        &self,
        request: &BacktestRequest,
        today: Day,
        cancellation: &CancellationToken,
    ) -> Result<BacktestResponse, BacktestError> {
        self.validate_backtest_request(request, today)?;

        let trading_days = self.price_service.trading_days(&request.asset_ids, request.start_date, request.end_date);
        let mut strategy = StrategyFactory::create(&request.strategy, &request.asset_ids, &trading_days)?;

        let engine = BacktestEngine::new(self.price_service);
        let result = engine.run(
            strategy.as_mut(),
            request.start_date,
            request.end_date,
            request.initial_cash,
            cancellation,
        )?;

        let strategy_name = strategy_label(&request.strategy);
        let parameters = strategy.get_parameters();
        let response = BacktestResponse {
            backtest_id: Uuid::new_v4(),
            strategy: strategy_name.to_string(),
            parameters,
            data: result,
        };

        self.persist(&response, request).await;

        Ok(response)
    }

    #[instrument(skip(self, request))]
    pub async fn run_monte_carlo(
        &self,
        request: &MonteCarloRequest,
    ) -> Result<MonteCarloResponse, BacktestError> {
        self.validate_monte_carlo_request(request)?;

        let timeseries = self.price_service.timeseries(request.asset_id);
        let engine = MonteCarloEngine::from_timeseries(&timeseries)?;

        let config = crate::domain::monte_carlo::MonteCarloConfig {
            monthly_investment: request.monthly_investment,
            investment_months: request.investment_months as usize,
            num_simulations: request.num_simulations as usize,
            initial_price: request.initial_price.and_then(|p| p.to_f64()),
            seed: request.seed,
            method: request.method,
            max_cells: self.monte_carlo_max_cells,
        };

        let data = engine.simulate_dca(&config)?;

        Ok(MonteCarloResponse { asset_id: request.asset_id, data })
    }

    fn validate_backtest_request(&self, request: &BacktestRequest, today: Day) -> Result<(), ValidationError> {
        if request.initial_cash < Decimal::ZERO {
            return Err(ValidationError::NegativeCash(request.initial_cash));
        }

        for &asset in &request.asset_ids {
            if !self.price_service.has_asset(asset) {
                return Err(ValidationError::UnknownAsset(asset));
            }
        }

        if request.start_date >= request.end_date {
            return Err(ValidationError::StartNotBeforeEnd {
                start: request.start_date,
                end: request.end_date,
            });
        }
        if request.start_date >= today {
            return Err(ValidationError::StartNotInPast(request.start_date));
        }
        if request.end_date >= today {
            return Err(ValidationError::EndNotInPast(request.end_date));
        }

        let days = (request.end_date - request.start_date).num_days();
        if days < MIN_RANGE_DAYS || days > MAX_RANGE_DAYS {
            return Err(ValidationError::RangeOutOfBounds { days, min: MIN_RANGE_DAYS, max: MAX_RANGE_DAYS });
        }

        for &asset in &request.asset_ids {
            if let Some((first, last)) = self.price_service.availability(asset) {
                if request.start_date < first || request.end_date > last {
                    return Err(ValidationError::DataAvailability {
                        asset,
                        first_available: first,
                        last_available: last,
                        requested_start: request.start_date,
                        requested_end: request.end_date,
                    });
                }
            }
        }

        Ok(())
    }

    fn validate_monte_carlo_request(&self, request: &MonteCarloRequest) -> Result<(), ValidationError> {
        if !self.price_service.has_asset(request.asset_id) {
            return Err(ValidationError::UnknownAsset(request.asset_id));
        }
        if request.investment_months < 1 || request.investment_months > MAX_INVESTMENT_MONTHS {
            return Err(ValidationError::InvestmentMonthsOutOfBounds {
                got: request.investment_months,
                max: MAX_INVESTMENT_MONTHS,
            });
        }
        if request.num_simulations < 1 || request.num_simulations > self.max_num_simulations {
            return Err(ValidationError::NumSimulationsOutOfBounds {
                got: request.num_simulations,
                max: self.max_num_simulations,
            });
        }
        if request.monthly_investment <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveInvestment(request.monthly_investment));
        }
        Ok(())
    }

    async fn persist(&self, response: &BacktestResponse, request: &BacktestRequest) {
        let Some(repository) = self.repository else { return };

        let record = BacktestRunRecord {
            id: response.backtest_id,
            created_at: Utc::now(),
            strategy: response.strategy.clone(),
            parameters_json: serde_json::to_string(&response.parameters).unwrap_or_default(),
            asset_ids_json: serde_json::to_string(&request.asset_ids).unwrap_or_default(),
            start_date: request.start_date,
            end_date: request.end_date,
            initial_cash: request.initial_cash,
            final_value: response.data.final_value,
            total_return_pct: response.data.total_return_pct,
            sharpe: response.data.metrics.sharpe,
            max_drawdown: response.data.metrics.max_drawdown,
        };

        match repository.save(&record).await {
            Ok(()) => {}
            Err(err) => {
                warn!(backtest_id = %response.backtest_id, error = %err, "failed to persist backtest run, returning result anyway");
                error!(error = %err, "persistence failure swallowed, not propagated to caller");
            }
        }
    }
}

fn strategy_label(request: &crate::domain::types::StrategyRequest) -> &'static str {
    use crate::domain::types::StrategyRequest;
    match request {
        StrategyRequest::BuyAndHold { .. } => "buy_and_hold",
        StrategyRequest::Dca { .. } => "dca",
        StrategyRequest::Va { .. } => "va",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::monte_carlo::SimulationMethod;
    use crate::domain::types::{DcaFrequency, StrategyRequest};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_price_service() -> PriceService {
        let mut observations = Vec::new();
        let mut day = d(2020, 1, 1);
        let end = d(2024, 1, 1);
        let mut price = dec!(100);
        while day <= end {
            if PriceService::is_trading_day(day) {
                observations.push((1, day, price));
                price += dec!(0.01);
            }
            day = day.succ_opt().unwrap();
        }
        PriceService::from_observations(observations)
    }

    #[tokio::test]
    async fn rejects_unknown_asset() {
        let prices = sample_price_service();
        let orchestrator = Orchestrator::new(&prices, 10_000_000, 10_000);

        let request = BacktestRequest {
            asset_ids: vec![999],
            start_date: d(2023, 1, 1),
            end_date: d(2023, 6, 1),
            initial_cash: dec!(1000),
            strategy: StrategyRequest::BuyAndHold {
                allocation: Some(std::collections::HashMap::from([(999, dec!(1.0))])),
                initial_investment: dec!(1000),
            },
        };

        let err = orchestrator
            .run_backtest(&request, d(2024, 1, 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BacktestError::Validation(ValidationError::UnknownAsset(999))));
    }

    #[tokio::test]
    async fn rejects_range_below_minimum() {
        let prices = sample_price_service();
        let orchestrator = Orchestrator::new(&prices, 10_000_000, 10_000);

        let request = BacktestRequest {
            asset_ids: vec![1],
            start_date: d(2023, 1, 1),
            end_date: d(2023, 1, 3),
            initial_cash: dec!(1000),
            strategy: StrategyRequest::Dca {
                asset_id: 1,
                initial_investment: dec!(500),
                amount_per_period: dec!(50),
                frequency: DcaFrequency::Monthly,
            },
        };

        let err = orchestrator
            .run_backtest(&request, d(2024, 1, 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BacktestError::Validation(ValidationError::RangeOutOfBounds { .. })));
    }

    #[tokio::test]
    async fn rejects_start_date_not_strictly_in_past() {
        let prices = sample_price_service();
        let orchestrator = Orchestrator::new(&prices, 10_000_000, 10_000);

        let request = BacktestRequest {
            asset_ids: vec![1],
            start_date: d(2024, 1, 1),
            end_date: d(2024, 6, 1),
            initial_cash: dec!(1000),
            strategy: StrategyRequest::Dca {
                asset_id: 1,
                initial_investment: dec!(500),
                amount_per_period: dec!(50),
                frequency: DcaFrequency::Monthly,
            },
        };

        let err = orchestrator
            .run_backtest(&request, d(2024, 1, 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BacktestError::Validation(ValidationError::StartNotInPast(_))));
    }

    #[tokio::test]
    async fn accepts_well_formed_request_and_runs_to_completion() {
        let prices = sample_price_service();
        let orchestrator = Orchestrator::new(&prices, 10_000_000, 10_000);

        let request = BacktestRequest {
            asset_ids: vec![1],
            start_date: d(2023, 1, 2),
            end_date: d(2023, 6, 1),
            initial_cash: dec!(5000),
            strategy: StrategyRequest::Dca {
                asset_id: 1,
                initial_investment: dec!(1000),
                amount_per_period: dec!(200),
                frequency: DcaFrequency::Monthly,
            },
        };

        let response = orchestrator
            .run_backtest(&request, d(2024, 1, 1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.strategy, "dca");
        assert!(!response.data.history.is_empty());
    }

    #[tokio::test]
    async fn rejects_monte_carlo_request_for_unknown_asset() {
        let prices = sample_price_service();
        let orchestrator = Orchestrator::new(&prices, 10_000_000, 10_000);

        let request = MonteCarloRequest {
            asset_id: 42,
            monthly_investment: dec!(100),
            investment_months: 12,
            num_simulations: 100,
            initial_price: None,
            seed: Some(1),
            method: SimulationMethod::Bootstrap,
        };

        let err = orchestrator.run_monte_carlo(&request).await.unwrap_err();
        assert!(matches!(err, BacktestError::Validation(ValidationError::UnknownAsset(42))));
    }

    #[tokio::test]
    async fn runs_monte_carlo_projection_to_completion() {
        let prices = sample_price_service();
        let orchestrator = Orchestrator::new(&prices, 10_000_000, 10_000);

        let request = MonteCarloRequest {
            asset_id: 1,
            monthly_investment: dec!(100),
            investment_months: 12,
            num_simulations: 50,
            initial_price: None,
            seed: Some(7),
            method: SimulationMethod::Normal,
        };

        let response = orchestrator.run_monte_carlo(&request).await.unwrap();
        assert_eq!(response.data.chart_data.len(), 13);
    }
}
