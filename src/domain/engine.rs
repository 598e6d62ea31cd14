use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::domain::errors::EngineError;
use crate::domain::metrics::Metrics;
use crate::domain::price_service::PriceService;
use crate::domain::strategies::{BacktestContext, Strategy};
use crate::domain::types::{Action, AssetId, BacktestMetrics, BacktestResult, DailySnapshot, Day, Holdings};

/// A cooperative cancellation flag, checked once per trading day. Cheap to clone
/// and share with a caller that wants to abort a long-running backtest.
#[derive(Clone, Default)]
pub struct CancellationToken(std::sync::Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a strategy day by day through the trading-day calendar. Single-threaded,
/// cooperative: days are strictly sequential because holdings carry forward.
pub struct BacktestEngine<'a> {
    price_service: &'a PriceService,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(price_service: &'a PriceService) -> Self {
        Self { price_service }
    }

    #[instrument(skip(self, strategy, cancellation), fields(start_date = %start_date, end_date = %end_date))]
    pub fn run(
        &self,
        strategy: &mut dyn Strategy,
        start_date: Day,
        end_date: Day,
        initial_cash: Decimal,
        cancellation: &CancellationToken,
    ) -> Result<BacktestResult, EngineError> {
        let asset_ids = strategy.get_asset_ids();
        let trading_days = self.price_service.trading_days(&asset_ids, start_date, end_date);
        let prices = self.price_service.price_lookup(&asset_ids, start_date, end_date);

        let mut holdings: Holdings = HashMap::new();
        let mut history: Vec<DailySnapshot> = Vec::with_capacity(trading_days.len());
        let mut investments_made = 0usize;

        for (day_index, &day) in trading_days.iter().enumerate() {
            if cancellation.is_cancelled() {
                return Err(EngineError::Cancelled {
                    days_completed: day_index,
                    days_total: trading_days.len(),
                });
            }

            let context = BacktestContext {
                current_date: day,
                holdings: holdings.clone(),
                price_lookup: &prices,
                history: history.clone(),
            };

            let actions = strategy.on_day(&context);
            investments_made += actions.len();

            let cash_flow = Self::execute_actions(&actions, day, &mut holdings, &prices)?;
            let total_value = Self::value_holdings(&holdings, day, &prices);

            history.push(DailySnapshot {
                date: day,
                total_value,
                holdings: holdings.clone(),
                cash_flow_today: cash_flow,
                daily_return_pct: Decimal::ZERO,
                daily_return_abs: Decimal::ZERO,
            });
        }

        Self::compute_daily_returns(&mut history);
        let metrics = Self::compute_metrics(&history, investments_made);

        let mut total_invested: Decimal = history.iter().map(|s| s.cash_flow_today).sum();
        if total_invested == Decimal::ZERO {
            total_invested = initial_cash;
        }

        let final_value = history.last().map(|s| s.total_value).unwrap_or(Decimal::ZERO);
        let total_return_abs = final_value - total_invested;
        let total_return_pct = if total_invested != Decimal::ZERO {
            total_return_abs / total_invested
        } else {
            Decimal::ZERO
        };
        let avg_daily_return = if !history.is_empty() {
            total_return_pct / Decimal::from(history.len())
        } else {
            Decimal::ZERO
        };

        debug!(days = history.len(), investments_made, "backtest run complete");

        Ok(BacktestResult {
            start_date,
            end_date,
            total_invested,
            final_value,
            total_return_pct,
            total_return_abs,
            avg_daily_return,
            metrics,
            history,
        })
    }

    /// Executes a day's actions against `holdings`, mutating it in place, and
    /// returns the net cash flow for the day. A missing price silently skips the
    /// action (§4.4); an oversell is fatal for the whole run.
    fn execute_actions(
        actions: &[Action],
        day: Day,
        holdings: &mut Holdings,
        prices: &HashMap<(AssetId, Day), Decimal>,
    ) -> Result<Decimal, EngineError> {
        let mut cash_flow = Decimal::ZERO;

        for action in actions {
            let Some(&price) = prices.get(&(action.asset(), day)) else {
                continue;
            };

            match *action {
                Action::Buy { asset, dollar_amount } => {
                    let shares = dollar_amount / price;
                    *holdings.entry(asset).or_insert(Decimal::ZERO) += shares;
                    cash_flow += dollar_amount;
                }
                Action::Sell { asset, quantity } => {
                    let held = holdings.get(&asset).copied().unwrap_or(Decimal::ZERO);
                    if quantity > held {
                        return Err(EngineError::Oversell { asset, quantity, held });
                    }
                    *holdings.get_mut(&asset).unwrap() -= quantity;
                    cash_flow -= quantity * price;
                }
            }
        }

        Ok(cash_flow)
    }

    fn value_holdings(holdings: &Holdings, day: Day, prices: &HashMap<(AssetId, Day), Decimal>) -> Decimal {
        holdings
            .iter()
            .filter(|(_, &shares)| shares > Decimal::ZERO)
            .filter_map(|(&asset, &shares)| prices.get(&(asset, day)).map(|&price| shares * price))
            .sum()
    }

    /// Pass 2: cash flows are treated as occurring at the start of day D, before
    /// market movement, so they are excluded from the day's return.
    fn compute_daily_returns(history: &mut [DailySnapshot]) {
        if history.is_empty() {
            return;
        }

        for i in 1..history.len() {
            let prev_value = history[i - 1].total_value;
            let cash_flow = history[i].cash_flow_today;
            let start_of_day_value = prev_value + cash_flow;
            let value_change = history[i].total_value - start_of_day_value;

            history[i].daily_return_abs = value_change;
            history[i].daily_return_pct = if start_of_day_value > Decimal::ZERO {
                value_change / start_of_day_value
            } else {
                Decimal::ZERO
            };
        }
    }

    fn compute_metrics(history: &[DailySnapshot], investments_made: usize) -> BacktestMetrics {
        if history.len() < 2 {
            return BacktestMetrics {
                sharpe: Decimal::ZERO,
                max_drawdown: Decimal::ZERO,
                max_drawdown_duration_days: 0,
                volatility: Decimal::ZERO,
                days_analysed: history.len(),
                investments_made,
                peak_value: history.first().map(|s| s.total_value).unwrap_or(Decimal::ZERO),
                trough_value: history.first().map(|s| s.total_value).unwrap_or(Decimal::ZERO),
            };
        }

        let returns: Vec<Decimal> = history[1..].iter().map(|s| s.daily_return_pct).collect();
        let values: Vec<(Day, Decimal)> = history.iter().map(|s| (s.date, s.total_value)).collect();
        let (max_drawdown, max_drawdown_duration_days) = Metrics::max_drawdown(&values);

        BacktestMetrics {
            sharpe: Metrics::sharpe_ratio(&returns),
            max_drawdown,
            max_drawdown_duration_days,
            volatility: Metrics::volatility(&returns),
            days_analysed: history.len(),
            investments_made,
            peak_value: history.iter().map(|s| s.total_value).max().unwrap_or(Decimal::ZERO),
            trough_value: history.iter().map(|s| s.total_value).min().unwrap_or(Decimal::ZERO),
        }
    }
}
