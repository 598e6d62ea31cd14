use chrono::NaiveDate;
use proptest::prelude::*;
use quantback::domain::monte_carlo::{MonteCarloConfig, MonteCarloEngine, SimulationMethod};
use rust_decimal::Decimal;

fn monthly_timeseries(num_months: usize, drift_bp: i64) -> Vec<(NaiveDate, Decimal)> {
    let mut out = Vec::new();
    let mut price_cents: i64 = 10_000;
    for m in 0..num_months {
        let year = 2018 + (m / 12) as i32;
        let month = (m % 12) as u32 + 1;
        let d = NaiveDate::from_ymd_opt(year, month, 28).unwrap();
        price_cents = (price_cents + drift_bp).max(1);
        out.push((d, Decimal::new(price_cents, 2)));
    }
    out
}

fn method_for(tag: u8) -> SimulationMethod {
    match tag % 3 {
        0 => SimulationMethod::Normal,
        1 => SimulationMethod::Bootstrap,
        _ => SimulationMethod::TStudent,
    }
}

proptest! {
    /// Invariant 5: given the same seed and inputs, two runs are byte-identical,
    /// even though simulations execute in parallel.
    #[test]
    fn same_seed_gives_identical_result(
        num_months in 6usize..48,
        drift_bp in -30i64..30,
        months in 3usize..24,
        seed in any::<u64>(),
        method_tag in any::<u8>(),
    ) {
        let timeseries = monthly_timeseries(num_months, drift_bp);
        let engine = MonteCarloEngine::from_timeseries(&timeseries).unwrap();
        let config = MonteCarloConfig {
            monthly_investment: Decimal::new(10_000, 2),
            investment_months: months,
            num_simulations: 64,
            initial_price: None,
            seed: Some(seed),
            method: method_for(method_tag),
            max_cells: 10_000_000,
        };

        let first = engine.simulate_dca(&config).unwrap();
        let second = engine.simulate_dca(&config).unwrap();

        prop_assert_eq!(
            serde_json::to_string(&first.final_percentiles).unwrap(),
            serde_json::to_string(&second.final_percentiles).unwrap()
        );
        prop_assert_eq!(
            serde_json::to_string(&first.chart_data).unwrap(),
            serde_json::to_string(&second.chart_data).unwrap()
        );
    }

    /// Invariant 6: the chart has exactly `investment_months + 1` rows, and within
    /// each row the percentile columns are monotonically nondecreasing.
    #[test]
    fn chart_shape_and_percentile_monotonicity_hold(
        num_months in 6usize..48,
        drift_bp in -30i64..30,
        months in 3usize..24,
        seed in any::<u64>(),
        method_tag in any::<u8>(),
    ) {
        let timeseries = monthly_timeseries(num_months, drift_bp);
        let engine = MonteCarloEngine::from_timeseries(&timeseries).unwrap();
        let config = MonteCarloConfig {
            monthly_investment: Decimal::new(10_000, 2),
            investment_months: months,
            num_simulations: 64,
            initial_price: None,
            seed: Some(seed),
            method: method_for(method_tag),
            max_cells: 10_000_000,
        };

        let result = engine.simulate_dca(&config).unwrap();

        prop_assert_eq!(result.chart_data.len(), months + 1);
        for point in &result.chart_data {
            prop_assert!(point.p5 <= point.p10);
            prop_assert!(point.p10 <= point.p25);
            prop_assert!(point.p25 <= point.p50);
            prop_assert!(point.p50 <= point.p75);
            prop_assert!(point.p75 <= point.p90);
            prop_assert!(point.p90 <= point.p95);
        }
        prop_assert_eq!(result.sample_paths.len(), 20.min(config.num_simulations));
        prop_assert_eq!(result.histogram.len(), 50);
    }
}
