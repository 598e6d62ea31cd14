use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use tracing::{info, instrument};

use crate::domain::errors::ValidationError;

const MONTHS_PER_YEAR: f64 = 12.0;
const HISTOGRAM_BINS: usize = 50;
const MAX_SAMPLE_PATHS: usize = 20;
const PERCENTILE_LEVELS: [u32; 7] = [5, 10, 25, 50, 75, 90, 95];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationMethod {
    Normal,
    Bootstrap,
    TStudent,
}

#[derive(Debug, Clone)]
pub struct MonteCarloConfig {
    pub monthly_investment: Decimal,
    pub investment_months: usize,
    pub num_simulations: usize,
    pub initial_price: Option<f64>,
    pub seed: Option<u64>,
    pub method: SimulationMethod,
    /// Upper bound on `num_simulations * (investment_months + 1)`, enforced by C6
    /// before a run is ever attempted (§5 resource guard). Carried on the config
    /// so the engine can re-check it without depending on the orchestration layer.
    pub max_cells: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPoint {
    pub month: usize,
    pub invested: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub probability_of_loss: f64,
    pub mean_return: f64,
    pub std_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub var_95: f64,
    pub cvar_95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub chart_data: Vec<ChartPoint>,
    pub sample_paths: Vec<Vec<f64>>,
    pub histogram: Vec<HistogramBin>,
    pub total_invested: f64,
    pub final_percentiles: BTreeMap<String, f64>,
    pub risk_metrics: RiskMetrics,
}

/// Fitted Student-t parameters, estimated from the historical monthly returns by
/// matching sample excess kurtosis rather than full maximum-likelihood (a
/// simplification relative to the originating system's `scipy.stats.t.fit`; see
/// DESIGN.md).
struct StudentTFit {
    degrees_of_freedom: f64,
    location: f64,
    scale: f64,
}

/// Derives monthly returns from a daily price series and simulates a DCA strategy
/// forward over synthetic return paths. The numerical kernel works entirely in
/// `f64`; conversion to/from `Decimal` happens only at the boundary.
pub struct MonteCarloEngine {
    historical_returns: Vec<f64>,
    mean: f64,
    stdev: f64,
    last_close: f64,
}

impl MonteCarloEngine {
    /// Builds the engine from a daily adjusted-close timeseries. Collapses to
    /// monthly observations (last close of each `(year, month)`), computes
    /// monthly fractional returns, and drops the first (null) row.
    pub fn from_timeseries(timeseries: &[(NaiveDate, Decimal)]) -> Result<Self, ValidationError> {
        let mut sorted = timeseries.to_vec();
        sorted.sort_by_key(|(date, _)| *date);

        let mut monthly_closes: Vec<f64> = Vec::new();
        let mut current_key: Option<(i32, u32)> = None;

        for &(date, close) in &sorted {
            let key = (date.year(), date.month());
            let close_f64 = close.to_f64().unwrap_or(0.0);
            if current_key == Some(key) {
                *monthly_closes.last_mut().unwrap() = close_f64;
            } else {
                monthly_closes.push(close_f64);
                current_key = Some(key);
            }
        }

        let historical_returns: Vec<f64> = monthly_closes
            .windows(2)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();

        if historical_returns.is_empty() {
            return Err(ValidationError::InsufficientHistory(historical_returns.len()));
        }

        let (mean, stdev) = mean_and_stdev(&historical_returns);
        let last_close = monthly_closes.last().copied().unwrap_or(0.0);

        info!(
            months = historical_returns.len(),
            mean, stdev, "historical return statistics computed"
        );

        Ok(Self { historical_returns, mean, stdev, last_close })
    }

    #[instrument(skip(self, config), fields(method = ?config.method, sims = config.num_simulations))]
    pub fn simulate_dca(&self, config: &MonteCarloConfig) -> Result<MonteCarloResult, ValidationError> {
        if config.investment_months < 1 {
            return Err(ValidationError::InvestmentMonthsOutOfBounds { got: 0, max: 600 });
        }
        if config.num_simulations < 1 {
            return Err(ValidationError::NumSimulationsOutOfBounds { got: 0, max: u64::MAX });
        }
        let requested_cells = (config.num_simulations as u64) * (config.investment_months as u64 + 1);
        if requested_cells > config.max_cells {
            return Err(ValidationError::SimulationTooLarge { requested: requested_cells, max: config.max_cells });
        }

        let initial_price = config.initial_price.unwrap_or(self.last_close);
        let months = config.investment_months;
        let monthly_investment = config.monthly_investment.to_f64().unwrap_or(0.0);
        let student_t_fit = matches!(config.method, SimulationMethod::TStudent)
            .then(|| self.fit_student_t());

        let per_sim: Vec<SimulationOutcome> = (0..config.num_simulations)
            .into_par_iter()
            .map(|sim_index| {
                let mut rng = self.rng_for(config.seed, sim_index);
                let returns = self.generate_returns(config.method, months, &student_t_fit, &mut rng);
                Self::simulate_one_path(initial_price, monthly_investment, &returns)
            })
            .collect();

        let total_invested = monthly_investment * months as f64;
        let final_values: Vec<f64> = per_sim.iter().map(|s| s.final_value).collect();
        let returns_vs_invested: Vec<f64> = final_values
            .iter()
            .map(|&v| if total_invested != 0.0 { (v - total_invested) / total_invested } else { 0.0 })
            .collect();

        let mut sorted_final_values = final_values.clone();
        sorted_final_values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut sorted_returns = returns_vs_invested.clone();
        sorted_returns.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let final_percentiles: BTreeMap<String, f64> = PERCENTILE_LEVELS
            .iter()
            .map(|&p| (p.to_string(), percentile(&sorted_final_values, p as f64)))
            .collect();

        let chart_data = Self::build_chart_data(&per_sim, months, monthly_investment);
        let histogram = build_histogram(&final_values);
        let sample_paths: Vec<Vec<f64>> = per_sim
            .iter()
            .take(MAX_SAMPLE_PATHS.min(per_sim.len()))
            .map(|s| s.portfolio_path.clone())
            .collect();

        let probability_of_loss = final_values.iter().filter(|&&v| v < total_invested).count() as f64
            / final_values.len() as f64;
        let (mean_return, std_return) = mean_and_stdev(&returns_vs_invested);
        let sharpe_ratio = per_sim.iter().map(|s| s.periodic_sharpe).sum::<f64>() / per_sim.len() as f64;
        let max_drawdown = per_sim.iter().map(|s| s.max_drawdown).sum::<f64>() / per_sim.len() as f64;
        let var_95 = percentile(&sorted_returns, 5.0);
        let cvar_95 = {
            let tail: Vec<f64> = returns_vs_invested.iter().copied().filter(|&r| r <= var_95).collect();
            if tail.is_empty() { var_95 } else { mean_and_stdev(&tail).0 }
        };

        Ok(MonteCarloResult {
            chart_data,
            sample_paths,
            histogram,
            total_invested,
            final_percentiles,
            risk_metrics: RiskMetrics {
                probability_of_loss,
                mean_return,
                std_return,
                sharpe_ratio,
                max_drawdown,
                var_95,
                cvar_95,
            },
        })
    }

    /// Per-simulation RNG: deterministic function of `(seed, sim_index)` when a
    /// seed is supplied, so reruns are byte-identical even though simulations run
    /// in parallel; OS entropy otherwise.
    fn rng_for(&self, seed: Option<u64>, sim_index: usize) -> StdRng {
        match seed {
            Some(base) => {
                let mixed = base ^ (sim_index as u64).wrapping_mul(0x9E3779B97F4A7C15);
                StdRng::seed_from_u64(mixed)
            }
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    fn generate_returns(
        &self,
        method: SimulationMethod,
        months: usize,
        student_t_fit: &Option<StudentTFit>,
        rng: &mut StdRng,
    ) -> Vec<f64> {
        match method {
            SimulationMethod::Normal => (0..months).map(|_| sample_normal(self.mean, self.stdev, rng)).collect(),
            SimulationMethod::Bootstrap => (0..months)
                .map(|_| self.historical_returns[rng.random_range(0..self.historical_returns.len())])
                .collect(),
            SimulationMethod::TStudent => {
                let fit = student_t_fit.as_ref().expect("student-t fit computed when method is TStudent");
                (0..months).map(|_| sample_student_t(fit, rng)).collect()
            }
        }
    }

    /// Moment-based Student-t fit: location is the sample mean; degrees of
    /// freedom come from excess kurtosis (`df = 6/excess_kurtosis + 4`), clamped
    /// to a sane range; scale is backed out from the known t-distribution
    /// variance formula `var = scale^2 * df / (df - 2)`.
    fn fit_student_t(&self) -> StudentTFit {
        let excess_kurtosis = excess_kurtosis(&self.historical_returns, self.mean, self.stdev);
        let degrees_of_freedom = if excess_kurtosis > 0.0 {
            (6.0 / excess_kurtosis + 4.0).clamp(3.0, 200.0)
        } else {
            30.0
        };
        let scale = if degrees_of_freedom > 2.0 {
            self.stdev * ((degrees_of_freedom - 2.0) / degrees_of_freedom).sqrt()
        } else {
            self.stdev
        };
        StudentTFit { degrees_of_freedom, location: self.mean, scale }
    }

    fn simulate_one_path(initial_price: f64, monthly_investment: f64, returns: &[f64]) -> SimulationOutcome {
        let months = returns.len();
        let mut price_path = Vec::with_capacity(months);
        let mut cumulative_shares = Vec::with_capacity(months);
        let mut portfolio_path = Vec::with_capacity(months + 1);
        portfolio_path.push(0.0);

        let mut price = initial_price;
        let mut shares = 0.0;

        for &r in returns {
            price *= 1.0 + r;
            price_path.push(price);
            shares += monthly_investment / price;
            cumulative_shares.push(shares);
            portfolio_path.push(shares * price);
        }

        let final_value = *portfolio_path.last().unwrap_or(&0.0);

        let (mean_return, std_return) = mean_and_stdev(returns);
        let periodic_sharpe = mean_return / std_return.max(1e-10) * MONTHS_PER_YEAR.sqrt();

        let mut running_max = portfolio_path[0];
        let mut worst = 0.0f64;
        for &v in &portfolio_path {
            running_max = running_max.max(v);
            let drawdown = (v - running_max) / running_max.max(1.0);
            worst = worst.min(drawdown);
        }

        SimulationOutcome {
            portfolio_path,
            final_value,
            periodic_sharpe: if std_return == 0.0 { 0.0 } else { periodic_sharpe },
            max_drawdown: worst,
        }
    }

    fn build_chart_data(per_sim: &[SimulationOutcome], months: usize, monthly_investment: f64) -> Vec<ChartPoint> {
        (0..=months)
            .map(|month| {
                let mut column: Vec<f64> = per_sim.iter().map(|s| s.portfolio_path[month]).collect();
                column.sort_by(|a, b| a.partial_cmp(b).unwrap());
                ChartPoint {
                    month,
                    invested: monthly_investment * month as f64,
                    p5: percentile(&column, 5.0),
                    p10: percentile(&column, 10.0),
                    p25: percentile(&column, 25.0),
                    p50: percentile(&column, 50.0),
                    p75: percentile(&column, 75.0),
                    p90: percentile(&column, 90.0),
                    p95: percentile(&column, 95.0),
                }
            })
            .collect()
    }
}

struct SimulationOutcome {
    portfolio_path: Vec<f64>,
    final_value: f64,
    periodic_sharpe: f64,
    max_drawdown: f64,
}

/// Mean and (sample) standard deviation of a value slice, via the `statrs`
/// descriptive-statistics surface (the same `Data::new(..).mean()/.std_dev()`
/// idiom used elsewhere in this codebase for its own `f64`-boundary statistics).
fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    let data = Data::new(values.to_vec());
    (data.mean().unwrap_or(0.0), data.std_dev().unwrap_or(0.0))
}

/// Sample excess kurtosis (fourth standardized moment minus 3), used only to fit
/// the Student-t degrees of freedom. `statrs` has no kurtosis accessor on `Data`,
/// so this is computed directly from the central moments.
fn excess_kurtosis(values: &[f64], mean: f64, stdev: f64) -> f64 {
    if stdev == 0.0 || values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let fourth_moment = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    fourth_moment / stdev.powi(4) - 3.0
}

/// Standard normal sample via Box-Muller, scaled to `N(mean, stdev^2)`.
fn sample_normal(mean: f64, stdev: f64, rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + stdev * z
}

/// Student-t sample via `t = z / sqrt(chi_sq(df) / df)`, with the chi-square
/// variate built as a sum of `round(df)` squared standard normals.
fn sample_student_t(fit: &StudentTFit, rng: &mut StdRng) -> f64 {
    let z = sample_normal(0.0, 1.0, rng);
    let df_int = fit.degrees_of_freedom.round().max(1.0) as usize;
    let chi_sq: f64 = (0..df_int).map(|_| sample_normal(0.0, 1.0, rng).powi(2)).sum();
    let t = z / (chi_sq / fit.degrees_of_freedom).sqrt();
    fit.location + fit.scale * t
}

/// Linear-interpolation percentile over an already-sorted slice, matching the
/// convention used by `numpy.percentile`'s default method.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

fn build_histogram(final_values: &[f64]) -> Vec<HistogramBin> {
    let min = final_values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = final_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if !min.is_finite() || !max.is_finite() {
        return Vec::new();
    }

    let width = if max > min { (max - min) / HISTOGRAM_BINS as f64 } else { 1.0 };

    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for &v in final_values {
        let bin = if max > min {
            (((v - min) / width) as usize).min(HISTOGRAM_BINS - 1)
        } else {
            0
        };
        counts[bin] += 1;
    }

    (0..HISTOGRAM_BINS)
        .map(|i| HistogramBin {
            min: min + width * i as f64,
            max: min + width * (i + 1) as f64,
            count: counts[i],
        })
        .collect()
}
