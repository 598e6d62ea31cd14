//! quantback - headless portfolio backtest and Monte Carlo projection CLI.
//!
//! Runs without a GUI or HTTP server: reads a price fixture from disk, runs one
//! backtest or Monte Carlo projection, and prints the JSON result to stdout.
//!
//! # Usage
//! ```sh
//! quantback backtest --prices prices.csv --asset 1 --start 2023-01-01 --end 2023-06-01 \
//!     --strategy dca --amount 1000 --period-amount 100 --frequency monthly
//! quantback monte-carlo --prices prices.csv --asset 1 --monthly-investment 500 --months 24
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

use quantback::application::orchestrator::Orchestrator;
use quantback::domain::engine::CancellationToken;
use quantback::domain::errors::BacktestError;
use quantback::domain::monte_carlo::SimulationMethod;
use quantback::domain::price_service::PriceService;
use quantback::domain::types::{
    AssetId, BacktestRequest, DcaFrequency, MonteCarloRequest, StrategyRequest,
};

#[derive(Parser)]
#[command(name = "quantback", version, about = "Portfolio backtest and Monte Carlo projection engine")]
struct Cli {
    /// CSV fixture with columns: asset_id,date,close
    #[arg(long, global = true)]
    prices: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Backtest {
        #[arg(long)]
        asset: AssetId,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "0")]
        initial_cash: Decimal,
        #[arg(long, value_enum)]
        strategy: StrategyKind,
        #[arg(long, default_value = "0")]
        amount: Decimal,
        #[arg(long, default_value = "0")]
        period_amount: Decimal,
        #[arg(long, default_value = "monthly")]
        frequency: String,
    },
    MonteCarlo {
        #[arg(long)]
        asset: AssetId,
        #[arg(long)]
        monthly_investment: Decimal,
        #[arg(long)]
        months: i64,
        #[arg(long, default_value = "1000")]
        simulations: u64,
        #[arg(long, value_enum, default_value = "bootstrap")]
        method: MethodArg,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum StrategyKind {
    BuyAndHold,
    Dca,
    Va,
}

#[derive(Clone, clap::ValueEnum)]
enum MethodArg {
    Normal,
    Bootstrap,
    TStudent,
}

impl From<MethodArg> for SimulationMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Normal => SimulationMethod::Normal,
            MethodArg::Bootstrap => SimulationMethod::Bootstrap,
            MethodArg::TStudent => SimulationMethod::TStudent,
        }
    }
}

fn load_price_service(path: &PathBuf) -> anyhow::Result<PriceService> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut observations = Vec::new();

    for record in reader.records() {
        let record = record?;
        let asset_id: AssetId = record.get(0).unwrap_or_default().parse()?;
        let date: NaiveDate = record.get(1).unwrap_or_default().parse()?;
        let close: Decimal = record.get(2).unwrap_or_default().parse()?;
        observations.push((asset_id, date, close));
    }

    Ok(PriceService::from_observations(observations))
}

/// Caller-correctable failures (validation, data availability) exit with code 1;
/// engine/infra failures with code 2, so a script can tell the two apart.
fn exit_code_for(error: &BacktestError) -> u8 {
    match error {
        BacktestError::Validation(_) => 1,
        BacktestError::Engine(_) | BacktestError::Infra(_) => 2,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("quantback {} starting", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = match quantback::config::Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::from(2);
        }
    };

    let price_service = match load_price_service(&cli.prices) {
        Ok(service) => service,
        Err(err) => {
            error!(error = %err, "failed to load price fixture");
            return ExitCode::from(1);
        }
    };

    let orchestrator = Orchestrator::new(&price_service, config.monte_carlo_max_cells, config.monte_carlo_max_simulations);

    match cli.command {
        Command::Backtest { asset, start, end, initial_cash, strategy, amount, period_amount, frequency } => {
            let strategy_request = match strategy {
                StrategyKind::BuyAndHold => StrategyRequest::BuyAndHold {
                    allocation: Some(std::collections::HashMap::from([(asset, Decimal::ONE)])),
                    initial_investment: amount,
                },
                StrategyKind::Dca => {
                    let frequency = match frequency.parse::<DcaFrequency>() {
                        Ok(f) => f,
                        Err(other) => {
                            error!(frequency = %other, "invalid DCA frequency");
                            return ExitCode::from(1);
                        }
                    };
                    StrategyRequest::Dca {
                        asset_id: asset,
                        initial_investment: amount,
                        amount_per_period: period_amount,
                        frequency,
                    }
                }
                StrategyKind::Va => StrategyRequest::Va {
                    asset_id: asset,
                    initial_investment: amount,
                    target_increment_amount: period_amount,
                },
            };

            let request = BacktestRequest {
                asset_ids: vec![asset],
                start_date: start,
                end_date: end,
                initial_cash,
                strategy: strategy_request,
            };

            let today = Local::now().date_naive();
            match orchestrator.run_backtest(&request, today, &CancellationToken::new()).await {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response).unwrap());
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(error = %err, "backtest failed");
                    ExitCode::from(exit_code_for(&err))
                }
            }
        }
        Command::MonteCarlo { asset, monthly_investment, months, simulations, method, seed } => {
            let request = MonteCarloRequest {
                asset_id: asset,
                monthly_investment,
                investment_months: months,
                num_simulations: simulations,
                initial_price: None,
                seed,
                method: method.into(),
            };

            match orchestrator.run_monte_carlo(&request).await {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response).unwrap());
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(error = %err, "monte carlo projection failed");
                    ExitCode::from(exit_code_for(&err))
                }
            }
        }
    }
}
