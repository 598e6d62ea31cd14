use std::env;

use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;

/// Runtime configuration, loaded once at process start from the environment
/// (optionally via a `.env` file). Every field has a sane default so the CLI
/// runs out of the box against the in-memory fixtures.
#[derive(Debug, Clone)]
pub struct Config {
    /// `sqlite://path/to/file.db`, or `sqlite::memory:` for ephemeral runs.
    pub database_url: String,
    /// Annualised risk-free rate used by the Sharpe ratio. Spec default: 4%.
    pub risk_free_rate: Decimal,
    /// Upper bound on `num_simulations * (investment_months + 1)` a single Monte
    /// Carlo request may allocate, guarding against runaway memory use.
    pub monte_carlo_max_cells: u64,
    /// Upper bound on `num_simulations` accepted in a single Monte Carlo request.
    pub monte_carlo_max_simulations: u64,
    /// Passed straight to `tracing_subscriber::EnvFilter` if set; otherwise
    /// `info` is used.
    pub log_directive: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

        let risk_free_rate = env::var("RISK_FREE_RATE")
            .unwrap_or_else(|_| "0.04".to_string())
            .parse::<Decimal>()
            .context("failed to parse RISK_FREE_RATE")?;
        ensure!(
            risk_free_rate >= Decimal::ZERO,
            "RISK_FREE_RATE must be non-negative, got {risk_free_rate}"
        );

        let monte_carlo_max_cells = env::var("MONTE_CARLO_MAX_CELLS")
            .unwrap_or_else(|_| "10000000".to_string())
            .parse::<u64>()
            .context("failed to parse MONTE_CARLO_MAX_CELLS")?;

        let monte_carlo_max_simulations = env::var("MONTE_CARLO_MAX_SIMULATIONS")
            .unwrap_or_else(|_| "20000".to_string())
            .parse::<u64>()
            .context("failed to parse MONTE_CARLO_MAX_SIMULATIONS")?;

        let log_directive = env::var("RUST_LOG").ok();

        Ok(Self {
            database_url,
            risk_free_rate,
            monte_carlo_max_cells,
            monte_carlo_max_simulations,
            log_directive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_no_env_vars_are_set() {
        for key in [
            "DATABASE_URL",
            "RISK_FREE_RATE",
            "MONTE_CARLO_MAX_CELLS",
            "MONTE_CARLO_MAX_SIMULATIONS",
            "RUST_LOG",
        ] {
            unsafe { env::remove_var(key) };
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.risk_free_rate, "0.04".parse::<Decimal>().unwrap());
        assert_eq!(config.monte_carlo_max_cells, 10_000_000);
        assert_eq!(config.monte_carlo_max_simulations, 20_000);
        assert!(config.log_directive.is_none());
    }

    #[test]
    fn rejects_unparseable_risk_free_rate() {
        unsafe { env::set_var("RISK_FREE_RATE", "not-a-number") };
        let result = Config::from_env();
        unsafe { env::remove_var("RISK_FREE_RATE") };
        assert!(result.is_err());
    }

    #[test]
    fn rejects_negative_risk_free_rate() {
        unsafe { env::set_var("RISK_FREE_RATE", "-0.01") };
        let result = Config::from_env();
        unsafe { env::remove_var("RISK_FREE_RATE") };
        assert!(result.is_err());
    }
}
