pub mod engine;
pub mod errors;
pub mod metrics;
pub mod monte_carlo;
pub mod price_service;
pub mod strategies;
pub mod types;
