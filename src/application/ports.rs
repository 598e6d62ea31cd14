use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::types::Day;

/// A completed backtest run, persisted for later retrieval. Distinct from
/// `BacktestResult`: this is the row shape, not the full day-by-day history.
#[derive(Debug, Clone)]
pub struct BacktestRunRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub strategy: String,
    pub parameters_json: String,
    pub asset_ids_json: String,
    pub start_date: Day,
    pub end_date: Day,
    pub initial_cash: Decimal,
    pub final_value: Decimal,
    pub total_return_pct: Decimal,
    pub sharpe: Decimal,
    pub max_drawdown: Decimal,
}

/// Persists and retrieves backtest run records. A failure here must never corrupt
/// or withhold the `BacktestResult` the caller already has in hand; the
/// orchestrator logs-and-swallows save failures rather than propagating them.
#[async_trait]
pub trait BacktestRunRepository: Send + Sync {
    async fn save(&self, record: &BacktestRunRecord) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BacktestRunRecord>>;
}
