use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::application::ports::{BacktestRunRecord, BacktestRunRepository};

pub struct SqliteBacktestRunRepository {
    pool: SqlitePool,
}

impl SqliteBacktestRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BacktestRunRepository for SqliteBacktestRunRepository {
    async fn save(&self, record: &BacktestRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backtest_runs
            (id, created_at, strategy, parameters_json, asset_ids_json, start_date, end_date,
             initial_cash, final_value, total_return_pct, sharpe, max_drawdown)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.created_at.timestamp())
        .bind(&record.strategy)
        .bind(&record.parameters_json)
        .bind(&record.asset_ids_json)
        .bind(record.start_date.to_string())
        .bind(record.end_date.to_string())
        .bind(record.initial_cash.to_string())
        .bind(record.final_value.to_string())
        .bind(record.total_return_pct.to_string())
        .bind(record.sharpe.to_string())
        .bind(record.max_drawdown.to_string())
        .execute(&self.pool)
        .await
        .context("failed to save backtest run")?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BacktestRunRecord>> {
        let row = sqlx::query("SELECT * FROM backtest_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query backtest run")?;

        let Some(row) = row else { return Ok(None) };

        Ok(Some(BacktestRunRecord {
            id,
            created_at: Utc.timestamp_opt(row.try_get("created_at")?, 0).unwrap(),
            strategy: row.try_get("strategy")?,
            parameters_json: row.try_get("parameters_json")?,
            asset_ids_json: row.try_get("asset_ids_json")?,
            start_date: row.try_get::<String, _>("start_date")?.parse::<NaiveDate>()?,
            end_date: row.try_get::<String, _>("end_date")?.parse::<NaiveDate>()?,
            initial_cash: row.try_get::<String, _>("initial_cash")?.parse()?,
            final_value: row.try_get::<String, _>("final_value")?.parse()?,
            total_return_pct: row.try_get::<String, _>("total_return_pct")?.parse()?,
            sharpe: row.try_get::<String, _>("sharpe")?.parse()?,
            max_drawdown: row.try_get::<String, _>("max_drawdown")?.parse()?,
        }))
    }
}

/// In-memory test double, used by the orchestrator's own tests and available to
/// callers that want persistence semantics without a database.
#[derive(Default)]
pub struct InMemoryBacktestRunRepository {
    records: Mutex<HashMap<Uuid, BacktestRunRecord>>,
}

#[async_trait]
impl BacktestRunRepository for InMemoryBacktestRunRepository {
    async fn save(&self, record: &BacktestRunRecord) -> Result<()> {
        self.records.lock().unwrap().insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BacktestRunRecord>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_record() -> BacktestRunRecord {
        BacktestRunRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            strategy: "dca".to_string(),
            parameters_json: "{}".to_string(),
            asset_ids_json: "[1]".to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            initial_cash: dec!(1000),
            final_value: dec!(1200),
            total_return_pct: dec!(0.2),
            sharpe: dec!(1.1),
            max_drawdown: dec!(-0.05),
        }
    }

    #[tokio::test]
    async fn in_memory_repository_round_trips_a_record() {
        let repo = InMemoryBacktestRunRepository::default();
        let record = sample_record();

        repo.save(&record).await.unwrap();
        let found = repo.find_by_id(record.id).await.unwrap().unwrap();

        assert_eq!(found.strategy, "dca");
        assert_eq!(found.final_value, dec!(1200));
    }

    #[tokio::test]
    async fn in_memory_repository_returns_none_for_unknown_id() {
        let repo = InMemoryBacktestRunRepository::default();
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_repository_round_trips_a_record() {
        let database = crate::infrastructure::persistence::database::Database::new("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteBacktestRunRepository::new(database.pool.clone());
        let record = sample_record();

        repo.save(&record).await.unwrap();
        let found = repo.find_by_id(record.id).await.unwrap().unwrap();

        assert_eq!(found.strategy, record.strategy);
        assert_eq!(found.sharpe, record.sharpe);
    }
}
