//! Prediction repository — forecast rows and the one-way Active→Assessed transition

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted prediction
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PredictionRecord {
    pub id: Option<i64>,
    pub user_id: i64,
    pub ticker: String,
    pub target_price: f64,
    pub price_at_creation: Option<f64>,
    pub currency: String,
    pub horizon: String,
    pub deadline: i64,
    pub status: String,
    pub actual_price: Option<f64>,
    pub score: Option<f64>,
    pub score_cap: f64,
    pub target_hit: Option<i64>,
    pub created_at: Option<i64>,
}

/// One leaderboard row: a user and their average score over qualifying predictions
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardRow {
    pub user_id: i64,
    pub avg_score: f64,
    pub prediction_count: i64,
}

/// Repository for predictions
pub struct PredictionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PredictionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &PredictionRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO predictions
                (user_id, ticker, target_price, price_at_creation, currency,
                 horizon, deadline, status, score_cap, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                       COALESCE(?10, strftime('%s', 'now')))"#,
        )
        .bind(record.user_id)
        .bind(&record.ticker)
        .bind(record.target_price)
        .bind(record.price_at_creation)
        .bind(&record.currency)
        .bind(&record.horizon)
        .bind(record.deadline)
        .bind(&record.status)
        .bind(record.score_cap)
        .bind(record.created_at)
        .execute(self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<PredictionRecord>> {
        let record =
            sqlx::query_as::<_, PredictionRecord>("SELECT * FROM predictions WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        Ok(record)
    }

    /// All Active predictions whose deadline has passed, oldest deadline first
    pub async fn due_active(&self, now_epoch: i64) -> DbResult<Vec<PredictionRecord>> {
        let records = sqlx::query_as::<_, PredictionRecord>(
            r#"SELECT * FROM predictions
               WHERE status = 'Active' AND deadline <= ?1
               ORDER BY deadline ASC, id ASC"#,
        )
        .bind(now_epoch)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Transition Active→Assessed, fixing actual price and score permanently.
    /// The status guard makes the transition exactly-once: a second call for
    /// the same id affects zero rows and returns false.
    pub async fn mark_assessed(
        &self,
        id: i64,
        actual_price: f64,
        score: f64,
        target_hit: bool,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"UPDATE predictions
               SET status = 'Assessed', actual_price = ?1, score = ?2, target_hit = ?3
               WHERE id = ?4 AND status = 'Active'"#,
        )
        .bind(actual_price)
        .bind(score)
        .bind(target_hit as i64)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn assessed_for_user(&self, user_id: i64) -> DbResult<Vec<PredictionRecord>> {
        let records = sqlx::query_as::<_, PredictionRecord>(
            r#"SELECT * FROM predictions
               WHERE user_id = ?1 AND status = 'Assessed'
               ORDER BY deadline ASC, id ASC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Mean score over a user's assessed predictions (None when they have none)
    pub async fn avg_assessed_score(&self, user_id: i64) -> DbResult<Option<f64>> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT AVG(score) FROM predictions WHERE user_id = ?1 AND status = 'Assessed'",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(row.0)
    }

    /// Leaderboard for a category: assessed predictions filtered by horizon
    /// and/or ticker, grouped by owner, averaged and ranked. Ties break by
    /// user id so repeated runs over the same data rank identically.
    pub async fn leaderboard(
        &self,
        horizon: Option<&str>,
        ticker: Option<&str>,
    ) -> DbResult<Vec<LeaderboardRow>> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            r#"SELECT user_id, AVG(score) AS avg_score, COUNT(*) AS prediction_count
               FROM predictions
               WHERE status = 'Assessed'
                 AND (?1 IS NULL OR horizon = ?1)
                 AND (?2 IS NULL OR ticker = ?2)
               GROUP BY user_id
               HAVING COUNT(*) > 0
               ORDER BY avg_score DESC, user_id ASC"#,
        )
        .bind(horizon)
        .bind(ticker)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_user(&self, user_id: i64, limit: i64) -> DbResult<Vec<PredictionRecord>> {
        let records = sqlx::query_as::<_, PredictionRecord>(
            r#"SELECT * FROM predictions
               WHERE user_id = ?1
               ORDER BY created_at DESC, id DESC
               LIMIT ?2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Admin deletion — the caller is responsible for triggering a ledger
    /// recalculation for the owner afterwards.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM predictions WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
