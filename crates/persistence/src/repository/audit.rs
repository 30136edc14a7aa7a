//! Audit repository — the append-only assessment log and job heartbeats

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Immutable snapshot of one resolved prediction
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssessmentLogRecord {
    pub id: Option<i64>,
    pub prediction_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub ticker: String,
    pub horizon: String,
    pub predicted_price: f64,
    pub actual_price: f64,
    pub score: f64,
    pub assessed_at: Option<i64>,
}

/// Last attempted/completed run per scheduled job
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HeartbeatRecord {
    pub job_id: String,
    pub last_attempted_run: Option<i64>,
    pub last_completed_run: Option<i64>,
}

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one assessment log entry. Entries are never updated or deleted.
    pub async fn append(&self, record: &AssessmentLogRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO assessment_log
                (prediction_id, user_id, username, ticker, horizon,
                 predicted_price, actual_price, score)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(record.prediction_id)
        .bind(record.user_id)
        .bind(&record.username)
        .bind(&record.ticker)
        .bind(&record.horizon)
        .bind(record.predicted_price)
        .bind(record.actual_price)
        .bind(record.score)
        .execute(self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn for_prediction(&self, prediction_id: i64) -> DbResult<Vec<AssessmentLogRecord>> {
        let records = sqlx::query_as::<_, AssessmentLogRecord>(
            "SELECT * FROM assessment_log WHERE prediction_id = ?1 ORDER BY id ASC",
        )
        .bind(prediction_id)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    pub async fn recent(&self, limit: i64) -> DbResult<Vec<AssessmentLogRecord>> {
        let records = sqlx::query_as::<_, AssessmentLogRecord>(
            "SELECT * FROM assessment_log ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Record that a job run started (upsert, stall detection for operators)
    pub async fn record_attempt(&self, job_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO job_heartbeats (job_id, last_attempted_run)
               VALUES (?1, strftime('%s', 'now'))
               ON CONFLICT(job_id) DO UPDATE SET
                 last_attempted_run = strftime('%s', 'now')"#,
        )
        .bind(job_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record that a job run finished without a fatal error
    pub async fn record_completion(&self, job_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO job_heartbeats (job_id, last_completed_run)
               VALUES (?1, strftime('%s', 'now'))
               ON CONFLICT(job_id) DO UPDATE SET
                 last_completed_run = strftime('%s', 'now')"#,
        )
        .bind(job_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn heartbeat(&self, job_id: &str) -> DbResult<Option<HeartbeatRecord>> {
        let record = sqlx::query_as::<_, HeartbeatRecord>(
            "SELECT * FROM job_heartbeats WHERE job_id = ?1",
        )
        .bind(job_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }
}
