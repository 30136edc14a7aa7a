//! Persistence layer for Stockcast
//!
//! Provides SQLite storage for users, predictions, badges, the rating ledger,
//! the assessment audit log, job heartbeats and the notification outbox.

pub mod repository;
pub mod schema;

pub use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.configure_pragmas().await?;

        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.configure_pragmas().await?;

        Ok(db)
    }

    /// Run database migrations (execute each statement individually)
    async fn run_migrations(&self) -> DbResult<()> {
        // Create tables
        for statement in schema::CREATE_TABLES.split(';') {
            // Strip comment-only lines, then check if any SQL remains
            let sql: String = statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let sql = sql.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Migration(format!("{e}: {sql}")))?;
        }

        // Run ALTER TABLE migrations (tolerate "duplicate column name" errors)
        for migration in schema::MIGRATIONS {
            match sqlx::query(migration).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) => {
                    let err_msg = e.to_string();
                    if err_msg.contains("duplicate column name") {
                        // Column already exists — this is expected on subsequent runs
                    } else {
                        return Err(DbError::Migration(format!("{e}: {migration}")));
                    }
                }
            }
        }

        self.fold_legacy_ratings().await?;

        Ok(())
    }

    /// One-time versioned migration: fold the old numeric-only rating column
    /// into the structured ledger. The engine never branches on the old shape,
    /// so this must complete before any job touches the database.
    async fn fold_legacy_ratings(&self) -> DbResult<()> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DbError::Migration(format!("user_version read failed: {e}")))?;
        let version: i64 = row.get(0);

        if version >= schema::SCHEMA_VERSION {
            return Ok(());
        }

        let result = sqlx::query(schema::FOLD_LEGACY_RATINGS)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Migration(format!("legacy rating fold failed: {e}")))?;
        if result.rows_affected() > 0 {
            info!(
                migrated = result.rows_affected(),
                "Folded legacy numeric ratings into structured ledgers"
            );
        }

        sqlx::query(&format!("PRAGMA user_version = {}", schema::SCHEMA_VERSION))
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Migration(format!("user_version write failed: {e}")))?;

        Ok(())
    }

    /// Configure SQLite pragmas for optimal performance
    async fn configure_pragmas(&self) -> DbResult<()> {
        // WAL mode: allows concurrent reads during writes
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Connection(format!("WAL pragma failed: {e}")))?;

        // NORMAL sync: good balance of safety and performance
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Connection(format!("synchronous pragma failed: {e}")))?;

        // Enable foreign key constraints
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Connection(format!("foreign_keys pragma failed: {e}")))?;

        // 8 MB cache size (negative = KiB)
        sqlx::query("PRAGMA cache_size=-8000")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Connection(format!("cache_size pragma failed: {e}")))?;

        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Clone the pool for use in spawned tasks
    pub fn pool_clone(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_run_clean_on_fresh_db() {
        let db = Database::in_memory().await.unwrap();
        // Added-by-migration columns must be queryable
        sqlx::query("SELECT score_cap, target_hit FROM predictions LIMIT 1")
            .fetch_optional(db.pool())
            .await
            .unwrap();
        sqlx::query("SELECT from_bonus, share_breakdown_json FROM users LIMIT 1")
            .fetch_optional(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn legacy_rating_folds_into_ledger_once() {
        let db = Database::in_memory().await.unwrap();

        // Simulate a pre-ledger row, then re-run the fold with the version reset
        sqlx::query("INSERT INTO users (username, legacy_rating) VALUES ('oldtimer', 42.0)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("PRAGMA user_version = 0")
            .execute(db.pool())
            .await
            .unwrap();
        db.fold_legacy_ratings().await.unwrap();

        let row = sqlx::query(
            "SELECT legacy_rating, ledger_total, from_predictions FROM users WHERE username = 'oldtimer'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        let legacy: Option<f64> = row.get(0);
        let total: f64 = row.get(1);
        let from_predictions: f64 = row.get(2);

        assert!(legacy.is_none());
        assert_eq!(total, 42.0);
        assert_eq!(from_predictions, 42.0);

        // Second run is a no-op (version already bumped)
        db.fold_legacy_ratings().await.unwrap();
        let row = sqlx::query("SELECT ledger_total FROM users WHERE username = 'oldtimer'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let total: f64 = row.get(0);
        assert_eq!(total, 42.0);
    }
}
