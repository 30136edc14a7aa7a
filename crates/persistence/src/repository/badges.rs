//! Badge repository — held tiers per (user, badge), numeric tier ordering

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A held badge. `tier` is the numeric tier order (Bronze=1, Silver=2, Gold=3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BadgeRecord {
    pub id: Option<i64>,
    pub user_id: i64,
    pub badge_id: String,
    pub tier: i64,
    pub achieved_at: Option<i64>,
}

pub struct BadgeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BadgeRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn for_user(&self, user_id: i64) -> DbResult<Vec<BadgeRecord>> {
        let records = sqlx::query_as::<_, BadgeRecord>(
            "SELECT * FROM user_badges WHERE user_id = ?1 ORDER BY badge_id ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Insert or replace the held tier for (user, badge)
    pub async fn upsert(&self, user_id: i64, badge_id: &str, tier: i64) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO user_badges (user_id, badge_id, tier, achieved_at)
               VALUES (?1, ?2, ?3, strftime('%s', 'now'))
               ON CONFLICT(user_id, badge_id) DO UPDATE SET
                 tier = excluded.tier,
                 achieved_at = excluded.achieved_at"#,
        )
        .bind(user_id)
        .bind(badge_id)
        .bind(tier)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Wipe a user's badge set. Recalculation only.
    pub async fn delete_for_user(&self, user_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM user_badges WHERE user_id = ?1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
