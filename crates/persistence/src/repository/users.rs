//! User repository — rating ledger storage and the additive credit choke point
//!
//! All ledger writes funnel through this module. Concurrent jobs (assessment,
//! badge awards, rank bonuses) use the additive `credit_*` statements, which
//! are single atomic UPDATEs and therefore compose under any interleaving.
//! Only the recalculation path is allowed to overwrite a ledger wholesale.

use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;

/// A persisted user row (ledger columns flattened, breakdowns as JSON text)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: Option<i64>,
    pub username: String,
    pub total_rating: f64,
    pub avg_score: f64,
    pub legacy_rating: Option<f64>,
    pub ledger_total: f64,
    pub from_predictions: f64,
    pub from_badges: f64,
    pub from_shares: f64,
    pub from_referrals: f64,
    pub from_ranks: f64,
    pub from_bonus: f64,
    pub prediction_breakdown_json: String,
    pub badge_breakdown_json: String,
    pub rank_breakdown_json: String,
    pub share_breakdown_json: String,
    pub created_at: Option<i64>,
}

/// The structured rating ledger: one cumulative total, attributable sub-totals
/// and per-key breakdown maps. `total` always equals the sum of the sub-totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingLedger {
    pub total: f64,
    pub from_predictions: f64,
    pub from_badges: f64,
    pub from_shares: f64,
    pub from_referrals: f64,
    pub from_ranks: f64,
    pub from_bonus: f64,
    pub prediction_breakdown: BTreeMap<String, f64>,
    pub badge_breakdown: BTreeMap<String, f64>,
    pub rank_breakdown: BTreeMap<String, f64>,
    pub share_breakdown: BTreeMap<String, f64>,
}

impl RatingLedger {
    /// Assemble the ledger from a stored user row
    pub fn from_record(record: &UserRecord) -> DbResult<Self> {
        let parse = |json: &str| -> DbResult<BTreeMap<String, f64>> {
            serde_json::from_str(json)
                .map_err(|e| DbError::Corrupt(format!("breakdown json: {e}")))
        };
        Ok(Self {
            total: record.ledger_total,
            from_predictions: record.from_predictions,
            from_badges: record.from_badges,
            from_shares: record.from_shares,
            from_referrals: record.from_referrals,
            from_ranks: record.from_ranks,
            from_bonus: record.from_bonus,
            prediction_breakdown: parse(&record.prediction_breakdown_json)?,
            badge_breakdown: parse(&record.badge_breakdown_json)?,
            rank_breakdown: parse(&record.rank_breakdown_json)?,
            share_breakdown: parse(&record.share_breakdown_json)?,
        })
    }

    /// Credit accuracy points earned by a resolved prediction
    pub fn credit_predictions(&mut self, stock_key: &str, points: f64) {
        if points <= 0.0 {
            return;
        }
        self.total += points;
        self.from_predictions += points;
        *self
            .prediction_breakdown
            .entry(stock_key.to_string())
            .or_insert(0.0) += points;
    }

    /// Credit the point value of a newly awarded or upgraded badge
    pub fn credit_badge(&mut self, badge_id: &str, points: f64) {
        if points <= 0.0 {
            return;
        }
        self.total += points;
        self.from_badges += points;
        *self
            .badge_breakdown
            .entry(badge_id.to_string())
            .or_insert(0.0) += points;
    }

    /// Credit a leaderboard rank bonus for a category
    pub fn credit_rank(&mut self, category_key: &str, points: f64) {
        if points <= 0.0 {
            return;
        }
        self.total += points;
        self.from_ranks += points;
        *self
            .rank_breakdown
            .entry(category_key.to_string())
            .or_insert(0.0) += points;
    }

    /// Zero everything this engine owns (predictions, badges, ranks) while
    /// preserving externally-attributed points. Recalculation only.
    pub fn reset_owned(&mut self) {
        self.from_predictions = 0.0;
        self.from_badges = 0.0;
        self.from_ranks = 0.0;
        self.prediction_breakdown.clear();
        self.badge_breakdown.clear();
        self.rank_breakdown.clear();
        self.total = self.from_shares + self.from_referrals + self.from_bonus;
    }

    /// Core invariant: the total equals the sum of its attributed parts
    pub fn is_consistent(&self) -> bool {
        let sum = self.from_predictions
            + self.from_badges
            + self.from_shares
            + self.from_referrals
            + self.from_ranks
            + self.from_bonus;
        (self.total - sum).abs() < 1e-6
    }
}

/// Sanitize a ticker symbol into a breakdown-map key (dots break JSON paths)
pub fn stock_key(ticker: &str) -> String {
    ticker
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == '.' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn breakdown_path(key: &str) -> String {
    format!("$.\"{key}\"")
}

/// Repository for users and their rating ledgers
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, username: &str) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO users (username) VALUES (?1)")
            .bind(username)
            .execute(self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, user_id: i64) -> DbResult<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(record)
    }

    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        Ok(record)
    }

    /// Credit a resolved prediction: the raw score accrues to the running
    /// rating sum; accuracy points (when any) accrue to the ledger and the
    /// per-stock breakdown. One atomic statement per concern.
    pub async fn credit_prediction_points(
        &self,
        user_id: i64,
        stock: &str,
        points: f64,
        raw_score: f64,
    ) -> DbResult<()> {
        sqlx::query("UPDATE users SET total_rating = total_rating + ?1 WHERE id = ?2")
            .bind(raw_score)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        if points > 0.0 {
            let path = breakdown_path(&stock_key(stock));
            sqlx::query(
                r#"UPDATE users SET
                     ledger_total = ledger_total + ?1,
                     from_predictions = from_predictions + ?1,
                     prediction_breakdown_json = json_set(
                         prediction_breakdown_json,
                         ?2,
                         coalesce(json_extract(prediction_breakdown_json, ?2), 0) + ?1)
                   WHERE id = ?3"#,
            )
            .bind(points)
            .bind(&path)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        }
        Ok(())
    }

    /// Credit badge tier points to the ledger and the per-badge breakdown
    pub async fn credit_badge_points(
        &self,
        user_id: i64,
        badge_id: &str,
        points: f64,
    ) -> DbResult<()> {
        if points <= 0.0 {
            return Ok(());
        }
        let path = breakdown_path(badge_id);
        sqlx::query(
            r#"UPDATE users SET
                 ledger_total = ledger_total + ?1,
                 from_badges = from_badges + ?1,
                 badge_breakdown_json = json_set(
                     badge_breakdown_json,
                     ?2,
                     coalesce(json_extract(badge_breakdown_json, ?2), 0) + ?1)
               WHERE id = ?3"#,
        )
        .bind(points)
        .bind(&path)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Credit a rank bonus to the ledger and the per-category breakdown
    pub async fn credit_rank_points(
        &self,
        user_id: i64,
        category_key: &str,
        points: f64,
    ) -> DbResult<()> {
        if points <= 0.0 {
            return Ok(());
        }
        let path = breakdown_path(category_key);
        sqlx::query(
            r#"UPDATE users SET
                 ledger_total = ledger_total + ?1,
                 from_ranks = from_ranks + ?1,
                 rank_breakdown_json = json_set(
                     rank_breakdown_json,
                     ?2,
                     coalesce(json_extract(rank_breakdown_json, ?2), 0) + ?1)
               WHERE id = ?3"#,
        )
        .bind(points)
        .bind(&path)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_avg_score(&self, user_id: i64, avg_score: f64) -> DbResult<()> {
        sqlx::query("UPDATE users SET avg_score = ?1 WHERE id = ?2")
            .bind(avg_score)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Overwrite a user's ledger, rating sum and average wholesale.
    /// Recalculation only — every other writer must use the credit statements.
    pub async fn save_recalculated(
        &self,
        user_id: i64,
        ledger: &RatingLedger,
        total_rating: f64,
        avg_score: f64,
    ) -> DbResult<()> {
        let to_json = |map: &BTreeMap<String, f64>| -> DbResult<String> {
            serde_json::to_string(map).map_err(|e| DbError::Corrupt(format!("breakdown json: {e}")))
        };
        sqlx::query(
            r#"UPDATE users SET
                 total_rating = ?1,
                 avg_score = ?2,
                 ledger_total = ?3,
                 from_predictions = ?4,
                 from_badges = ?5,
                 from_shares = ?6,
                 from_referrals = ?7,
                 from_ranks = ?8,
                 from_bonus = ?9,
                 prediction_breakdown_json = ?10,
                 badge_breakdown_json = ?11,
                 rank_breakdown_json = ?12,
                 share_breakdown_json = ?13
               WHERE id = ?14"#,
        )
        .bind(total_rating)
        .bind(avg_score)
        .bind(ledger.total)
        .bind(ledger.from_predictions)
        .bind(ledger.from_badges)
        .bind(ledger.from_shares)
        .bind(ledger.from_referrals)
        .bind(ledger.from_ranks)
        .bind(ledger.from_bonus)
        .bind(to_json(&ledger.prediction_breakdown)?)
        .bind(to_json(&ledger.badge_breakdown)?)
        .bind(to_json(&ledger.rank_breakdown)?)
        .bind(to_json(&ledger.share_breakdown)?)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn followers(&self, user_id: i64) -> DbResult<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT follower_id FROM followers WHERE user_id = ?1")
                .bind(user_id)
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn add_follower(&self, user_id: i64, follower_id: i64) -> DbResult<()> {
        sqlx::query("INSERT OR IGNORE INTO followers (user_id, follower_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(follower_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn ledger_total_tracks_sum_of_parts() {
        let mut ledger = RatingLedger {
            from_shares: 15.0,
            from_referrals: 500.0,
            from_bonus: 1000.0,
            total: 1515.0,
            ..Default::default()
        };
        assert!(ledger.is_consistent());

        ledger.credit_predictions("AAPL", 10.0);
        ledger.credit_badge("market_maven", 250.0);
        ledger.credit_rank("overall", 75.0);
        assert!(ledger.is_consistent());
        assert_eq!(ledger.total, 1850.0);
        assert_eq!(ledger.prediction_breakdown["AAPL"], 10.0);

        ledger.reset_owned();
        assert!(ledger.is_consistent());
        assert_eq!(ledger.total, 1515.0);
        assert!(ledger.prediction_breakdown.is_empty());
    }

    #[test]
    fn zero_point_credits_are_ignored() {
        let mut ledger = RatingLedger::default();
        ledger.credit_predictions("AAPL", 0.0);
        assert_eq!(ledger, RatingLedger::default());
    }

    #[test]
    fn stock_keys_are_sanitized() {
        assert_eq!(stock_key("BRK.B"), "BRK_B");
        assert_eq!(stock_key(" aapl "), "AAPL");
        assert_eq!(stock_key("0700.HK"), "0700_HK");
    }

    #[tokio::test]
    async fn credits_compose_additively_in_storage() {
        let db = Database::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let id = repo.insert("analyst").await.unwrap();

        repo.credit_prediction_points(id, "AAPL", 10.0, 92.5)
            .await
            .unwrap();
        repo.credit_prediction_points(id, "AAPL", 5.0, 83.0)
            .await
            .unwrap();
        repo.credit_prediction_points(id, "BRK.B", 2.0, 71.0)
            .await
            .unwrap();
        repo.credit_badge_points(id, "market_maven", 100.0)
            .await
            .unwrap();
        repo.credit_rank_points(id, "overall", 150.0).await.unwrap();

        let record = repo.get(id).await.unwrap().unwrap();
        let ledger = RatingLedger::from_record(&record).unwrap();

        assert!(ledger.is_consistent());
        assert_eq!(ledger.from_predictions, 17.0);
        assert_eq!(ledger.from_badges, 100.0);
        assert_eq!(ledger.from_ranks, 150.0);
        assert_eq!(ledger.total, 267.0);
        assert_eq!(ledger.prediction_breakdown["AAPL"], 15.0);
        assert_eq!(ledger.prediction_breakdown["BRK_B"], 2.0);
        assert_eq!(record.total_rating, 92.5 + 83.0 + 71.0);
    }

    #[tokio::test]
    async fn raw_score_accrues_even_without_points() {
        let db = Database::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let id = repo.insert("novice").await.unwrap();

        // Score below every accuracy tier: rating sum moves, ledger does not
        repo.credit_prediction_points(id, "TSLA", 0.0, 42.0)
            .await
            .unwrap();

        let record = repo.get(id).await.unwrap().unwrap();
        assert_eq!(record.total_rating, 42.0);
        assert_eq!(record.ledger_total, 0.0);
        assert_eq!(record.prediction_breakdown_json, "{}");
    }
}
