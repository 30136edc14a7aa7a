//! Ledger recalculation — rebuild one user from their assessed predictions
//!
//! Used after out-of-band edits (admin deletion of a prediction, data fixes)
//! and whenever a consistency check trips. Prediction-, badge- and
//! rank-derived points are recomputed from ground truth; share, referral and
//! bonus points belong to other services and are preserved untouched. The
//! rebuild holds the user's write lock so no additive job interleaves with
//! the destructive reset.

use crate::badges::{evaluate, BadgeCatalog, UserStats};
use crate::locks;
use crate::scoring::accuracy_points;
use crate::types::BadgeTier;
use anyhow::{anyhow, Result};
use persistence::repository::badges::BadgeRepository;
use persistence::repository::predictions::PredictionRepository;
use persistence::repository::users::{stock_key, RatingLedger, UserRepository};
use persistence::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

/// Rebuild one user's ledger, average and badge set from scratch.
/// Running it twice over unchanged data produces identical results.
pub async fn recalculate_user(
    pool: &SqlitePool,
    catalog: &BadgeCatalog,
    user_id: i64,
) -> Result<()> {
    let _guard = locks::lock_user(user_id).await;

    let users_repo = UserRepository::new(pool);
    let predictions_repo = PredictionRepository::new(pool);
    let badges_repo = BadgeRepository::new(pool);

    let record = users_repo
        .get(user_id)
        .await?
        .ok_or_else(|| anyhow!("unknown user {user_id}"))?;

    let mut ledger = RatingLedger::from_record(&record)?;
    ledger.reset_owned();
    badges_repo.delete_for_user(user_id).await?;

    // Replay every assessed prediction through the accuracy-tier table
    let assessed = predictions_repo.assessed_for_user(user_id).await?;
    let mut total_rating = 0.0;
    for prediction in &assessed {
        let score = prediction.score.unwrap_or(0.0);
        total_rating += score;
        ledger.credit_predictions(&stock_key(&prediction.ticker), accuracy_points(score));
    }

    let avg_score = if assessed.is_empty() {
        0.0
    } else {
        total_rating / assessed.len() as f64
    };

    // Badge engine runs fresh against the emptied badge set; re-awarding
    // after the reset is the point — history is ground truth here
    let stats = UserStats::compute(&assessed);
    let awards = evaluate(catalog, &stats, &BTreeMap::<String, BadgeTier>::new());
    for award in &awards {
        badges_repo
            .upsert(user_id, &award.badge_id, award.tier.rank())
            .await?;
        ledger.credit_badge(&award.badge_id, award.points);
    }

    users_repo
        .save_recalculated(user_id, &ledger, total_rating, avg_score)
        .await?;

    info!(
        user_id,
        predictions = assessed.len(),
        badges = awards.len(),
        total = ledger.total,
        avg_score,
        "Recalculated user analytics"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::repository::predictions::PredictionRecord;
    use persistence::repository::users::UserRecord;
    use persistence::Database;

    async fn seed_assessed(db: &Database, user_id: i64, ticker: &str, horizon: &str, score: f64) {
        let repo = PredictionRepository::new(db.pool());
        let id = repo
            .insert(&PredictionRecord {
                id: None,
                user_id,
                ticker: ticker.to_string(),
                target_price: 100.0,
                price_at_creation: Some(95.0),
                currency: "USD".to_string(),
                horizon: horizon.to_string(),
                deadline: 1_000,
                status: "Active".to_string(),
                actual_price: None,
                score: None,
                score_cap: 100.0,
                target_hit: None,
                created_at: None,
            })
            .await
            .unwrap();
        repo.mark_assessed(id, 100.0, score, false).await.unwrap();
    }

    async fn fetch(db: &Database, user_id: i64) -> (UserRecord, RatingLedger) {
        let record = UserRepository::new(db.pool())
            .get(user_id)
            .await
            .unwrap()
            .unwrap();
        let ledger = RatingLedger::from_record(&record).unwrap();
        (record, ledger)
    }

    #[tokio::test]
    async fn rebuild_replays_predictions_and_badges_from_scratch() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();

        // Drifted state: stale rank points, inflated prediction points
        users.credit_rank_points(user_id, "Overall", 999.0).await.unwrap();
        users
            .credit_prediction_points(user_id, "AAPL", 500.0, 500.0)
            .await
            .unwrap();
        // External points that the rebuild must not touch
        sqlx::query(
            "UPDATE users SET from_shares = 15, from_referrals = 500, from_bonus = 1000,
             ledger_total = ledger_total + 1515 WHERE id = ?1",
        )
        .bind(user_id)
        .execute(db.pool())
        .await
        .unwrap();

        // Ground truth: five daily predictions averaging 92
        for _ in 0..5 {
            seed_assessed(&db, user_id, "AAPL", "Daily", 92.0).await;
        }

        recalculate_user(db.pool(), &BadgeCatalog::default(), user_id)
            .await
            .unwrap();

        let (record, ledger) = fetch(&db, user_id).await;
        assert!(ledger.is_consistent());
        // 5 × 10 tier points from the replay
        assert_eq!(ledger.from_predictions, 50.0);
        assert_eq!(ledger.prediction_breakdown["AAPL"], 50.0);
        // Rank points are owned by this engine: wiped, not replayed
        assert_eq!(ledger.from_ranks, 0.0);
        assert!(ledger.rank_breakdown.is_empty());
        // External sub-totals preserved verbatim
        assert_eq!(ledger.from_shares, 15.0);
        assert_eq!(ledger.from_referrals, 500.0);
        assert_eq!(ledger.from_bonus, 1000.0);
        // Badges re-earned from ground truth: Gold maven + Gold daily oracle
        assert_eq!(ledger.from_badges, 1000.0);
        assert_eq!(record.avg_score, 92.0);
        assert_eq!(record.total_rating, 460.0);
    }

    #[tokio::test]
    async fn recalculation_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();
        for score in [95.0, 85.0, 75.0, 60.0] {
            seed_assessed(&db, user_id, "MSFT", "Weekly", score).await;
        }

        let catalog = BadgeCatalog::default();
        recalculate_user(db.pool(), &catalog, user_id).await.unwrap();
        let (first_record, first_ledger) = fetch(&db, user_id).await;

        recalculate_user(db.pool(), &catalog, user_id).await.unwrap();
        let (second_record, second_ledger) = fetch(&db, user_id).await;

        assert_eq!(first_ledger, second_ledger);
        assert_eq!(first_record.total_rating, second_record.total_rating);
        assert_eq!(first_record.avg_score, second_record.avg_score);
        assert!(second_ledger.is_consistent());
        // 10 + 5 + 2 + 0 tier points
        assert_eq!(second_ledger.from_predictions, 17.0);
    }

    #[tokio::test]
    async fn rebuild_after_deletion_drops_the_deleted_contribution() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let predictions = PredictionRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();

        for _ in 0..3 {
            seed_assessed(&db, user_id, "AAPL", "Daily", 95.0).await;
        }
        let catalog = BadgeCatalog::default();
        recalculate_user(db.pool(), &catalog, user_id).await.unwrap();
        let (_, before) = fetch(&db, user_id).await;
        assert_eq!(before.from_predictions, 30.0);

        // Admin deletes one prediction, then triggers the rebuild
        let victim = predictions.assessed_for_user(user_id).await.unwrap()[0]
            .id
            .unwrap();
        predictions.delete(victim).await.unwrap();
        recalculate_user(db.pool(), &catalog, user_id).await.unwrap();

        let (record, after) = fetch(&db, user_id).await;
        assert_eq!(after.from_predictions, 20.0);
        assert_eq!(record.total_rating, 190.0);
        assert!(after.is_consistent());
    }
}
