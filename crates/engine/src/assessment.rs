//! Assessment engine — resolves due predictions against realized prices
//!
//! Runs on a short schedule. Each run advances every Active prediction whose
//! deadline has passed to Assessed exactly once: resolve the actual price,
//! score it, credit the owner's ledger, append the audit row, then re-check
//! badges. A prediction whose price cannot be resolved stays Active and is
//! retried on the next run — never resolved against a stale substitute.

use crate::api::{GatewayError, MarketDataProvider};
use crate::badges::{award_badges, BadgeCatalog};
use crate::locks;
use crate::scoring::{accuracy_points, proximity_score, target_hit_bonus, ScoringConfig};
use crate::types::Horizon;
use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use persistence::repository::audit::{AssessmentLogRecord, AuditRepository};
use persistence::repository::notifications::{NotificationRecord, NotificationRepository};
use persistence::repository::predictions::{PredictionRecord, PredictionRepository};
use persistence::repository::users::UserRepository;
use persistence::SqlitePool;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

const JOB_ID: &str = "assessment";

/// Consecutive transport failures before the run concludes the gateway itself
/// is down and aborts
const GATEWAY_FAILURE_LIMIT: usize = 3;

/// How many days back to look for a close when the deadline date has no bar
/// (weekends, long holiday weekends)
const HISTORICAL_FALLBACK_DAYS: i64 = 3;

/// Outcome counts for one assessment run
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct AssessmentReport {
    pub due: usize,
    pub assessed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct PendingCredit {
    raw_score: f64,
    points: f64,
}

/// Run one assessment batch. Per-item failures are logged and skipped; the
/// run only fails outright when persistence is unreachable or the gateway
/// stops answering entirely.
pub async fn run_assessment(
    pool: &SqlitePool,
    provider: &dyn MarketDataProvider,
    catalog: &BadgeCatalog,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Result<AssessmentReport> {
    let audit = AuditRepository::new(pool);
    audit.record_attempt(JOB_ID).await?;

    let predictions_repo = PredictionRepository::new(pool);
    let due = predictions_repo.due_active(now.timestamp()).await?;

    let mut report = AssessmentReport {
        due: due.len(),
        ..Default::default()
    };
    if due.is_empty() {
        info!("No predictions to assess");
        audit.record_completion(JOB_ID).await?;
        return Ok(report);
    }
    info!(count = due.len(), "Found predictions to assess");

    // Group by ticker so each symbol costs at most one quote and one
    // historical fetch per run
    let mut groups: BTreeMap<String, Vec<PredictionRecord>> = BTreeMap::new();
    for prediction in due {
        groups
            .entry(prediction.ticker.clone())
            .or_default()
            .push(prediction);
    }
    info!(groups = groups.len(), "Grouped into unique ticker lookups");

    let mut consecutive_gateway_failures = 0usize;

    for (ticker, group) in &groups {
        match assess_ticker_group(pool, provider, catalog, config, ticker, group, now, &mut report)
            .await
        {
            Ok(()) => consecutive_gateway_failures = 0,
            Err(GatewayError::Transport(e)) => {
                report.failed += group.len();
                consecutive_gateway_failures += 1;
                error!(ticker = %ticker, error = %e, "Gateway transport failure for group");
                if consecutive_gateway_failures >= GATEWAY_FAILURE_LIMIT {
                    bail!("market data gateway unreachable, aborting assessment run: {e}");
                }
            }
            Err(GatewayError::Rejected(e)) => {
                // Bad symbol or malformed payload: this group fails, the
                // gateway itself is fine
                report.failed += group.len();
                warn!(ticker = %ticker, error = %e, "Gateway rejected group lookup");
            }
        }
    }

    audit.record_completion(JOB_ID).await?;
    info!(
        assessed = report.assessed,
        skipped = report.skipped,
        failed = report.failed,
        "Assessment run finished"
    );
    Ok(report)
}

/// Closing price for the deadline date, falling back up to three days for
/// market holidays. A deadline of *today* gets no fallback: a missing close
/// today just means the feed has not updated yet.
async fn historical_close_with_fallback(
    provider: &dyn MarketDataProvider,
    ticker: &str,
    deadline_date: NaiveDate,
    today: NaiveDate,
) -> Result<Option<f64>, GatewayError> {
    if let Some(close) = provider.get_historical_close(ticker, deadline_date).await? {
        return Ok(Some(close));
    }

    if deadline_date == today {
        warn!(ticker, %deadline_date, "No close for today yet, deferring assessment");
        return Ok(None);
    }

    for days_back in 1..=HISTORICAL_FALLBACK_DAYS {
        let date = deadline_date - Duration::days(days_back);
        warn!(ticker, %date, "No close on requested date, retrying previous day");
        if let Some(close) = provider.get_historical_close(ticker, date).await? {
            return Ok(Some(close));
        }
    }

    error!(ticker, %deadline_date, "No close found within the fallback window, skipping");
    Ok(None)
}

/// Whether the target price traded inside the window's daily high/low range.
/// Checked once per ticker group using the oldest prediction's window; errors
/// count as "not hit" rather than failing the group.
async fn target_was_hit(
    provider: &dyn MarketDataProvider,
    ticker: &str,
    target_price: f64,
    from: NaiveDate,
    to: NaiveDate,
) -> bool {
    match provider.get_daily_bars(ticker, from, to).await {
        Ok(bars) => bars
            .iter()
            .any(|bar| bar.high >= target_price && bar.low <= target_price),
        Err(e) => {
            warn!(ticker, error = %e, "Target hit check failed, assuming not hit");
            false
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn assess_ticker_group(
    pool: &SqlitePool,
    provider: &dyn MarketDataProvider,
    catalog: &BadgeCatalog,
    config: &ScoringConfig,
    ticker: &str,
    group: &[PredictionRecord],
    now: DateTime<Utc>,
    report: &mut AssessmentReport,
) -> Result<(), GatewayError> {
    let today = now.date_naive();
    let deadline_date = group
        .first()
        .and_then(|p| DateTime::from_timestamp(p.deadline, 0))
        .map(|d| d.date_naive())
        .unwrap_or(today);

    let needs_live = group
        .iter()
        .any(|p| Horizon::parse(&p.horizon).is_some_and(|h| h.needs_live_quote()));
    let needs_historical = group
        .iter()
        .any(|p| Horizon::parse(&p.horizon).is_some_and(|h| !h.needs_live_quote()));

    let live_price = if needs_live {
        Some(provider.get_quote(ticker).await?.price)
    } else {
        None
    };
    let historical_price = if needs_historical {
        historical_close_with_fallback(provider, ticker, deadline_date, today).await?
    } else {
        None
    };

    // One target-hit check per group, over the oldest prediction's window
    let oldest = group
        .iter()
        .min_by_key(|p| p.created_at.unwrap_or(i64::MAX));
    let hit = match oldest {
        Some(p) => {
            let window_start = p
                .created_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|d| d.date_naive())
                .unwrap_or(deadline_date);
            target_was_hit(provider, ticker, p.target_price, window_start, deadline_date).await
        }
        None => false,
    };

    let mut credits: BTreeMap<i64, PendingCredit> = BTreeMap::new();

    for prediction in group {
        match assess_one(pool, config, prediction, live_price, historical_price, hit).await {
            Ok(Some((user_id, raw_score, points))) => {
                let credit = credits.entry(user_id).or_default();
                credit.raw_score += raw_score;
                credit.points += points;
                report.assessed += 1;
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                error!(
                    prediction_id = prediction.id,
                    ticker,
                    error = %e,
                    "Failed to assess prediction"
                );
            }
        }
    }

    // Batched per-user ledger updates, then badge re-check
    for (user_id, credit) in credits {
        if let Err(e) = apply_user_credit(pool, catalog, user_id, ticker, &credit).await {
            error!(user_id, error = %e, "Failed to credit user after assessment");
        }
    }

    Ok(())
}

/// Assess one prediction. Returns the owner and earned points, or None when
/// the price was unavailable and the prediction stays Active.
async fn assess_one(
    pool: &SqlitePool,
    config: &ScoringConfig,
    prediction: &PredictionRecord,
    live_price: Option<f64>,
    historical_price: Option<f64>,
    hit: bool,
) -> Result<Option<(i64, f64, f64)>> {
    let Some(prediction_id) = prediction.id else {
        bail!("prediction row without id");
    };
    let Some(horizon) = Horizon::parse(&prediction.horizon) else {
        bail!("unknown horizon {:?}", prediction.horizon);
    };

    let actual_price = if horizon.needs_live_quote() {
        live_price
    } else {
        historical_price
    };
    let Some(actual_price) = actual_price else {
        // Transient data gap: leave Active, the next run retries
        return Ok(None);
    };

    let raw_score = proximity_score(
        prediction.target_price,
        actual_price,
        prediction.price_at_creation,
        config.max_error_for(horizon),
    );
    // Time-penalty cap fixed at creation
    let score = raw_score.min(prediction.score_cap);

    let predictions_repo = PredictionRepository::new(pool);
    let transitioned = predictions_repo
        .mark_assessed(prediction_id, actual_price, score, hit)
        .await?;
    if !transitioned {
        warn!(prediction_id, "Prediction already assessed, skipping credit");
        return Ok(None);
    }

    let users_repo = UserRepository::new(pool);
    let username = users_repo
        .get(prediction.user_id)
        .await?
        .map(|u| u.username);

    let audit = AuditRepository::new(pool);
    audit
        .append(&AssessmentLogRecord {
            id: None,
            prediction_id,
            user_id: prediction.user_id,
            username: username.clone(),
            ticker: prediction.ticker.clone(),
            horizon: prediction.horizon.clone(),
            predicted_price: prediction.target_price,
            actual_price,
            score,
            assessed_at: None,
        })
        .await?;

    let bonus = if hit { target_hit_bonus(horizon) } else { 0.0 };
    let points = accuracy_points(score) + bonus;

    info!(
        prediction_id,
        user = username.as_deref().unwrap_or("?"),
        ticker = %prediction.ticker,
        horizon = %horizon,
        predicted = prediction.target_price,
        actual = actual_price,
        score,
        score_cap = prediction.score_cap,
        target_hit = hit,
        bonus,
        "Assessed prediction"
    );

    let notifications_repo = NotificationRepository::new(pool);
    let metadata = serde_json::json!({
        "stockTicker": prediction.ticker,
        "horizon": prediction.horizon,
        "score": score,
    })
    .to_string();
    if let Err(e) = notifications_repo
        .append(&NotificationRecord {
            id: None,
            recipient_id: prediction.user_id,
            sender_id: None,
            kind: "PredictionAssessed".to_string(),
            message_key: "notifications.predictionAssessed".to_string(),
            metadata_json: Some(metadata),
            link: Some(format!("/prediction/{prediction_id}")),
            created_at: None,
        })
        .await
    {
        warn!(prediction_id, error = %e, "Failed to emit assessment notification");
    }

    Ok(Some((prediction.user_id, score, points)))
}

/// Apply one user's batched credit under their write lock: ledger increment,
/// fresh average, then the badge engine.
async fn apply_user_credit(
    pool: &SqlitePool,
    catalog: &BadgeCatalog,
    user_id: i64,
    ticker: &str,
    credit: &PendingCredit,
) -> Result<()> {
    let _guard = locks::lock_user(user_id).await;

    let users_repo = UserRepository::new(pool);
    let predictions_repo = PredictionRepository::new(pool);

    users_repo
        .credit_prediction_points(user_id, ticker, credit.points, credit.raw_score)
        .await?;

    if let Some(avg) = predictions_repo.avg_assessed_score(user_id).await? {
        users_repo.set_avg_score(user_id, avg).await?;
    }

    award_badges(pool, catalog, user_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DailyBar, GatewayResult, Quote};
    use async_trait::async_trait;
    use persistence::repository::users::RatingLedger;
    use persistence::Database;
    use std::collections::HashMap;

    struct FakeProvider {
        quotes: HashMap<String, f64>,
        bars: HashMap<String, Vec<DailyBar>>,
        transport_down: bool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                quotes: HashMap::new(),
                bars: HashMap::new(),
                transport_down: false,
            }
        }

        fn with_close(mut self, ticker: &str, date: NaiveDate, close: f64) -> Self {
            self.bars.entry(ticker.to_string()).or_default().push(DailyBar {
                date,
                close,
                high: close,
                low: close,
            });
            self
        }

        fn with_bar(mut self, ticker: &str, date: NaiveDate, close: f64, high: f64, low: f64) -> Self {
            self.bars.entry(ticker.to_string()).or_default().push(DailyBar {
                date,
                close,
                high,
                low,
            });
            self
        }

        fn with_quote(mut self, ticker: &str, price: f64) -> Self {
            self.quotes.insert(ticker.to_string(), price);
            self
        }
    }

    #[async_trait]
    impl MarketDataProvider for FakeProvider {
        async fn get_quote(&self, ticker: &str) -> GatewayResult<Quote> {
            if self.transport_down {
                return Err(GatewayError::Transport("connection refused".into()));
            }
            self.quotes
                .get(ticker)
                .map(|price| Quote {
                    price: *price,
                    currency: Some("USD".into()),
                })
                .ok_or_else(|| GatewayError::Rejected(format!("no quote for {ticker}")))
        }

        async fn get_daily_bars(
            &self,
            ticker: &str,
            from: NaiveDate,
            to: NaiveDate,
        ) -> GatewayResult<Vec<DailyBar>> {
            if self.transport_down {
                return Err(GatewayError::Transport("connection refused".into()));
            }
            Ok(self
                .bars
                .get(ticker)
                .map(|bars| {
                    bars.iter()
                        .filter(|b| b.date >= from && b.date <= to)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn utc(date: &str) -> DateTime<Utc> {
        format!("{date}T12:00:00Z").parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn seed_prediction(
        db: &Database,
        user_id: i64,
        ticker: &str,
        horizon: &str,
        target: f64,
        creation: f64,
        deadline: DateTime<Utc>,
        score_cap: f64,
    ) -> i64 {
        let repo = PredictionRepository::new(db.pool());
        repo.insert(&PredictionRecord {
            id: None,
            user_id,
            ticker: ticker.to_string(),
            target_price: target,
            price_at_creation: Some(creation),
            currency: "USD".to_string(),
            horizon: horizon.to_string(),
            deadline: deadline.timestamp(),
            status: "Active".to_string(),
            actual_price: None,
            score: None,
            score_cap,
            target_hit: None,
            created_at: Some((deadline - Duration::days(7)).timestamp()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_due_prediction_end_to_end() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();

        // Daily forecast: 105 predicted from 100, close lands at 105 → perfect
        let prediction_id = seed_prediction(
            &db,
            user_id,
            "AAPL",
            "Daily",
            105.0,
            100.0,
            utc("2024-03-04"),
            100.0,
        )
        .await;

        let provider = FakeProvider::new().with_close("AAPL", date("2024-03-04"), 105.0);
        let report = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-05"),
        )
        .await
        .unwrap();

        assert_eq!(report.due, 1);
        assert_eq!(report.assessed, 1);
        assert_eq!(report.skipped, 0);

        let prediction = PredictionRepository::new(db.pool())
            .get(prediction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.status, "Assessed");
        assert_eq!(prediction.score, Some(100.0));
        assert_eq!(prediction.actual_price, Some(105.0));

        // Perfect score: 10 tier points; target 105 traded (flat bar at 105)
        // so the Daily hit bonus (5.0) applies too
        let record = users.get(user_id).await.unwrap().unwrap();
        let ledger = RatingLedger::from_record(&record).unwrap();
        assert!(ledger.is_consistent());
        assert_eq!(ledger.from_predictions, 15.0);
        assert_eq!(ledger.prediction_breakdown["AAPL"], 15.0);
        assert_eq!(record.total_rating, 100.0);
        assert_eq!(record.avg_score, 100.0);

        // Audit row fixed forever
        let audit = AuditRepository::new(db.pool());
        let log = audit.for_prediction(prediction_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].score, 100.0);
        assert_eq!(log[0].username.as_deref(), Some("analyst"));

        // Owner notified
        let notifications = NotificationRepository::new(db.pool())
            .for_recipient(user_id, 10)
            .await
            .unwrap();
        assert!(notifications.iter().any(|n| n.kind == "PredictionAssessed"));
    }

    #[tokio::test]
    async fn missing_price_leaves_prediction_active_for_retry() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();
        let prediction_id = seed_prediction(
            &db,
            user_id,
            "MSFT",
            "Daily",
            410.0,
            400.0,
            utc("2024-03-04"),
            100.0,
        )
        .await;

        // No bars at all for MSFT
        let provider = FakeProvider::new();
        let report = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-08"),
        )
        .await
        .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.assessed, 0);

        let prediction = PredictionRepository::new(db.pool())
            .get(prediction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.status, "Active");
        assert_eq!(prediction.score, None);

        // Next run, data arrived: the same prediction resolves
        let provider = FakeProvider::new().with_close("MSFT", date("2024-03-04"), 408.0);
        let report = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-08"),
        )
        .await
        .unwrap();
        assert_eq!(report.assessed, 1);
    }

    #[tokio::test]
    async fn close_falls_back_over_the_weekend_but_not_for_today() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();

        // Deadline Saturday; Friday's close exists
        seed_prediction(&db, user_id, "AAPL", "Daily", 105.0, 100.0, utc("2024-03-02"), 100.0).await;
        let provider = FakeProvider::new().with_close("AAPL", date("2024-03-01"), 104.0);
        let report = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-04"),
        )
        .await
        .unwrap();
        assert_eq!(report.assessed, 1);

        // Deadline today with no close yet: defer, no fallback to yesterday
        let user_b = users.insert("other").await.unwrap();
        seed_prediction(&db, user_b, "TSLA", "Daily", 200.0, 190.0, utc("2024-03-04"), 100.0).await;
        let provider = FakeProvider::new().with_close("TSLA", date("2024-03-03"), 199.0);
        let report = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-04"),
        )
        .await
        .unwrap();
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn hourly_predictions_score_against_the_live_quote() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("scalper").await.unwrap();
        let prediction_id = seed_prediction(
            &db,
            user_id,
            "NVDA",
            "Hourly",
            100.0,
            98.0,
            utc("2024-03-04"),
            100.0,
        )
        .await;

        // Stale close says 200; the live quote says 100 — hourly must use live
        let provider = FakeProvider::new()
            .with_quote("NVDA", 100.0)
            .with_close("NVDA", date("2024-03-04"), 200.0);
        run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-04"),
        )
        .await
        .unwrap();

        let prediction = PredictionRepository::new(db.pool())
            .get(prediction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.actual_price, Some(100.0));
        assert_eq!(prediction.score, Some(100.0));
    }

    #[tokio::test]
    async fn score_is_capped_by_the_time_penalty() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("latecomer").await.unwrap();
        let prediction_id = seed_prediction(
            &db,
            user_id,
            "AAPL",
            "Daily",
            105.0,
            100.0,
            utc("2024-03-04"),
            60.0,
        )
        .await;

        let provider = FakeProvider::new().with_close("AAPL", date("2024-03-04"), 105.0);
        run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-05"),
        )
        .await
        .unwrap();

        let prediction = PredictionRepository::new(db.pool())
            .get(prediction_id)
            .await
            .unwrap()
            .unwrap();
        // Raw 100, capped at 60
        assert_eq!(prediction.score, Some(60.0));
    }

    #[tokio::test]
    async fn unreachable_gateway_aborts_the_run() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();
        // Three tickers, all hitting a dead gateway
        for ticker in ["AAPL", "MSFT", "NVDA"] {
            seed_prediction(&db, user_id, ticker, "Daily", 100.0, 95.0, utc("2024-03-04"), 100.0)
                .await;
        }

        let provider = FakeProvider {
            transport_down: true,
            ..FakeProvider::new()
        };
        let result = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-05"),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn one_bad_ticker_does_not_stop_the_batch() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();
        // DELISTED resolves nothing; AAPL is fine. BTreeMap order guarantees
        // AAPL group runs first, then the rejected group.
        seed_prediction(&db, user_id, "AAPL", "Hourly", 100.0, 98.0, utc("2024-03-04"), 100.0).await;
        seed_prediction(&db, user_id, "DELISTED", "Hourly", 5.0, 4.0, utc("2024-03-04"), 100.0).await;

        let provider = FakeProvider::new().with_quote("AAPL", 100.0);
        let report = run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-04"),
        )
        .await
        .unwrap();

        assert_eq!(report.assessed, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn target_hit_bonus_is_weighted_by_horizon() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let user_id = users.insert("analyst").await.unwrap();

        // Weekly forecast, target 110 from 100. Close lands at 111 (within the
        // 5% strict budget) and the window's range straddles 110.
        seed_prediction(&db, user_id, "AAPL", "Weekly", 110.0, 100.0, utc("2024-03-04"), 100.0)
            .await;
        let provider =
            FakeProvider::new().with_bar("AAPL", date("2024-03-04"), 111.0, 112.0, 108.0);
        run_assessment(
            db.pool(),
            &provider,
            &BadgeCatalog::default(),
            &ScoringConfig::default(),
            utc("2024-03-05"),
        )
        .await
        .unwrap();

        let record = users.get(user_id).await.unwrap().unwrap();
        let ledger = RatingLedger::from_record(&record).unwrap();
        // e = 1/111 ≈ 0.009 → score 82.0 → 5 tier points, plus 5 × 2.0 weekly
        // hit bonus
        assert_eq!(ledger.from_predictions, 15.0);
        assert!(ledger.is_consistent());
    }
}
