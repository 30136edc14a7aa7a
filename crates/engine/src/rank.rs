//! Rank engine — periodic leaderboard bonuses per category
//!
//! Each cadence groups one or more categories: competitors are ranked by
//! average score over the category's assessed predictions and the top 100
//! earn a competition-weighted bonus. The job is additive-only and is NOT
//! idempotent across re-runs; the scheduler owns the cadence.

use crate::types::{Horizon, RankCategory};
use anyhow::Result;
use persistence::repository::audit::AuditRepository;
use persistence::repository::predictions::{LeaderboardRow, PredictionRepository};
use persistence::repository::users::UserRepository;
use persistence::SqlitePool;
use serde::Serialize;
use tracing::{error, info};

/// Competitor counts above these thresholds raise the payout multiplier
pub const HIGH_COMPETITION_THRESHOLD: usize = 100;
pub const MEDIUM_COMPETITION_THRESHOLD: usize = 20;

pub const HIGH_COMPETITION_WEIGHT: f64 = 1.5;
pub const MEDIUM_COMPETITION_WEIGHT: f64 = 1.0;
pub const LOW_COMPETITION_WEIGHT: f64 = 0.5;

/// Only the top 100 earn anything
pub const MAX_REWARDED_RANK: usize = 100;

/// Multiplier for a leaderboard's size: #1 of 500 beats #1 of 5
pub fn competition_weight(competitor_count: usize) -> f64 {
    if competitor_count > HIGH_COMPETITION_THRESHOLD {
        HIGH_COMPETITION_WEIGHT
    } else if competitor_count > MEDIUM_COMPETITION_THRESHOLD {
        MEDIUM_COMPETITION_WEIGHT
    } else {
        LOW_COMPETITION_WEIGHT
    }
}

/// Base bonus for a 1-indexed rank
pub fn base_rank_bonus(rank: usize) -> f64 {
    match rank {
        1 => 100.0,
        2..=10 => 50.0,
        11..=50 => 10.0,
        51..=100 => 5.0,
        _ => 0.0,
    }
}

/// One bonus paid out by a rank job run
#[derive(Debug, Clone, Serialize)]
pub struct RankAward {
    pub user_id: i64,
    pub rank: usize,
    pub avg_score: f64,
    pub points: f64,
}

/// Compute the awards for a ranked leaderboard without touching storage
pub fn compute_awards(leaderboard: &[LeaderboardRow]) -> Vec<RankAward> {
    let weight = competition_weight(leaderboard.len());

    leaderboard
        .iter()
        .take(MAX_REWARDED_RANK)
        .enumerate()
        .filter_map(|(index, row)| {
            let rank = index + 1;
            let points = (base_rank_bonus(rank) * weight).round();
            (points > 0.0).then(|| RankAward {
                user_id: row.user_id,
                rank,
                avg_score: row.avg_score,
                points,
            })
        })
        .collect()
}

/// Rank and reward one category. Every credit is an atomic ledger increment;
/// this engine never subtracts.
pub async fn run_rank_job(pool: &SqlitePool, category: RankCategory) -> Result<usize> {
    let predictions_repo = PredictionRepository::new(pool);
    let users_repo = UserRepository::new(pool);

    let leaderboard = predictions_repo
        .leaderboard(category.horizon_filter(), None)
        .await?;
    if leaderboard.is_empty() {
        info!(category = %category, "Rank job: no competitors, skipping");
        return Ok(0);
    }

    let awards = compute_awards(&leaderboard);
    info!(
        category = %category,
        competitors = leaderboard.len(),
        weight = competition_weight(leaderboard.len()),
        awards = awards.len(),
        "Rank job: crediting leaderboard bonuses"
    );

    for award in &awards {
        users_repo
            .credit_rank_points(award.user_id, category.key(), award.points)
            .await?;
    }

    Ok(awards.len())
}

/// Scheduling tier for the rank jobs; each tier covers a fixed category group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankCadence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl RankCadence {
    pub const ALL: [RankCadence; 4] = [
        RankCadence::Hourly,
        RankCadence::Daily,
        RankCadence::Weekly,
        RankCadence::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<RankCadence> {
        match s {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn job_id(&self) -> String {
        format!("rank-{}", self.as_str())
    }

    /// Categories rewarded at this cadence. The overall board pays daily;
    /// the slow horizons all settle on the monthly tier.
    pub fn categories(&self) -> Vec<RankCategory> {
        match self {
            Self::Hourly => vec![RankCategory::Horizon(Horizon::Hourly)],
            Self::Daily => vec![
                RankCategory::Horizon(Horizon::Daily),
                RankCategory::Overall,
            ],
            Self::Weekly => vec![RankCategory::Horizon(Horizon::Weekly)],
            Self::Monthly => vec![
                RankCategory::Horizon(Horizon::Monthly),
                RankCategory::Horizon(Horizon::Quarterly),
                RankCategory::Horizon(Horizon::Yearly),
            ],
        }
    }
}

/// Run every category in a cadence tier. A category that fails is logged and
/// skipped; the remaining categories still run.
pub async fn run_rank_cadence(pool: &SqlitePool, cadence: RankCadence) -> Result<usize> {
    let audit = AuditRepository::new(pool);
    let job_id = cadence.job_id();
    audit.record_attempt(&job_id).await?;

    let mut total_awards = 0usize;
    for category in cadence.categories() {
        match run_rank_job(pool, category).await {
            Ok(count) => total_awards += count,
            Err(e) => error!(category = %category, error = %e, "Rank job failed for category"),
        }
    }

    audit.record_completion(&job_id).await?;
    info!(cadence = cadence.as_str(), total_awards, "Rank cadence finished");
    Ok(total_awards)
}
