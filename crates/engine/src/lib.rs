//! Stockcast Engine — prediction assessment, ledger, badge and rank jobs
//!
//! Provides:
//! - Proximity scoring with a direction-correctness gate
//! - The scheduled assessment batch (Active → Assessed, ledger credits, audit)
//! - Badge tier evaluation over accuracy statistics
//! - Periodic leaderboard rank bonuses per category
//! - Full per-user ledger recalculation for corrective rebuilds
//! - Market data gateway clients

pub mod api;
pub mod assessment;
pub mod badges;
pub mod locks;
pub mod rank;
pub mod recalc;
pub mod scoring;
pub mod types;

// Re-exports for convenience
pub use api::{DailyBar, GatewayError, MarketDataProvider, Quote, YahooClient};
pub use assessment::{run_assessment, AssessmentReport};
pub use badges::{award_badges, AwardedBadge, BadgeCatalog, BadgeDefinition, UserStats};
pub use rank::{
    base_rank_bonus, competition_weight, compute_awards, run_rank_cadence, run_rank_job,
    RankAward, RankCadence,
};
pub use recalc::recalculate_user;
pub use scoring::{
    accuracy_points, aggressiveness, direction_accuracy, proximity_score, target_hit_bonus,
    Aggressiveness, DirectionAccuracy, ScoringConfig,
};
pub use types::*;
