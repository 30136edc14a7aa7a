//! Badge engine — tier evaluation over accuracy statistics
//!
//! Badge definitions are read-only configuration (JSON file or the built-in
//! catalog). Tier comparisons are numeric and strictly increasing: a held
//! tier is never demoted and never re-awarded, except through the full
//! recalculation path which rebuilds the badge set from nothing.

use crate::types::{BadgeTier, Horizon};
use anyhow::{bail, Context, Result};
use persistence::repository::badges::BadgeRepository;
use persistence::repository::notifications::{NotificationRecord, NotificationRepository};
use persistence::repository::predictions::{PredictionRecord, PredictionRepository};
use persistence::repository::users::UserRepository;
use persistence::SqlitePool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub const SCOPE_OVERALL: &str = "overall";

/// Score thresholds per tier; a tier with no threshold is unreachable
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    pub bronze: Option<f64>,
    pub silver: Option<f64>,
    pub gold: Option<f64>,
}

impl TierThresholds {
    fn threshold(&self, tier: BadgeTier) -> Option<f64> {
        match tier {
            BadgeTier::Bronze => self.bronze,
            BadgeTier::Silver => self.silver,
            BadgeTier::Gold => self.gold,
        }
    }
}

/// One configured achievement category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// "overall" or a horizon name ("Hourly", "Daily", ...)
    pub scope: String,
    #[serde(default)]
    pub min_predictions: u32,
    pub tiers: TierThresholds,
}

impl BadgeDefinition {
    /// Scope as a horizon, None for the overall badge
    pub fn scope_horizon(&self) -> Option<Horizon> {
        Horizon::parse(&self.scope)
    }
}

/// The full read-only badge catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeCatalog {
    pub badges: Vec<BadgeDefinition>,
}

impl Default for BadgeCatalog {
    fn default() -> Self {
        let standard = TierThresholds {
            bronze: Some(70.0),
            silver: Some(80.0),
            gold: Some(90.0),
        };
        let horizon_badge = |id: &str, name: &str, horizon: Horizon| BadgeDefinition {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("High accuracy on {} forecasts", horizon.as_str()),
            scope: horizon.as_str().to_string(),
            min_predictions: 3,
            tiers: standard,
        };
        Self {
            badges: vec![
                BadgeDefinition {
                    id: "market_maven".to_string(),
                    name: "Market Maven".to_string(),
                    description: "High overall average score across all forecasts".to_string(),
                    scope: SCOPE_OVERALL.to_string(),
                    min_predictions: 5,
                    tiers: standard,
                },
                horizon_badge("rapid_fire", "Rapid Fire", Horizon::Hourly),
                horizon_badge("daily_oracle", "Daily Oracle", Horizon::Daily),
                horizon_badge("weekly_prophet", "Weekly Prophet", Horizon::Weekly),
                horizon_badge("monthly_strategist", "Monthly Strategist", Horizon::Monthly),
                horizon_badge("long_view", "Long View", Horizon::Yearly),
            ],
        }
    }
}

impl BadgeCatalog {
    /// Load a catalog from a JSON file, validating every definition
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading badge catalog {}", path.as_ref().display()))?;
        let catalog: BadgeCatalog =
            serde_json::from_str(&raw).context("parsing badge catalog JSON")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Keys are validated at the boundary: scopes must name a horizon or
    /// "overall", ids must be usable as breakdown-map keys.
    pub fn validate(&self) -> Result<()> {
        for def in &self.badges {
            if def.scope != SCOPE_OVERALL && def.scope_horizon().is_none() {
                bail!("badge {}: unknown scope {:?}", def.id, def.scope);
            }
            if def.id.is_empty()
                || !def
                    .id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                bail!("badge id {:?} is not a valid breakdown key", def.id);
            }
        }
        Ok(())
    }
}

/// Average score and sample count for one statistic partition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyStats {
    pub avg_score: f64,
    pub count: u32,
}

/// Per-user accuracy statistics: overall plus one partition per horizon
#[derive(Debug, Clone, Default)]
pub struct UserStats {
    pub overall: Option<AccuracyStats>,
    pub by_horizon: BTreeMap<Horizon, AccuracyStats>,
}

impl UserStats {
    /// Aggregate assessed predictions into the statistic partitions
    pub fn compute(predictions: &[PredictionRecord]) -> UserStats {
        let mut total = 0.0;
        let mut count = 0u32;
        let mut sums: BTreeMap<Horizon, (f64, u32)> = BTreeMap::new();

        for p in predictions {
            let Some(score) = p.score else { continue };
            total += score;
            count += 1;
            if let Some(horizon) = Horizon::parse(&p.horizon) {
                let entry = sums.entry(horizon).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }

        let mut stats = UserStats::default();
        if count > 0 {
            stats.overall = Some(AccuracyStats {
                avg_score: total / count as f64,
                count,
            });
        }
        for (horizon, (sum, n)) in sums {
            stats.by_horizon.insert(
                horizon,
                AccuracyStats {
                    avg_score: sum / n as f64,
                    count: n,
                },
            );
        }
        stats
    }

    fn for_scope(&self, definition: &BadgeDefinition) -> Option<AccuracyStats> {
        if definition.scope == SCOPE_OVERALL {
            self.overall
        } else {
            definition
                .scope_horizon()
                .and_then(|h| self.by_horizon.get(&h).copied())
        }
    }
}

/// A badge change produced by one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct AwardedBadge {
    pub badge_id: String,
    pub name: String,
    pub tier: BadgeTier,
    pub points: f64,
}

/// Highest tier whose threshold the statistic meets, checked Gold-first
fn earned_tier(stats: AccuracyStats, definition: &BadgeDefinition) -> Option<BadgeTier> {
    for tier in [BadgeTier::Gold, BadgeTier::Silver, BadgeTier::Bronze] {
        if let Some(threshold) = definition.tiers.threshold(tier) {
            if stats.avg_score >= threshold {
                return Some(tier);
            }
        }
    }
    None
}

/// Pure tier evaluation: which badges change given current statistics and the
/// held tiers. A change only happens when the newly earned tier is strictly
/// higher than the held one, so re-evaluating unchanged statistics awards
/// nothing.
pub fn evaluate(
    catalog: &BadgeCatalog,
    stats: &UserStats,
    held: &BTreeMap<String, BadgeTier>,
) -> Vec<AwardedBadge> {
    let mut awards = Vec::new();

    for definition in &catalog.badges {
        let Some(scoped) = stats.for_scope(definition) else {
            continue;
        };
        if scoped.count < definition.min_predictions {
            continue;
        }
        let Some(tier) = earned_tier(scoped, definition) else {
            continue;
        };
        let improved = match held.get(&definition.id) {
            Some(current) => tier > *current,
            None => true,
        };
        if improved {
            awards.push(AwardedBadge {
                badge_id: definition.id.clone(),
                name: definition.name.clone(),
                tier,
                points: tier.points(),
            });
        }
    }

    awards
}

/// Evaluate and persist badge changes for one user: upgrade held tiers, credit
/// the ledger, then notify the owner and each follower per changed badge.
pub async fn award_badges(
    pool: &SqlitePool,
    catalog: &BadgeCatalog,
    user_id: i64,
) -> Result<Vec<AwardedBadge>> {
    let predictions_repo = PredictionRepository::new(pool);
    let badges_repo = BadgeRepository::new(pool);
    let users_repo = UserRepository::new(pool);

    let predictions = predictions_repo.assessed_for_user(user_id).await?;
    if predictions.is_empty() {
        return Ok(Vec::new());
    }

    let stats = UserStats::compute(&predictions);
    let held: BTreeMap<String, BadgeTier> = badges_repo
        .for_user(user_id)
        .await?
        .into_iter()
        .filter_map(|b| BadgeTier::from_rank(b.tier).map(|t| (b.badge_id, t)))
        .collect();

    let awards = evaluate(catalog, &stats, &held);
    if awards.is_empty() {
        return Ok(awards);
    }

    for award in &awards {
        badges_repo
            .upsert(user_id, &award.badge_id, award.tier.rank())
            .await?;
        users_repo
            .credit_badge_points(user_id, &award.badge_id, award.points)
            .await?;
        info!(
            user_id,
            badge = %award.badge_id,
            tier = %award.tier,
            points = award.points,
            "Awarded badge"
        );
    }

    if let Err(e) = notify_badge_awards(pool, user_id, &awards).await {
        warn!(user_id, error = %e, "Failed to emit badge notifications");
    }

    Ok(awards)
}

async fn notify_badge_awards(
    pool: &SqlitePool,
    user_id: i64,
    awards: &[AwardedBadge],
) -> Result<()> {
    let users_repo = UserRepository::new(pool);
    let notifications_repo = NotificationRepository::new(pool);
    let followers = users_repo.followers(user_id).await?;

    for award in awards {
        let metadata = serde_json::json!({
            "badgeId": award.badge_id,
            "badgeName": award.name,
            "tier": award.tier.as_str(),
        })
        .to_string();

        notifications_repo
            .append(&NotificationRecord {
                id: None,
                recipient_id: user_id,
                sender_id: None,
                kind: "BadgeEarned".to_string(),
                message_key: "notifications.badgeEarned".to_string(),
                metadata_json: Some(metadata.clone()),
                link: Some(format!("/profile/{user_id}")),
                created_at: None,
            })
            .await?;

        let follower_records: Vec<NotificationRecord> = followers
            .iter()
            .map(|follower_id| NotificationRecord {
                id: None,
                recipient_id: *follower_id,
                sender_id: Some(user_id),
                kind: "BadgeEarned".to_string(),
                message_key: "notifications.followeeBadgeEarned".to_string(),
                metadata_json: Some(metadata.clone()),
                link: Some(format!("/profile/{user_id}")),
                created_at: None,
            })
            .collect();
        notifications_repo.append_many(&follower_records).await?;
    }
    Ok(())
}
