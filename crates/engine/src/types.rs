//! Core domain types: horizons, statuses, badge tiers, rank categories

use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecast time horizon, ordered shortest to longest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Horizon {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Horizon {
    pub const ALL: [Horizon; 6] = [
        Horizon::Hourly,
        Horizon::Daily,
        Horizon::Weekly,
        Horizon::Monthly,
        Horizon::Quarterly,
        Horizon::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "Hourly",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Horizon> {
        match s {
            "Hourly" => Some(Self::Hourly),
            "Daily" => Some(Self::Daily),
            "Weekly" => Some(Self::Weekly),
            "Monthly" => Some(Self::Monthly),
            "Quarterly" => Some(Self::Quarterly),
            "Yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Hour-scale forecasts need a point-in-time quote; a daily close is
    /// hours stale by the time the deadline passes.
    pub fn needs_live_quote(&self) -> bool {
        matches!(self, Self::Hourly)
    }

    /// Short-term horizons are scored against the strict error budget
    pub fn is_short_term(&self) -> bool {
        matches!(self, Self::Hourly | Self::Daily | Self::Weekly)
    }

    /// Multiplier for the target-hit bonus: long-range accuracy pays more
    pub fn target_hit_weight(&self) -> f64 {
        match self {
            Self::Hourly => 0.5,
            Self::Daily => 1.0,
            Self::Weekly => 2.0,
            Self::Monthly => 4.0,
            Self::Quarterly => 6.0,
            Self::Yearly => 10.0,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a prediction. The transition is one-way: once Assessed, the
/// score and actual price are fixed forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Active,
    Assessed,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Assessed => "Assessed",
        }
    }

    pub fn parse(s: &str) -> Option<PredictionStatus> {
        match s {
            "Active" => Some(Self::Active),
            "Assessed" => Some(Self::Assessed),
            _ => None,
        }
    }
}

/// Achievement tier with an explicit numeric total order.
/// Comparisons are numeric, never string-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BadgeTier {
    Bronze = 1,
    Silver = 2,
    Gold = 3,
}

impl BadgeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
        }
    }

    /// Numeric rank used for storage and ordering (Bronze=1, Silver=2, Gold=3)
    pub fn rank(&self) -> i64 {
        *self as i64
    }

    pub fn from_rank(rank: i64) -> Option<BadgeTier> {
        match rank {
            1 => Some(Self::Bronze),
            2 => Some(Self::Silver),
            3 => Some(Self::Gold),
            _ => None,
        }
    }

    /// Ledger point value awarded when this tier is reached
    pub fn points(&self) -> f64 {
        match self {
            Self::Bronze => 100.0,
            Self::Silver => 250.0,
            Self::Gold => 500.0,
        }
    }
}

impl fmt::Display for BadgeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaderboard partition: every assessed prediction, or one horizon's worth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankCategory {
    Overall,
    Horizon(Horizon),
}

impl RankCategory {
    /// Breakdown-map key and display name for the category
    pub fn key(&self) -> &'static str {
        match self {
            Self::Overall => "Overall",
            Self::Horizon(h) => h.as_str(),
        }
    }

    /// Horizon filter for the leaderboard query (None = all horizons)
    pub fn horizon_filter(&self) -> Option<&'static str> {
        match self {
            Self::Overall => None,
            Self::Horizon(h) => Some(h.as_str()),
        }
    }
}

impl fmt::Display for RankCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
