//! Proximity scoring and the per-prediction reward tables
//!
//! Two distinct point concepts live here and must not be collapsed:
//! the prediction's stored score is a fine-grained 0–100 value (one decimal)
//! used for averages and leaderboards, while `accuracy_points` is the coarser
//! bucketed table used only for crediting the rating ledger.

use crate::types::{Horizon, PredictionStatus};
use persistence::repository::predictions::PredictionRecord;
use serde::Serialize;

/// Ceiling of the proximity score
pub const MAX_SCORE: f64 = 100.0;

/// Relative-error budget for short-term horizons (hour/day/week scale)
pub const STRICT_MAX_ERROR: f64 = 0.05;

/// Relative-error budget for long-term horizons
pub const LENIENT_MAX_ERROR: f64 = 0.20;

/// Ledger points for scores above 90 / 80 / 70
pub const ACCURACY_TIER_90_POINTS: f64 = 10.0;
pub const ACCURACY_TIER_80_POINTS: f64 = 5.0;
pub const ACCURACY_TIER_70_POINTS: f64 = 2.0;

/// Base points for a target price that traded inside the prediction window,
/// scaled by the horizon's weight.
pub const TARGET_HIT_BASE_BONUS: f64 = 5.0;

/// Error budgets per scoring mode
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    pub strict_max_error: f64,
    pub lenient_max_error: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            strict_max_error: STRICT_MAX_ERROR,
            lenient_max_error: LENIENT_MAX_ERROR,
        }
    }
}

impl ScoringConfig {
    /// The max relative error tolerated for a horizon before the score is 0
    pub fn max_error_for(&self, horizon: Horizon) -> f64 {
        if horizon.is_short_term() {
            self.strict_max_error
        } else {
            self.lenient_max_error
        }
    }
}

/// Round to one decimal place (scores are stored at one-decimal precision)
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Score how close a forecast landed to the realized price.
///
/// A forecast that called the wrong direction scores 0 outright, no matter
/// how small the magnitude error. Within the direction gate, the score falls
/// linearly from 100 (exact) to 0 (at `max_error` relative error).
/// Total over its domain: no inputs panic.
pub fn proximity_score(
    predicted: f64,
    actual: f64,
    price_at_creation: Option<f64>,
    max_error: f64,
) -> f64 {
    // Direction gate — legacy rows without a creation price skip it
    if let Some(creation) = price_at_creation {
        if creation > 0.0 {
            let predicted_direction = predicted - creation;
            let actual_direction = actual - creation;
            if predicted_direction * actual_direction < 0.0 {
                return 0.0;
            }
        }
    }

    if actual == 0.0 {
        return 0.0;
    }

    let error_pct = (predicted - actual).abs() / actual;
    if error_pct > max_error {
        return 0.0;
    }

    round_to_tenth(MAX_SCORE * (1.0 - error_pct / max_error))
}

/// Ledger points earned for a resolved prediction's score.
/// Tiers are strict: exactly 90 pays the 80-tier, exactly 70 pays nothing.
pub fn accuracy_points(score: f64) -> f64 {
    if score > 90.0 {
        ACCURACY_TIER_90_POINTS
    } else if score > 80.0 {
        ACCURACY_TIER_80_POINTS
    } else if score > 70.0 {
        ACCURACY_TIER_70_POINTS
    } else {
        0.0
    }
}

/// Weighted bonus for a target price that traded within the window
pub fn target_hit_bonus(horizon: Horizon) -> f64 {
    TARGET_HIT_BASE_BONUS * horizon.target_hit_weight()
}

/// Share of assessed predictions whose direction call was right
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DirectionAccuracy {
    pub correct: u32,
    pub total: u32,
    pub accuracy_pct: f64,
}

pub fn direction_accuracy(predictions: &[PredictionRecord]) -> DirectionAccuracy {
    let mut correct = 0u32;
    let mut total = 0u32;

    for p in predictions {
        if PredictionStatus::parse(&p.status) != Some(PredictionStatus::Assessed) {
            continue;
        }
        let (Some(creation), Some(actual)) = (p.price_at_creation, p.actual_price) else {
            continue;
        };
        if creation <= 0.0 {
            continue;
        }
        let predicted_direction = p.target_price - creation;
        let actual_direction = actual - creation;
        if predicted_direction == 0.0 || actual_direction == 0.0 {
            continue;
        }
        total += 1;
        if predicted_direction * actual_direction > 0.0 {
            correct += 1;
        }
    }

    let accuracy_pct = if total > 0 {
        round_to_tenth(correct as f64 / total as f64 * 100.0)
    } else {
        0.0
    };
    DirectionAccuracy {
        correct,
        total,
        accuracy_pct,
    }
}

/// How bold a user's forecasts are: distribution of |target - creation| moves
/// against per-horizon thresholds, plus the mean absolute move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggressiveness {
    pub defensive: u32,
    pub neutral: u32,
    pub offensive: u32,
    pub mean_move_pct: f64,
    pub analyzed: u32,
}

/// (defensive ceiling, neutral ceiling) in percent, per horizon
fn aggressiveness_thresholds(horizon: Horizon) -> (f64, f64) {
    match horizon {
        Horizon::Hourly => (1.0, 3.0),
        Horizon::Daily => (3.0, 7.0),
        Horizon::Weekly => (5.0, 10.0),
        Horizon::Monthly => (8.0, 20.0),
        Horizon::Quarterly => (10.0, 25.0),
        Horizon::Yearly => (15.0, 35.0),
    }
}

pub fn aggressiveness(predictions: &[PredictionRecord]) -> Aggressiveness {
    let mut result = Aggressiveness {
        defensive: 0,
        neutral: 0,
        offensive: 0,
        mean_move_pct: 0.0,
        analyzed: 0,
    };
    let mut total_move = 0.0;

    for p in predictions {
        let Some(creation) = p.price_at_creation else {
            continue;
        };
        if creation <= 0.0 {
            continue;
        }
        let Some(horizon) = Horizon::parse(&p.horizon) else {
            continue;
        };

        result.analyzed += 1;
        let move_pct = ((p.target_price - creation) / creation).abs() * 100.0;
        total_move += move_pct;

        let (defensive_max, neutral_max) = aggressiveness_thresholds(horizon);
        if move_pct <= defensive_max {
            result.defensive += 1;
        } else if move_pct <= neutral_max {
            result.neutral += 1;
        } else {
            result.offensive += 1;
        }
    }

    if result.analyzed > 0 {
        result.mean_move_pct = round_to_tenth(total_move / result.analyzed as f64);
    }
    result
}
