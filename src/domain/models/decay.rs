//! Half-life forgetting for non-stationary environments.
//!
//! Evidence loses half its weight every `half_life_days`. Decay is always
//! computed from an anchor timestamp, never accumulated across calls, so
//! asking for the same instant twice gives the same answer.

use chrono::{DateTime, Utc};

/// Default evidence half-life.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 14.0;

/// Recency weight assigned to an arm that has never been used.
pub const UNSEEN_RECENCY_WEIGHT: f64 = 0.5;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Days elapsed from `from` to `to`, clamped at zero.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds();
    (millis as f64 / MILLIS_PER_DAY).max(0.0)
}

/// `0.5 ^ (elapsed_days / half_life_days)`.
pub fn decay_factor(elapsed_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(elapsed_days.max(0.0) / half_life_days)
}

/// Weight in `(0, 1]` describing how recently something was used.
pub fn recency_weight(last_used: Option<DateTime<Utc>>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    match last_used {
        Some(t) => decay_factor(elapsed_days(t, now), half_life_days),
        None => UNSEEN_RECENCY_WEIGHT,
    }
}
