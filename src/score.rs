// src/score.rs

//! Dust scoring: pure derivation of staleness from ledger timestamps.
//!
//! Nothing here touches storage. Scores are computed on every read so a
//! package's tier drifts with wall-clock time without any background writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Days below which a package counts as freshly used.
pub const FRESH_DAYS: i64 = 7;

/// Days at and beyond which a package is dusty; also the saturation point
/// of the score curve (30 days of disuse scores 1.0).
pub const DUSTY_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTier {
    Fresh,
    Aging,
    Dusty,
    RemovalCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DustScore {
    pub days_since_use: i64,
    /// Normalized staleness in [0, 1].
    pub score: f64,
    pub tier: UsageTier,
}

/// Whole days elapsed since last use, clamped so a last_seen slightly in
/// the future (clock skew between scans) reads as zero.
pub fn days_since_use(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_seen).num_days().max(0)
}

/// Score a package's staleness.
///
/// The removal-candidate check runs last: a package required by another
/// installed package is never a candidate, no matter how dusty.
pub fn score(
    last_seen: DateTime<Utc>,
    now: DateTime<Utc>,
    explicit: bool,
    required_by_other: bool,
) -> DustScore {
    let days = days_since_use(last_seen, now);

    let tier = if days < FRESH_DAYS {
        UsageTier::Fresh
    } else if days < DUSTY_DAYS {
        UsageTier::Aging
    } else if explicit && !required_by_other {
        UsageTier::RemovalCandidate
    } else {
        UsageTier::Dusty
    };

    DustScore {
        days_since_use: days,
        score: (days as f64 / DUSTY_DAYS as f64).min(1.0),
        tier,
    }
}
