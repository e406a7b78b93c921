//! Refresh-before-expiry policy
//!
//! A caller holding a session moves through
//! `Fresh -> NeedsRefresh -> (one refresh attempt) -> Fresh | Expired`.
//! `NeedsRefresh` and `Expired` both call for exactly one refresh attempt; a
//! failed attempt ends the session and the user signs in again.

use crate::constants::DEFAULT_REFRESH_LEAD_TIME_SECS;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FreshnessState {
    Fresh,
    NeedsRefresh,
    Expired,
    /// No usable `exp` claim: fresh but unverifiable, no refresh forced
    Unknown,
}

impl FreshnessState {
    pub fn requires_refresh(self) -> bool {
        matches!(self, FreshnessState::NeedsRefresh | FreshnessState::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FreshnessState::Fresh => "fresh",
            FreshnessState::NeedsRefresh => "needs_refresh",
            FreshnessState::Expired => "expired",
            FreshnessState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FreshnessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default lead time (5 minutes)
pub fn default_lead_time() -> Duration {
    Duration::seconds(DEFAULT_REFRESH_LEAD_TIME_SECS)
}

/// Classify an expiry (Unix seconds) relative to `now`.
pub fn assess_freshness(
    expires_at: Option<i64>,
    now: DateTime<Utc>,
    lead_time: Duration,
) -> FreshnessState {
    let Some(expiry) = expires_at.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)) else {
        return FreshnessState::Unknown;
    };

    if now >= expiry {
        FreshnessState::Expired
    } else if expiry - now < lead_time {
        FreshnessState::NeedsRefresh
    } else {
        FreshnessState::Fresh
    }
}
