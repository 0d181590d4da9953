//! Session staleness evaluation.
//!
//! A session goes stale when its roles are older than the role refresh
//! interval or when it has seen no request for longer than the idle limit.
//! A threshold of zero disables that check.

use serde::{Deserialize, Serialize};

use crate::session::SessionAccessor;

/// Returns the current time as Unix epoch seconds.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Why a session was judged stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Roles were resolved longer ago than the refresh interval.
    RolesOutdated,
    /// No request was seen for longer than the idle limit.
    Idle,
}

/// The two staleness thresholds, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    /// Maximum age of resolved roles. `0` disables the check.
    pub role_refresh_interval_seconds: u64,
    /// Maximum time between requests. `0` disables the check.
    pub max_idle_seconds: u64,
}

impl StalenessPolicy {
    /// Creates a policy from the two thresholds.
    #[must_use]
    pub fn new(role_refresh_interval_seconds: u64, max_idle_seconds: u64) -> Self {
        Self {
            role_refresh_interval_seconds,
            max_idle_seconds,
        }
    }

    /// A policy under which sessions never go stale.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns the first reason the session is stale at `now`, if any.
    ///
    /// A missing `groups_fetched_at` counts as epoch zero, so an enabled
    /// refresh interval treats it as outdated. A missing `last_activity_at`
    /// counts as `now`.
    #[must_use]
    pub fn staleness<S>(&self, session: &S, now: i64) -> Option<StaleReason>
    where
        S: SessionAccessor + ?Sized,
    {
        if self.role_refresh_interval_seconds > 0 {
            let fetched_at = session.groups_fetched_at().unwrap_or(0);
            if elapsed(fetched_at, now) >= self.role_refresh_interval_seconds {
                return Some(StaleReason::RolesOutdated);
            }
        }

        if self.max_idle_seconds > 0 {
            let last_at = session.last_activity_at().unwrap_or(now);
            if elapsed(last_at, now) >= self.max_idle_seconds {
                return Some(StaleReason::Idle);
            }
        }

        None
    }

    /// Returns true if the session must re-authenticate.
    #[must_use]
    pub fn is_stale<S>(&self, session: &S, now: i64) -> bool
    where
        S: SessionAccessor + ?Sized,
    {
        self.staleness(session, now).is_some()
    }
}

// Timestamps in the future count as zero elapsed.
fn elapsed(since: i64, now: i64) -> u64 {
    u64::try_from(now.saturating_sub(since)).unwrap_or(0)
}

/// Returns true if the session is stale under the given thresholds.
#[must_use]
pub fn is_stale<S>(
    session: &S,
    refresh_interval_seconds: u64,
    max_idle_seconds: u64,
    now: i64,
) -> bool
where
    S: SessionAccessor + ?Sized,
{
    StalenessPolicy::new(refresh_interval_seconds, max_idle_seconds).is_stale(session, now)
}
