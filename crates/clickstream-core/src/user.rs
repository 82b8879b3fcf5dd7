//! Per-visitor state.

use std::time::Duration;

use clickstream_site::PageId;
use clickstream_types::UserId;
use tokio::time::Instant;

/// A visitor currently on the site.
///
/// Owned by exactly one worker's live set. `current_page` always refers to a
/// page of the worker's shared site tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedUser {
    /// Stable identity for the visit.
    pub user_id: UserId,
    /// The page the visitor is on.
    pub current_page: PageId,
    /// When the visitor last changed page (or arrived).
    pub last_change: Instant,
}

impl SimulatedUser {
    /// A visitor arriving on `page` at `now`.
    pub const fn arrive(user_id: UserId, page: PageId, now: Instant) -> Self {
        Self {
            user_id,
            current_page: page,
            last_change: now,
        }
    }

    /// Time spent on the current page as of `now`. Zero if `now` is earlier
    /// than the last change.
    pub fn dwell(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_change)
    }

    /// Move to `page`, restarting the dwell clock.
    pub const fn navigate(&mut self, page: PageId, now: Instant) {
        self.current_page = page;
        self.last_change = now;
    }
}
