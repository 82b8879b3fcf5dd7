//! The page-view record emitted to the message stream.
//!
//! One [`PageViewEvent`] is published per user per tick. Arrival events carry
//! a `referrer` and no dwell time; continuation events carry
//! `page_time_seconds` and no referrer. Absent optional fields are omitted
//! from the JSON payload entirely.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A single page view by a simulated visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewEvent {
    /// Tick time in Unix seconds.
    pub unix_timestamp: i64,
    /// Seconds spent on the page at tick start. Absent on arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_time_seconds: Option<f64>,
    /// Site the visitor arrived from. Present only on arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// The visitor.
    pub user_id: UserId,
    /// URL path of the visitor's current page.
    pub path: String,
}

impl PageViewEvent {
    /// Build an arrival event for a newly admitted visitor.
    pub fn arrival(unix_timestamp: i64, user_id: UserId, path: &str, referrer: &str) -> Self {
        Self {
            unix_timestamp,
            page_time_seconds: None,
            referrer: Some(referrer.to_owned()),
            user_id,
            path: path.to_owned(),
        }
    }

    /// Build a continuation event for a visitor already on the site.
    pub fn continuation(
        unix_timestamp: i64,
        user_id: UserId,
        path: &str,
        page_time_seconds: f64,
    ) -> Self {
        Self {
            unix_timestamp,
            page_time_seconds: Some(page_time_seconds),
            referrer: None,
            user_id,
            path: path.to_owned(),
        }
    }

    /// Whether this event records a visitor's arrival on the site.
    pub const fn is_arrival(&self) -> bool {
        self.referrer.is_some()
    }
}
