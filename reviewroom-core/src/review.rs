//! Review and team entity types.
//!
//! `ReviewSnapshot` is the unit of truth handed to the consumer: a full,
//! self-consistent payload for one filter scope. `Review.id` is unique
//! within a snapshot and `Team.id` unique within a review.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Which source produced the currently visible snapshot.
///
/// Diagnostic metadata only; arbitration never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Nothing loaded yet.
    Initial,
    /// REST fetch.
    Api,
    /// Push channel snapshot or delta.
    Websocket,
    /// Served from the local cache; freshness not guaranteed.
    Cache,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Initial => "initial",
            DataSource::Api => "api",
            DataSource::Websocket => "websocket",
            DataSource::Cache => "cache",
        }
    }
}

/// Lifecycle status of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// A team being evaluated in a review.
///
/// `marks` is an open payload owned by the mark-entry subsystem; this
/// layer only transports and merges it, never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<JsonValue>,
    #[serde(default)]
    pub marks_submitted: bool,
}

/// A scheduled project review with its assigned teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub title: String,
    pub review_type: String,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide: Option<String>,
    #[serde(default)]
    pub panel: Vec<String>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub marks_locked: bool,
}

/// Full, self-consistent data payload for a filter scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    #[serde(default)]
    pub active: Vec<Review>,
    #[serde(default)]
    pub deadline_passed: Vec<Review>,
    #[serde(default)]
    pub past: Vec<Review>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JsonValue>,
}

impl ReviewSnapshot {
    /// Total number of reviews across all three lists.
    pub fn review_count(&self) -> usize {
        self.active.len() + self.deadline_passed.len() + self.past.len()
    }

    pub fn is_empty(&self) -> bool {
        self.review_count() == 0 && self.statistics.is_none()
    }
}
