//! Filter scopes and the keys derived from them.
//!
//! A `FilterSet` identifies which slice of review data a consumer is
//! viewing. The push-channel room and the cache entry for that slice are
//! both keyed by the same stable derivation, so equal filter fields always
//! address the same room and the same cache entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reviewer role within a filter scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    Guide,
    Panel,
}

impl ReviewerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewerRole::Guide => "guide",
            ReviewerRole::Panel => "panel",
        }
    }
}

impl fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The scope key identifying which data slice is being viewed.
///
/// Immutable value; two filter sets with equal fields derive equal
/// room and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSet {
    pub year: String,
    pub school: String,
    pub program: String,
    pub review_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ReviewerRole>,
}

impl FilterSet {
    pub fn new(
        year: impl Into<String>,
        school: impl Into<String>,
        program: impl Into<String>,
        review_type: impl Into<String>,
    ) -> Self {
        Self {
            year: year.into(),
            school: school.into(),
            program: program.into(),
            review_type: review_type.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: ReviewerRole) -> Self {
        self.role = Some(role);
        self
    }

    /// All required fields present and non-empty.
    ///
    /// An incomplete filter set is a valid idle state for the coordinator,
    /// not an error.
    pub fn is_complete(&self) -> bool {
        !self.year.trim().is_empty()
            && !self.school.trim().is_empty()
            && !self.program.trim().is_empty()
            && !self.review_type.trim().is_empty()
    }

    /// Derive the subscription key for the push-channel room.
    ///
    /// The derivation is a canonical lower-cased, colon-joined string of
    /// the filter fields. The exact encoding is not a compatibility
    /// surface; only stability matters.
    pub fn room_key(&self) -> RoomKey {
        let mut key = format!(
            "{}:{}:{}:{}",
            canonical(&self.year),
            canonical(&self.school),
            canonical(&self.program),
            canonical(&self.review_type),
        );
        if let Some(role) = self.role {
            key.push(':');
            key.push_str(role.as_str());
        }
        RoomKey(key)
    }

    /// Derive the cache key for this scope. Same derivation as [`Self::room_key`].
    pub fn cache_key(&self) -> CacheKey {
        self.room_key()
    }
}

fn canonical(field: &str) -> String {
    field.trim().to_ascii_lowercase()
}

/// Derived subscription identifier for the push channel, one per filter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache entries use the same derivation as push-channel rooms.
pub type CacheKey = RoomKey;
