//! REST request and response bodies.

use reviewroom_core::{FilterSet, Review, ReviewSnapshot, ReviewerRole};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Query parameters for `GET /api/v1/reviews`, derived from a filter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewsQuery {
    pub year: String,
    pub school: String,
    pub program: String,
    #[serde(rename = "type")]
    pub review_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ReviewerRole>,
}

impl From<&FilterSet> for ReviewsQuery {
    fn from(filters: &FilterSet) -> Self {
        Self {
            year: filters.year.clone(),
            school: filters.school.clone(),
            program: filters.program.clone(),
            review_type: filters.review_type.clone(),
            role: filters.role,
        }
    }
}

/// Response body for `GET /api/v1/reviews`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewsResponse {
    #[serde(default)]
    pub active: Vec<Review>,
    #[serde(default)]
    pub deadline_passed: Vec<Review>,
    #[serde(default)]
    pub past: Vec<Review>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JsonValue>,
}

impl From<ReviewsResponse> for ReviewSnapshot {
    fn from(response: ReviewsResponse) -> Self {
        ReviewSnapshot {
            active: response.active,
            deadline_passed: response.deadline_passed,
            past: response.past,
            statistics: response.statistics,
        }
    }
}

/// Request body for `POST /api/v1/marks`, also carried inside the push
/// channel's `mark_submission` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkSubmission {
    pub review_id: Uuid,
    pub team_id: Uuid,
    /// Rubric payload; validated by the mark-entry subsystem, opaque here.
    pub marks: JsonValue,
}

/// Structured body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}
