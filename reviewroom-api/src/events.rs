//! WebSocket Event Types
//!
//! This module defines the event frames the server broadcasts to
//! connected clients over the push channel. Full snapshots and
//! incremental deltas carry the review data itself; the remaining
//! variants report room membership and submission outcomes.

use reviewroom_core::{ReviewSnapshot, RoomKey, SnapshotDelta};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-to-client event frames for real-time updates.
///
/// Room join rejections and submission rejections are non-fatal events,
/// not protocol errors: the connection stays up and the client decides
/// how to react.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The join request for a room was accepted.
    RoomJoined {
        /// The room now subscribed to
        room: RoomKey,
    },

    /// The server declined a room join (e.g. invalid filters).
    RoomJoinError {
        /// Human-readable rejection reason
        message: String,
    },

    /// A full snapshot for the subscribed room.
    Snapshot {
        /// Complete review data for the room's filter scope
        payload: ReviewSnapshot,
    },

    /// An incremental update to be merged into the current snapshot.
    Delta {
        /// Partial review data, any subset of snapshot fields
        payload: SnapshotDelta,
    },

    /// A mark submission was accepted; the resulting change is broadcast
    /// separately as a delta.
    SubmissionAccepted {
        review_id: Uuid,
        team_id: Uuid,
    },

    /// A mark submission was declined.
    SubmissionRejected {
        /// Human-readable rejection reason
        message: String,
    },

    /// Server-side error unrelated to a specific request.
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Short name for structured log fields.
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::RoomJoined { .. } => "room_joined",
            ServerEvent::RoomJoinError { .. } => "room_join_error",
            ServerEvent::Snapshot { .. } => "snapshot",
            ServerEvent::Delta { .. } => "delta",
            ServerEvent::SubmissionAccepted { .. } => "submission_accepted",
            ServerEvent::SubmissionRejected { .. } => "submission_rejected",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// True for events that modify the visible snapshot.
    pub fn carries_data(&self) -> bool {
        matches!(
            self,
            ServerEvent::Snapshot { .. } | ServerEvent::Delta { .. }
        )
    }
}
