//! Client-to-server messages for the push channel.

use crate::types::MarkSubmission;
use reviewroom_core::RoomKey;
use serde::{Deserialize, Serialize};

/// Messages a client sends over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to the room for a filter scope.
    JoinRoom { room: RoomKey },

    /// Leave the currently subscribed room.
    LeaveRoom { room: RoomKey },

    /// Liveness ping; the server does not reply, disconnect detection is
    /// the transport's own signal.
    Ping,

    /// Submit rubric marks for a team. The server broadcasts the
    /// resulting change back as a delta.
    MarkSubmission { submission: MarkSubmission },
}

impl ClientMessage {
    /// Short name for structured log fields.
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom { .. } => "leave_room",
            ClientMessage::Ping => "ping",
            ClientMessage::MarkSubmission { .. } => "mark_submission",
        }
    }
}
