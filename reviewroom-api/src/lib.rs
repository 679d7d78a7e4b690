//! Reviewroom API - Wire Types
//!
//! Serialization contracts shared between the sync engine and the
//! dashboard API: WebSocket event frames, client messages, and REST
//! request/response bodies. No transport code lives here.

pub mod events;
pub mod messages;
pub mod types;

pub use events::ServerEvent;
pub use messages::ClientMessage;
pub use types::{ApiErrorBody, MarkSubmission, ReviewsQuery, ReviewsResponse};
