//! Reviewroom Core - Entity Types
//!
//! Pure data structures shared by the sync engine and the wire layer.
//! This crate contains ONLY data types and value-level merge logic -
//! no transports, no timers, no I/O.

use chrono::{DateTime, Utc};

pub mod error;
pub mod filter;
pub mod merge;
pub mod review;

pub use error::SyncError;
pub use filter::{CacheKey, FilterSet, ReviewerRole, RoomKey};
pub use merge::{ReviewPatch, SnapshotDelta, SnapshotUpdate, TeamPatch};
pub use review::{DataSource, Review, ReviewSnapshot, ReviewStatus, Team};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
