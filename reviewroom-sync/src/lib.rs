//! Reviewroom Sync - Real-Time Review Synchronization
//!
//! Keeps a faculty member's reviews view consistent across three
//! competing data sources - a live push channel, a pull-based REST
//! fallback, and a local snapshot cache - while running on constrained
//! client devices with unreliable connectivity.
//!
//! The [`coordinator::SyncCoordinator`] is the entry point: it owns the
//! [`session::SessionManager`] (push lifecycle), [`pull::PullFallback`]
//! (REST with timeout racing and retry), [`cache::CacheStore`]
//! (TTL/size-bounded snapshots), and [`coalesce::UpdateCoalescer`]
//! (rate-limited batching), and arbitrates which source the consumer
//! should trust at any instant.

pub mod cache;
pub mod clock;
pub mod coalesce;
pub mod config;
pub mod coordinator;
pub mod pull;
pub mod session;
pub mod transport;

pub use cache::{CacheEntry, CacheStore};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use coalesce::{CoalesceOutcome, PendingUpdate, UpdateCoalescer};
pub use config::{AuthConfig, ClientConfig, ConfigError, ReconnectConfig, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncView};
pub use pull::{FetchResult, PullFallback};
pub use session::{ConnectionState, SessionEvent, SessionManager};
pub use transport::{
    PushConnection, PushTransport, RestClient, RestTransport, TransportEvent, WsTransport,
};
