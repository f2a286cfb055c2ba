//! Realtime state synchronization core for hexsync.
//! Owns the canonical project store and every rule that mutates it.

pub mod config;
pub mod feed;
pub mod logging;
pub mod model;
pub mod notify;
pub mod presence;
pub mod reconcile;
pub mod remote;
pub mod store;
pub mod sync;

pub use config::{ConfigError, LoggingConfig, SyncConfig};
pub use feed::event::{Change, EventType, FeedError, FeedMessage, TableChange};
pub use feed::subscriber::{ChangeFeedSubscriber, ChannelHealth, SubscriptionHandle};
pub use feed::transport::{ChangeFeedTransport, ChannelStatus, LoopbackTransport, TransportError};
pub use feed::ProjectScope;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::item::{Item, ItemId};
pub use model::participant::{Participant, ParticipantId, SessionId};
pub use model::patch::{Patch, PatchError};
pub use model::zone::{
    Cell, CellId, Container, ContainerId, ContainerKind, Edge, EdgeId, EdgeKind, ProjectId,
    Region, RegionId,
};
pub use model::{EntityTable, SyncEntity};
pub use notify::{MoveNotice, RecordingObserver, SyncNotification, SyncObserver};
pub use presence::{filter_stale, ParticipantsBySession, PresenceRoster};
pub use reconcile::{PreviousContainerResolver, Reconciler, ScanResolver};
pub use remote::memory::InMemoryRemote;
pub use remote::{RemoteError, RemoteResult, RemoteStore};
pub use store::{CanonicalStore, Removal, ScopeSnapshot};
pub use sync::engine::{FeedDisposition, SyncEngine, SyncError, SyncResult};
pub use sync::moves::{MoveOutcome, MoveState, MoveToken, PendingMove};

/// Minimal health-check API for host wiring.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }
}
