//! coachsync core
//!
//! Offline action queue and synchronization engine. Domain mutations recorded
//! while disconnected are persisted as [`OfflineAction`]s in an
//! [`ActionQueueStore`], and the [`SyncManager`] applies them to the
//! [`RemoteStore`](remote::RemoteStore) through idempotent handlers once the
//! [`NetworkMonitor`] reports connectivity.

pub mod config;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod network;
pub mod queue;
pub mod remote;
pub mod shutdown;
pub mod sync;
pub mod test_utils;

pub use config::{Config, ConfigError};
pub use handlers::{ActionHandler, ApplyOutcome, HandlerError, HandlerRegistry};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use model::{ActionId, ActionKind, ActionPayload, OfflineAction, UserId};
pub use network::{NetworkMonitor, NetworkStatus, ReachabilityProbe, Subscription};
pub use queue::{ActionQueueStore, MemoryActionStore, SqlActionStore, StorageError};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use sync::{DrainReport, SkipReason, SyncManager, SyncOutcome, SyncSettings, TerminalPolicy};
