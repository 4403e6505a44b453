//! Cache synchronization service
//!
//! Keeps the cache tier loosely trailing the authoritative store.
//! Committing services enqueue one job per committed balance-affecting
//! mutation; a background worker fans each job out to per-user cache keys
//! and two event channels. Cache and pub/sub are treated as unreliable:
//! every step is timeout-guarded and every failure is swallowed after
//! logging, because the source transaction has already committed.
//!
//! ```text
//!  commit hook              queue                 fan-out
//!  SyncHandle::on_committed --> SyncWorker --> SyncCoordinator
//!                                                |-- CacheStore (aggregate,
//!                                                |    balance TTL, portfolio,
//!                                                |    derived invalidation)
//!                                                `-- EventPublisher (local +
//!                                                     broadcast channels)
//! ```

pub mod bus;
pub mod cache;
pub mod coordinator;
pub mod worker;

pub use bus::{EventPublisher, SyncEventBus, BROADCAST_CHANNEL, LOCAL_CHANNEL};
pub use cache::{CacheStore, MemoryCache};
pub use coordinator::{SyncConfig, SyncCoordinator, BALANCE_FIELD, DERIVED_KINDS, FRESHNESS_FIELD};
pub use worker::{
    spawn_sync_worker, sync_queue, SyncHandle, SyncJob, SyncWorker, DEFAULT_QUEUE_CAPACITY,
};

pub const SERVICE_VERSION: &str = "0.1.0";
