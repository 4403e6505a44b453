//! Sync event fan-out
//!
//! After every cache write pass the coordinator publishes one
//! [`CacheSyncEvent`] through [`EventPublisher`]. The bundled
//! [`SyncEventBus`] fans it out on two broadcast channels: a typed local
//! channel for same-process subscribers (websocket pushers, in-memory
//! dashboards) and a JSON channel mirroring what a pub/sub broker would
//! carry to other nodes.
//!
//! Publishing is fire-and-forget. A channel with no live subscribers
//! accepts the event and drops it; only serialization failures surface.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use types::errors::SyncError;
use types::sync::CacheSyncEvent;

/// Local channel name, carried in logs and subscriber registrations.
pub const LOCAL_CHANNEL: &str = "cache-sync.local";
/// Cross-node channel name.
pub const BROADCAST_CHANNEL: &str = "cache-sync.broadcast";

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Outbound side of the sync event stream.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &CacheSyncEvent) -> Result<(), SyncError>;
}

/// Dual-channel broadcast bus for sync events.
pub struct SyncEventBus {
    local_tx: broadcast::Sender<CacheSyncEvent>,
    broadcast_tx: broadcast::Sender<String>,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus with `capacity` slots per channel. Slow subscribers that fall
    /// more than `capacity` events behind observe a lagged error and skip
    /// ahead; the publisher is never blocked.
    pub fn with_capacity(capacity: usize) -> Self {
        let (local_tx, _) = broadcast::channel(capacity);
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            local_tx,
            broadcast_tx,
        }
    }

    /// Subscribe to typed events published in this process.
    pub fn subscribe_local(&self) -> broadcast::Receiver<CacheSyncEvent> {
        self.local_tx.subscribe()
    }

    /// Subscribe to the JSON mirror of the cross-node channel.
    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<String> {
        self.broadcast_tx.subscribe()
    }

    pub fn local_subscriber_count(&self) -> usize {
        self.local_tx.receiver_count()
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for SyncEventBus {
    async fn publish(&self, event: &CacheSyncEvent) -> Result<(), SyncError> {
        let payload = serde_json::to_string(event)
            .map_err(|err| SyncError::Publish(err.to_string()))?;

        // send only errors when nobody is subscribed, which is fine here
        let local_delivered = self.local_tx.send(event.clone()).unwrap_or(0);
        let broadcast_delivered = self.broadcast_tx.send(payload).unwrap_or(0);
        debug!(
            user_id = event.user_id.as_i64(),
            event_type = %event.event_type,
            local_delivered,
            broadcast_delivered,
            "sync event published"
        );
        Ok(())
    }
}
