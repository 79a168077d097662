use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, SyncError};
use crate::events::SyncEvent;

/// Registry-assigned handle for one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered, non-blocking delivery pipe to one subscriber.
///
/// `send` must not wait on the remote end; an error means the subscriber is
/// gone and the channel will be dropped.
pub trait EventChannel: Send + Sync {
    fn send(&self, event: &SyncEvent) -> Result<()>;
}

/// Channel backed by an unbounded queue, drained by the connection's own
/// writer task
#[derive(Clone)]
pub struct QueueChannel {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl QueueChannel {
    pub fn open() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventChannel for QueueChannel {
    fn send(&self, event: &SyncEvent) -> Result<()> {
        self.tx.send(event.clone()).map_err(|_| SyncError::ChannelClosed)
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Thread-safe set of open subscriber channels
pub struct ConnectionRegistry {
    channels: Mutex<HashMap<ChannelId, Arc<dyn EventChannel>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add new channel
    pub async fn register(&self, channel: Arc<dyn EventChannel>) -> ChannelId {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut channels = self.channels.lock().await;
        channels.insert(id, channel);
        tracing::info!("Channel {} registered. Total channels: {}", id, channels.len());
        id
    }

    /// Remove a channel; returns false if it was already gone
    pub async fn unregister(&self, id: ChannelId) -> bool {
        let mut channels = self.channels.lock().await;
        let removed = channels.remove(&id).is_some();
        if removed {
            tracing::info!("Channel {} unregistered. Remaining: {}", id, channels.len());
        }
        removed
    }

    /// Send event to every channel, removing the ones that fail
    pub async fn broadcast(&self, event: &SyncEvent) -> BroadcastReport {
        let mut channels = self.channels.lock().await;
        let mut dead = Vec::new();
        let mut report = BroadcastReport::default();

        for (id, channel) in channels.iter() {
            match channel.send(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to send {} to channel {}: {}", event.kind(), id, e);
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            channels.remove(&id);
            report.dropped += 1;
            tracing::info!("Removed dead channel {}. Remaining: {}", id, channels.len());
        }

        tracing::debug!(
            "Broadcast {} to {} channel(s), dropped {}",
            event.kind(),
            report.delivered,
            report.dropped
        );
        report
    }

    pub async fn len(&self) -> usize {
        self.channels.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ChannelId) -> bool {
        self.channels.lock().await.contains_key(&id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogoPayload;

    struct BrokenChannel;

    impl EventChannel for BrokenChannel {
        fn send(&self, _event: &SyncEvent) -> Result<()> {
            Err(SyncError::ChannelClosed)
        }
    }

    fn logo(path: &str) -> SyncEvent {
        SyncEvent::LogoUpdate(LogoPayload {
            logo_path: path.to_string(),
        })
    }

    #[tokio::test]
    async fn test_register_assigns_distinct_ids() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = QueueChannel::open();
        let (b, _rx_b) = QueueChannel::open();

        let id_a = registry.register(Arc::new(a)).await;
        let id_b = registry.register(Arc::new(b)).await;

        assert_ne!(id_a, id_b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (channel, _rx) = QueueChannel::open();
        let id = registry.register(Arc::new(channel)).await;

        assert!(registry.unregister(id).await);
        assert!(!registry.unregister(id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_broadcast_preserves_per_channel_order() {
        let registry = ConnectionRegistry::new();
        let (channel, mut rx) = QueueChannel::open();
        registry.register(Arc::new(channel)).await;

        for path in ["a", "b", "c"] {
            registry.broadcast(&logo(path)).await;
        }

        for expected in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.unwrap(), logo(expected));
        }
    }

    #[tokio::test]
    async fn test_failing_channel_is_removed_others_delivered() {
        let registry = ConnectionRegistry::new();
        let (good_a, mut rx_a) = QueueChannel::open();
        let (good_b, mut rx_b) = QueueChannel::open();

        registry.register(Arc::new(good_a)).await;
        let broken = registry.register(Arc::new(BrokenChannel)).await;
        registry.register(Arc::new(good_b)).await;

        let report = registry.broadcast(&logo("x")).await;

        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 1 });
        assert!(!registry.contains(broken).await);
        assert_eq!(registry.len().await, 2);
        assert_eq!(rx_a.recv().await.unwrap(), logo("x"));
        assert_eq!(rx_b.recv().await.unwrap(), logo("x"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_counts_as_dead() {
        let registry = ConnectionRegistry::new();
        let (channel, rx) = QueueChannel::open();
        registry.register(Arc::new(channel)).await;
        drop(rx);

        let report = registry.broadcast(&logo("gone")).await;
        assert_eq!(report.dropped, 1);
        assert!(registry.is_empty().await);
    }
}
